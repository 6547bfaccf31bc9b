//! Split JSON-lines files under an upload size budget, and merge fragments back
//!
//! Splitting is whole-line and byte exact: concatenating the fragments in
//! suffix order gives back the input, including a missing final newline.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::FragmentError;
use crate::utils::natural_sort_paths;

/// Upload limit of the batch service is 200 MiB; keep some margin
pub const DEFAULT_BUDGET: u64 = 198 * 1024 * 1024;

/// `<dir>/<stem>-<k><ext>`
pub fn fragment_path(path: &Path, k: usize) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    path.with_file_name(format!("{}-{}{}", stem, k, ext))
}

/// Greedily pack whole lines into fragments of at most `budget` bytes
///
/// A single line larger than the budget gets a fragment of its own.
pub fn split_file(path: &Path, budget: u64) -> Result<Vec<PathBuf>, FragmentError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut fragments = vec![];
    let mut writer: Option<BufWriter<File>> = None;
    let mut size = 0u64;
    let mut line = vec![];

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)? as u64;
        if n == 0 {
            break;
        }
        if writer.is_some() && size + n > budget {
            finish(writer.take())?;
            size = 0;
        }
        if writer.is_none() {
            let fragment = fragment_path(path, fragments.len() + 1);
            writer = Some(BufWriter::new(File::create(&fragment)?));
            fragments.push(fragment);
        }
        if let Some(w) = writer.as_mut() {
            w.write_all(&line)?;
        }
        size += n;
        if size > budget {
            // oversized line, alone in its fragment
            finish(writer.take())?;
            size = 0;
        }
    }
    finish(writer)?;

    info!("split {} into {} fragments", path.display(), fragments.len());
    Ok(fragments)
}

fn finish(writer: Option<BufWriter<File>>) -> io::Result<()> {
    match writer {
        Some(mut w) => w.flush(),
        None => Ok(()),
    }
}

/// Split only when `path` exceeds the budget; otherwise the file itself is the only fragment
pub fn split_if_needed(path: &Path, budget: u64) -> Result<Vec<PathBuf>, FragmentError> {
    let len = std::fs::metadata(path)?.len();
    if len > budget {
        info!("{} is {:.2} MiB, splitting", path.display(), len as f64 / (1024.0 * 1024.0));
        split_file(path, budget)
    } else {
        Ok(vec![path.to_path_buf()])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

/// Concatenate `fragments` in natural order into `output`, deleting each one once copied
///
/// Missing fragments are skipped. When none of them exist the output is left
/// alone, so merging twice never truncates an earlier result.
pub fn merge_files(output: &Path, fragments: &[PathBuf]) -> Result<MergeReport, FragmentError> {
    let mut fragments = fragments.to_vec();
    natural_sort_paths(&mut fragments);

    let (present, missing): (Vec<_>, Vec<_>) = fragments.into_iter().partition(|p| p.exists());
    if present.is_empty() {
        return Err(FragmentError::NothingToMerge(missing.len()));
    }
    for path in &missing {
        warn!("fragment {} not found, skipping", path.display());
    }

    info!("merging {} fragments into {}", present.len(), output.display());
    let mut writer = BufWriter::new(File::create(output)?);
    for path in &present {
        let mut reader = File::open(path)?;
        io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        std::fs::remove_file(path)?;
        debug!("merged and removed {}", path.display());
    }

    Ok(MergeReport { merged: present, missing })
}
