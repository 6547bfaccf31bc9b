//! Filesystem-derived completeness of an asset's output directory
//!
//! The entry count of the output directory is the only persisted render state,
//! so an interrupted chunk resumes at the first incomplete asset.

use std::io;
use std::path::Path;

use log::warn;

/// Read-only view of the storage the render outputs live on
pub trait FileSystem {
    /// Number of entries in `dir`, or `None` if it does not exist
    fn count_entries(&self, dir: &Path) -> io::Result<Option<usize>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

/// Suffix of frames still being written; never counted as output
pub const TMP_SUFFIX: &str = ".tmp";

impl FileSystem for StdFileSystem {
    fn count_entries(&self, dir: &Path) -> io::Result<Option<usize>> {
        match std::fs::read_dir(dir) {
            Ok(entries) => {
                let mut n = 0;
                for entry in entries {
                    if !entry?.file_name().to_string_lossy().ends_with(TMP_SUFFIX) {
                        n += 1;
                    }
                }
                Ok(Some(n))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    Pending,
    Done,
}

/// When an output directory counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Exactly this many entries
    ExactCount(usize),
    /// At least one entry; used when views may be legitimately dropped
    NonEmpty,
}

/// `dir` exists and contains exactly `expected` entries
///
/// Not a checksum: a directory with the right count of corrupt files is still done.
pub fn is_complete(fs: &impl FileSystem, dir: &Path, expected: usize) -> bool {
    derive_state(fs, dir, ResumePolicy::ExactCount(expected)) == AssetState::Done
}

pub fn derive_state(fs: &impl FileSystem, dir: &Path, policy: ResumePolicy) -> AssetState {
    let count = match fs.count_entries(dir) {
        Ok(count) => count,
        Err(e) => {
            warn!("cannot read {}: {}, treating as pending", dir.display(), e);
            return AssetState::Pending;
        }
    };
    let done = match (count, policy) {
        (None, _) => false,
        (Some(n), ResumePolicy::ExactCount(expected)) => n == expected,
        (Some(n), ResumePolicy::NonEmpty) => n > 0,
    };
    if done { AssetState::Done } else { AssetState::Pending }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;

    /// In-memory directory listing
    #[derive(Default)]
    pub struct FakeFs(pub HashMap<PathBuf, usize>);

    impl FileSystem for FakeFs {
        fn count_entries(&self, dir: &Path) -> io::Result<Option<usize>> {
            Ok(self.0.get(dir).copied())
        }
    }

    struct BrokenFs;

    impl FileSystem for BrokenFs {
        fn count_entries(&self, _: &Path) -> io::Result<Option<usize>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    #[test]
    fn test_exact_count() {
        let mut fs = FakeFs::default();
        fs.0.insert("out/a".into(), 4);
        fs.0.insert("out/b".into(), 3);
        fs.0.insert("out/c".into(), 5);
        assert!(is_complete(&fs, Path::new("out/a"), 4));
        assert!(!is_complete(&fs, Path::new("out/b"), 4));
        assert!(!is_complete(&fs, Path::new("out/c"), 4));
        assert!(!is_complete(&fs, Path::new("out/missing"), 4));
    }

    #[test]
    fn test_non_empty() {
        let mut fs = FakeFs::default();
        fs.0.insert("bg/a".into(), 2);
        fs.0.insert("bg/b".into(), 0);
        assert_eq!(derive_state(&fs, Path::new("bg/a"), ResumePolicy::NonEmpty), AssetState::Done);
        assert_eq!(
            derive_state(&fs, Path::new("bg/b"), ResumePolicy::NonEmpty),
            AssetState::Pending
        );
    }

    #[test]
    fn test_unreadable_is_pending() {
        assert_eq!(
            derive_state(&BrokenFs, Path::new("x"), ResumePolicy::ExactCount(0)),
            AssetState::Pending
        );
    }

    #[test]
    fn test_std_fs() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("asset");
        assert!(!is_complete(&StdFileSystem, &sub, 0));
        std::fs::create_dir(&sub).unwrap();
        assert!(is_complete(&StdFileSystem, &sub, 0));
        for i in 0..4 {
            std::fs::write(sub.join(format!("asset_{i}.png")), b"png").unwrap();
        }
        assert!(is_complete(&StdFileSystem, &sub, 4));
        assert!(!is_complete(&StdFileSystem, &sub, 3));
    }

    #[test]
    fn test_partial_write_is_not_a_frame() {
        let dir = tempfile::tempdir().unwrap();
        let chair = dir.path().join("chair");
        std::fs::create_dir(&chair).unwrap();
        for i in 0..3 {
            std::fs::write(chair.join(format!("chair_{i}.png")), b"png").unwrap();
        }
        std::fs::write(chair.join("chair_3.png.tmp"), b"\x89P").unwrap();
        assert_eq!(derive_state(&StdFileSystem, &chair, ResumePolicy::ExactCount(4)), AssetState::Pending);

        let vase = dir.path().join("vase");
        std::fs::create_dir(&vase).unwrap();
        std::fs::write(vase.join("vase_0.png.tmp"), b"\x89P").unwrap();
        assert_eq!(derive_state(&StdFileSystem, &vase, ResumePolicy::NonEmpty), AssetState::Pending);

        // leftover residue does not keep a finished asset pending forever
        std::fs::write(chair.join("chair_3.png"), b"png").unwrap();
        assert_eq!(derive_state(&StdFileSystem, &chair, ResumePolicy::ExactCount(4)), AssetState::Done);
    }
}
