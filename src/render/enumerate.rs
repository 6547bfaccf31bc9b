//! Discover the assets to render
//!
//! Two layouts are understood:
//!
//! * library: `<root>/<category>/<asset>/<asset>.<ext>`, sorted by path
//! * models: `<root>/<asset>.<ext>` or `<root>/<asset>/<any>.<ext>`, natural sorted

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use regex::Regex;
use walkdir::WalkDir;

use crate::render::renderer::AssetRef;
use crate::utils::{natural_cmp, natural_sort_paths};

pub const DEFAULT_SUFFIX: &str = "usd,usda,usdc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Name of the output directory and prefix of every frame
    pub id: String,
    pub source: AssetRef,
}

impl Asset {
    pub fn from_file(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { id: id.into(), source: AssetRef::File { path: path.into() } }
    }

    pub fn from_instance(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { id: name.clone(), source: AssetRef::SceneInstance { name } }
    }
}

/// Case-insensitive extension matcher for a comma separated suffix list
pub fn suffix_regex(suffix: &str) -> Result<Regex> {
    let re = format!("^(?i)({})$", suffix.replace(',', "|"));
    Regex::new(&re).with_context(|| format!("invalid suffix list: {}", suffix))
}

fn has_suffix(path: &Path, re_suf: &Regex) -> bool {
    path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Library layout; a directory without its `<asset>.<ext>` file is ignored
pub fn scan_library(root: impl AsRef<Path>, re_suf: &Regex) -> Result<Vec<Asset>> {
    let root = root.as_ref();
    info!("scanning asset library: {}", root.display());
    if !root.is_dir() {
        anyhow::bail!("asset library not found: {}", root.display());
    }

    let mut assets = vec![];
    for entry in WalkDir::new(root).min_depth(2).max_depth(2).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to scan {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = file_name(entry.path());
        match find_named_file(entry.path(), &name, re_suf)? {
            Some(path) => assets.push(Asset::from_file(name, path)),
            None => debug!("no asset file in {}", entry.path().display()),
        }
    }
    info!("found {} assets", assets.len());
    Ok(assets)
}

fn find_named_file(dir: &Path, stem: &str, re_suf: &Regex) -> Result<Option<PathBuf>> {
    let mut candidates = vec![];
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file()
            && has_suffix(&path, re_suf)
            && path.file_stem().is_some_and(|s| s.to_string_lossy() == stem)
        {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Models layout, as produced by extracting the models of a scene
pub fn scan_models(root: impl AsRef<Path>, re_suf: &Regex) -> Result<Vec<Asset>> {
    let root = root.as_ref();
    let mut entries = std::fs::read_dir(root)
        .with_context(|| format!("failed to read models dir {}", root.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    natural_sort_paths(&mut entries);

    let mut assets = vec![];
    for path in entries {
        if path.is_file() {
            if has_suffix(&path, re_suf) {
                let id = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
                assets.push(Asset::from_file(id, path));
            }
        } else if path.is_dir() {
            let mut files = WalkDir::new(&path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && has_suffix(entry.path(), re_suf))
                .map(|entry| entry.into_path())
                .collect::<Vec<_>>();
            natural_sort_paths(&mut files);
            match files.into_iter().next() {
                Some(file) => assets.push(Asset::from_file(file_name(&path), file)),
                None => debug!("no asset file in {}", path.display()),
            }
        }
    }
    Ok(assets)
}

/// The scene file of an extracted scene directory: the first one whose name contains `pattern`
pub fn find_scene_file(dir: impl AsRef<Path>, pattern: &str) -> Result<Option<PathBuf>> {
    let dir = dir.as_ref();
    let mut names = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read scene dir {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && file_name(path).contains(pattern))
        .collect::<Vec<_>>();
    names.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(names.into_iter().next())
}

/// Scene instances that also exist as an extracted model
pub fn filter_instances(instances: Vec<String>, models: &[Asset]) -> Vec<Asset> {
    instances
        .into_iter()
        .filter(|name| models.iter().any(|m| &m.id == name))
        .map(Asset::from_instance)
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;

    use super::*;

    #[test]
    fn test_suffix_regex() {
        let re = suffix_regex(DEFAULT_SUFFIX).unwrap();
        assert!(re.is_match("usd"));
        assert!(re.is_match("USDC"));
        assert!(!re.is_match("usdz"));
        assert!(!re.is_match("png"));
    }

    #[test]
    fn test_scan_library() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("chair/chair_02/chair_02.usd").touch().unwrap();
        root.child("chair/chair_01/chair_01.usd").touch().unwrap();
        root.child("table/table_01/table_01.usda").touch().unwrap();
        root.child("table/broken/other.usd").touch().unwrap();
        root.child("readme.txt").touch().unwrap();

        let re = suffix_regex(DEFAULT_SUFFIX).unwrap();
        let assets = scan_library(root.path(), &re).unwrap();
        let ids: Vec<_> = assets.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["chair_01", "chair_02", "table_01"]);
        assert_eq!(
            assets[2].source,
            AssetRef::File { path: root.path().join("table/table_01/table_01.usda") }
        );
    }

    #[test]
    fn test_scan_library_missing_root() {
        let re = suffix_regex(DEFAULT_SUFFIX).unwrap();
        assert!(scan_library("/nonexistent/library", &re).is_err());
    }

    #[test]
    fn test_scan_models() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("lamp_10.usd").touch().unwrap();
        root.child("lamp_2.usd").touch().unwrap();
        root.child("sofa/mesh.usdc").touch().unwrap();
        root.child("empty").create_dir_all().unwrap();
        root.child("notes.md").touch().unwrap();

        let re = suffix_regex(DEFAULT_SUFFIX).unwrap();
        let ids: Vec<_> = scan_models(root.path(), &re).unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, ["lamp_2", "lamp_10", "sofa"]);
    }

    #[test]
    fn test_scene_file_and_instances() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("room.usd").touch().unwrap();
        root.child("room_copy.usd").touch().unwrap();
        assert_eq!(
            find_scene_file(root.path(), "copy.usd").unwrap(),
            Some(root.path().join("room_copy.usd"))
        );
        assert_eq!(find_scene_file(root.path(), "missing.usd").unwrap(), None);

        let models = vec![Asset::from_file("chair", "m/chair.usd"), Asset::from_file("lamp", "m/lamp.usd")];
        let picked = filter_instances(vec!["wall".into(), "lamp".into(), "chair".into()], &models);
        assert_eq!(picked, vec![Asset::from_instance("lamp"), Asset::from_instance("chair")]);
    }
}
