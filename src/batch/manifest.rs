//! Record of submitted jobs, so retrieval can happen in another process

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::batch::request::Task;
use crate::error::BatchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Usually a scene index; results are retrieved per group
    pub group: String,
    pub task: Task,
    pub batch_ids: Vec<String>,
}

/// Group of a request file: its stem up to the first `_`
///
/// `0001_input_gpt-4o.jsonl` -> `0001`
pub fn group_of(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    stem.split('_').next().unwrap_or_default().to_string()
}

/// A missing manifest is an empty one
pub fn load(path: &Path) -> Result<Vec<Submission>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid submission manifest {}", path.display()))
}

/// Add `submission`, replacing an earlier one for the same group and task
pub fn record(path: &Path, submission: Submission) -> Result<()> {
    let mut submissions = load(path)?;
    submissions.retain(|s| !(s.group == submission.group && s.task == submission.task));
    info!(
        "recording {} jobs of group {} in {}",
        submission.batch_ids.len(),
        submission.group,
        path.display()
    );
    submissions.push(submission);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&submissions)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn find<'a>(
    submissions: &'a [Submission],
    group: &str,
    task: Task,
) -> Result<&'a Submission, BatchError> {
    submissions
        .iter()
        .find(|s| s.group == group && s.task == task)
        .ok_or_else(|| BatchError::UnknownGroup(group.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_of() {
        assert_eq!(group_of(Path::new("/data/0001_input_gpt-4o.jsonl")), "0001");
        assert_eq!(group_of(Path::new("captions.jsonl")), "captions");
    }

    #[test]
    fn test_record_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/submissions.json");
        assert!(load(&path).unwrap().is_empty());

        let sub = |group: &str, task, ids: &[&str]| Submission {
            group: group.to_string(),
            task,
            batch_ids: ids.iter().map(|s| s.to_string()).collect(),
        };
        record(&path, sub("0001", Task::Caption, &["batch-1"])).unwrap();
        record(&path, sub("0002", Task::Caption, &["batch-2", "batch-3"])).unwrap();
        record(&path, sub("0001", Task::Caption, &["batch-4"])).unwrap();
        record(&path, sub("0001", Task::Symmetry, &["batch-5"])).unwrap();

        let subs = load(&path).unwrap();
        assert_eq!(subs.len(), 3);
        assert_eq!(find(&subs, "0001", Task::Caption).unwrap().batch_ids, ["batch-4"]);
        assert_eq!(find(&subs, "0002", Task::Caption).unwrap().batch_ids.len(), 2);
        assert!(matches!(find(&subs, "0003", Task::Caption), Err(BatchError::UnknownGroup(_))));

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["task"], "caption");
    }
}
