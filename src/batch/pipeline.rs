//! Submit -> wait -> download -> merge, one group at a time
//!
//! A failed job fails its whole group; other groups are unaffected.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::batch::client::BatchService;
use crate::batch::fragment::merge_files;
use crate::batch::manifest::{Submission, group_of};
use crate::batch::request::Task;
use crate::batch::tracker::{JobTracker, PollConfig};
use crate::error::BatchError;

/// Where the merged results of one group end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPaths {
    pub output: PathBuf,
    pub errors: PathBuf,
}

impl ResultPaths {
    pub fn in_dir(dir: &Path, group: &str, task: Task) -> Self {
        Self {
            output: dir.join(format!("{}_{}_result.jsonl", group, task.as_str())),
            errors: dir.join(format!("{}_{}_error.jsonl", group, task.as_str())),
        }
    }

    /// Per-job download target: `<stem>_<idx>.jsonl` next to `path`
    fn indexed(path: &Path, idx: usize) -> PathBuf {
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        path.with_file_name(format!("{}_{}.jsonl", stem, idx))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrieveReport {
    pub jobs: usize,
    /// Merged output file, absent when no job produced results
    pub output: Option<PathBuf>,
    pub errors: Option<PathBuf>,
}

pub struct Pipeline<'a, S: ?Sized> {
    tracker: JobTracker<'a, S>,
}

impl<'a, S: BatchService + ?Sized> Pipeline<'a, S> {
    pub fn new(service: &'a S, poll: PollConfig) -> Self {
        Self { tracker: JobTracker::new(service, poll) }
    }

    pub async fn submit(
        &self,
        input: &Path,
        group: Option<&str>,
        task: Task,
        budget: u64,
    ) -> Result<Submission, BatchError> {
        let group = group.map(str::to_string).unwrap_or_else(|| group_of(input));
        let batch_ids = self.tracker.submit_all(input, budget).await?;
        Ok(Submission { group, task, batch_ids })
    }

    /// Wait for every job of the group, download and merge the results
    pub async fn retrieve(
        &self,
        submission: &Submission,
        paths: &ResultPaths,
    ) -> Result<RetrieveReport, BatchError> {
        let mut outputs = vec![];
        let mut errors = vec![];
        for (idx, job_id) in submission.batch_ids.iter().enumerate() {
            let job = self.tracker.wait_terminal(job_id).await?;
            let downloaded = self
                .tracker
                .retrieve(
                    &job,
                    &ResultPaths::indexed(&paths.output, idx),
                    &ResultPaths::indexed(&paths.errors, idx),
                )
                .await?;
            outputs.extend(downloaded.output);
            errors.extend(downloaded.errors);
        }

        let mut report = RetrieveReport { jobs: submission.batch_ids.len(), ..Default::default() };
        if outputs.is_empty() {
            warn!("group {}: no job produced an output file", submission.group);
        } else {
            merge_files(&paths.output, &outputs)?;
            report.output = Some(paths.output.clone());
        }
        if !errors.is_empty() {
            merge_files(&paths.errors, &errors)?;
            warn!("group {}: failed requests merged into {}", submission.group, paths.errors.display());
            report.errors = Some(paths.errors.clone());
        }
        info!("group {}: retrieved {} jobs", submission.group, report.jobs);
        Ok(report)
    }

    /// Retrieve several groups, isolating failures per group
    pub async fn retrieve_all(
        &self,
        submissions: &[Submission],
        dir: &Path,
    ) -> Vec<(String, Result<RetrieveReport, BatchError>)> {
        let mut results = vec![];
        for submission in submissions {
            let paths = ResultPaths::in_dir(dir, &submission.group, submission.task);
            let result = self.retrieve(submission, &paths).await;
            if let Err(e) = &result {
                error!("group {} failed: {}", submission.group, e);
            }
            results.push((submission.group.clone(), result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::batch::client::RemoteJob;
    use crate::batch::demux;
    use crate::batch::tracker::tests::FakeService;

    fn line(id: usize, content: &str) -> String {
        serde_json::json!({
            "custom_id": id.to_string(),
            "response": {"body": {"choices": [{"message": {"content": content}}]}}
        })
        .to_string()
            + "\n"
    }

    fn fast() -> PollConfig {
        PollConfig { interval: std::time::Duration::from_millis(1), max_polls: Some(5) }
    }

    #[tokio::test]
    async fn test_submit_retrieve_demux() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("0007_input.jsonl");
        std::fs::write(&input, "{\"custom_id\":\"0\"}\n{\"custom_id\":\"1\"}\n").unwrap();

        let service = FakeService {
            files: HashMap::from([
                ("out-batch-1".to_string(), line(0, "a wooden chair").into_bytes()),
                ("out-batch-2".to_string(), line(1, "a glass table").into_bytes()),
            ]),
            ..Default::default()
        };
        let pipeline = Pipeline::new(&service, fast());
        let submission = pipeline.submit(&input, None, Task::Caption, 20).await.unwrap();
        assert_eq!(submission.group, "0007");
        assert_eq!(submission.batch_ids, ["batch-1", "batch-2"]);

        let paths = ResultPaths::in_dir(dir.path(), "0007", Task::Caption);
        let report = pipeline.retrieve(&submission, &paths).await.unwrap();
        assert_eq!(report.output.as_deref(), Some(paths.output.as_path()));
        assert_eq!(report.errors, None);
        // per-job downloads are consumed by the merge
        assert!(!dir.path().join("0007_caption_result_0.jsonl").exists());

        let results = demux::read_results(&paths.output).unwrap();
        let names = vec!["chair".to_string(), "table".to_string()];
        let record = demux::demux_by_names(&results, &names);
        assert_eq!(record["chair"], "a wooden chair");
        assert_eq!(record["table"], "a glass table");
    }

    #[tokio::test]
    async fn test_failed_job_fails_only_its_group() {
        let dir = tempfile::tempdir().unwrap();
        let service = FakeService {
            files: HashMap::from([("out-ok".to_string(), line(0, "a lamp").into_bytes())]),
            ..Default::default()
        };
        {
            let mut statuses = service.statuses.lock().unwrap();
            statuses.insert("batch-a1".into(), vec![FakeService::completed("batch-a1", "out-ok")]);
            statuses.insert(
                "batch-a2".into(),
                vec![RemoteJob {
                    errors: Some(serde_json::json!({"data": [{"code": "invalid_request"}]})),
                    ..FakeService::job("batch-a2", "failed")
                }],
            );
            statuses.insert("batch-b1".into(), vec![FakeService::completed("batch-b1", "out-ok")]);
        }
        let submissions = vec![
            Submission { group: "a".into(), task: Task::Category, batch_ids: vec!["batch-a1".into(), "batch-a2".into()] },
            Submission { group: "b".into(), task: Task::Category, batch_ids: vec!["batch-b1".into()] },
        ];

        let pipeline = Pipeline::new(&service, fast());
        let results = pipeline.retrieve_all(&submissions, dir.path()).await;
        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0].1, Err(BatchError::JobFailed { job_id, .. }) if job_id == "batch-a2"));
        assert!(!dir.path().join("a_category_result.jsonl").exists());
        let report = results[1].1.as_ref().unwrap();
        assert_eq!(std::fs::read_to_string(report.output.as_ref().unwrap()).unwrap(), line(0, "a lamp"));
    }
}
