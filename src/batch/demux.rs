//! Key merged batch results back to asset names

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;

/// asset name -> annotation text
pub type AnnotationRecord = BTreeMap<String, String>;

/// canonical `custom_id` -> every asset sharing its result
pub type DuplicateGroups = BTreeMap<usize, Vec<String>>;

#[derive(Deserialize)]
struct ResultLine {
    custom_id: String,
    response: Option<ResultResponse>,
}

#[derive(Deserialize)]
struct ResultResponse {
    body: Option<ResultBody>,
}

#[derive(Deserialize)]
struct ResultBody {
    #[serde(default)]
    choices: Vec<ResultChoice>,
}

#[derive(Deserialize)]
struct ResultChoice {
    message: Option<ResultMessage>,
}

#[derive(Deserialize)]
struct ResultMessage {
    content: Option<String>,
}

/// `(custom_id, content)` of one result line, `None` when it carries no content
pub fn parse_line(line: &str) -> Result<Option<(usize, String)>> {
    let parsed: ResultLine = serde_json::from_str(line)?;
    let content = parsed
        .response
        .and_then(|r| r.body)
        .and_then(|b| b.choices.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.is_empty());
    match content {
        Some(content) => {
            let id = parsed
                .custom_id
                .trim()
                .parse()
                .with_context(|| format!("bad custom_id `{}`", parsed.custom_id))?;
            Ok(Some((id, content)))
        }
        None => Ok(None),
    }
}

/// Every usable result of a merged result file, in file order
///
/// Malformed lines are logged and skipped.
pub fn read_results(path: &Path) -> Result<Vec<(usize, String)>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut results = vec![];
    for (no, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line?;
        let line = match std::str::from_utf8(&line) {
            Ok(line) => line,
            Err(e) => {
                warn!("{}:{}: invalid utf-8: {}", path.display(), no + 1, e);
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => warn!("{}:{}: parsing line error: {}", path.display(), no + 1, e),
        }
    }
    info!("read {} results from {}", results.len(), path.display());
    Ok(results)
}

/// `names[custom_id] -> text`
pub fn demux_by_names(results: &[(usize, String)], names: &[String]) -> AnnotationRecord {
    let mut record = AnnotationRecord::new();
    for (id, text) in results {
        match names.get(*id) {
            Some(name) => {
                record.insert(name.clone(), text.clone());
            }
            None => warn!("custom_id {} out of range for {} assets", id, names.len()),
        }
    }
    record
}

/// Fan each canonical result out to every member of its group
pub fn demux_by_groups(results: &[(usize, String)], groups: &DuplicateGroups) -> AnnotationRecord {
    let by_id: HashMap<usize, &String> = results.iter().map(|(id, text)| (*id, text)).collect();
    let mut record = AnnotationRecord::new();
    for (id, members) in groups {
        match by_id.get(id) {
            Some(text) => {
                for name in members {
                    record.insert(name.clone(), (*text).clone());
                }
            }
            None => warn!("no result for group {} ({} assets)", id, members.len()),
        }
    }
    record
}

pub fn load_names(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid name list {}", path.display()))
}

/// Group file keys are JSON strings holding the canonical id
pub fn load_groups(path: &Path) -> Result<DuplicateGroups> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let raw: BTreeMap<String, Vec<String>> =
        serde_json::from_str(&text).with_context(|| format!("invalid group file {}", path.display()))?;
    raw.into_iter()
        .map(|(k, v)| -> Result<(usize, Vec<String>)> {
            let id = k.trim().parse().with_context(|| format!("bad group id `{}`", k))?;
            Ok((id, v))
        })
        .collect()
}

pub fn save_record(record: &AnnotationRecord, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(record)?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!("saved {} annotations to {}", record.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_line(id: &str, content: &str) -> String {
        serde_json::json!({
            "id": "batch_req_1",
            "custom_id": id,
            "response": {"status_code": 200, "body": {"choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]}},
            "error": null
        })
        .to_string()
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(&result_line("3", "a lamp")).unwrap(), Some((3, "a lamp".to_string())));
        assert_eq!(parse_line(&result_line("3", "")).unwrap(), None);
        assert_eq!(parse_line(r#"{"custom_id":"4","response":null}"#).unwrap(), None);
        assert!(parse_line("{not json").is_err());
        assert!(parse_line(&result_line("x", "a lamp")).is_err());
    }

    #[test]
    fn test_read_results_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.jsonl");
        let text = [result_line("0", "a chair"), "garbage".into(), String::new(), result_line("1", "")]
            .join("\n");
        let mut data = text.into_bytes();
        data.extend_from_slice(b"\n\xff\xfe garbage\n");
        data.extend_from_slice(result_line("2", "a lamp").as_bytes());
        std::fs::write(&path, data).unwrap();
        assert_eq!(
            read_results(&path).unwrap(),
            vec![(0, "a chair".to_string()), (2, "a lamp".to_string())]
        );
    }

    #[test]
    fn test_demux_by_names() {
        let names = vec!["chair".to_string(), "table".to_string()];
        let results = vec![(1, "a table".to_string()), (0, "a chair".to_string()), (7, "lost".to_string())];
        let record = demux_by_names(&results, &names);
        assert_eq!(record.len(), 2);
        assert_eq!(record["chair"], "a chair");
        assert_eq!(record["table"], "a table");
    }

    #[test]
    fn test_duplicate_group_fan_out() {
        let groups = DuplicateGroups::from([
            (0, vec!["chairA".to_string(), "chairB".to_string()]),
            (5, vec!["sofa".to_string()]),
        ]);
        let results = vec![(0, "a wooden chair".to_string())];
        let record = demux_by_groups(&results, &groups);
        assert_eq!(record.len(), 2);
        assert_eq!(record["chairA"], "a wooden chair");
        assert_eq!(record["chairB"], "a wooden chair");
    }

    #[test]
    fn test_group_keyed_by_custom_id_not_position() {
        // results arrive out of order; group 2 must still get id 2's text
        let groups = DuplicateGroups::from([(2, vec!["lampA".to_string(), "lampB".to_string()])]);
        let results = vec![(2, "a brass lamp".to_string()), (0, "a chair".to_string())];
        let record = demux_by_groups(&results, &groups);
        assert_eq!(record["lampB"], "a brass lamp");
    }

    #[test]
    fn test_load_groups_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let groups_path = dir.path().join("groups.json");
        std::fs::write(&groups_path, r#"{"0": ["chairA", "chairB"], "3": ["desk"]}"#).unwrap();
        let groups = load_groups(&groups_path).unwrap();
        assert_eq!(groups[&0], ["chairA", "chairB"]);

        let record = demux_by_groups(&[(3, "a desk".into())], &groups);
        let out = dir.path().join("captions.json");
        save_record(&record, &out).unwrap();
        let saved: AnnotationRecord = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(saved, record);
    }
}
