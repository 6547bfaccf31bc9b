//! Chat-completion request lines for the batch service
//!
//! One line per asset; `custom_id` is the asset's index in the returned name
//! list, so results can be mapped back after the round trip.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::ValueEnum;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::utils::natural_sort_paths;

pub const BATCH_ENDPOINT: &str = "/v1/chat/completions";
pub const COMPLETION_WINDOW: &str = "24h";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f64 = 0.26;

/// Only the first views take part in any selection
const MAX_VIEWS: usize = 24;

pub const SYSTEM_PROMPT: &str = "You are a professional 3D asset annotation expert with extensive \
experience in 3D modeling and computer graphics. Please carefully analyze the provided image content \
based on your expertise and return accurate results strictly according to the specified format. \
Ensure your output is concise and clear, containing only the required valid value without any \
additional explanations or formatting.";

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// A few sentences describing the object
    Caption,
    /// A single category name
    Category,
    /// Index of the canonical front view
    FrontView,
    /// 0 if the object looks the same from every side, else 1
    Symmetry,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Caption => "caption",
            Task::Category => "category",
            Task::FrontView => "front_view",
            Task::Symmetry => "symmetry",
        }
    }

    /// `(stride over the first views, trailing views appended)`
    fn selection(&self) -> (usize, usize) {
        match self {
            Task::FrontView => (1, 0),
            Task::Symmetry => (4, 0),
            Task::Caption | Task::Category => (8, 3),
        }
    }

    /// Views sent along with the prompt, from the naturally sorted view list
    pub fn select_images(&self, mut images: Vec<PathBuf>) -> Vec<PathBuf> {
        natural_sort_paths(&mut images);
        let (stride, tail) = self.selection();
        let mut picked: Vec<PathBuf> =
            images.iter().take(MAX_VIEWS).step_by(stride).cloned().collect();
        if tail > 0 {
            picked.extend_from_slice(&images[images.len().saturating_sub(tail)..]);
        }
        picked
    }

    pub fn user_prompt(&self, image_number: usize) -> String {
        let views = format!(
            "You are presented with {} distinct rendered views of an indoor object captured against a neutral gray-white background.",
            image_number
        );
        match self {
            Task::Caption => format!(
                "{} Provide a comprehensive description of this object using clear, detailed sentences. \
                 Focus on its shape, predominant colors, materials and surface finish, proportions, the state \
                 of movable parts, its functional purpose and distinctive design details. Generate 3-5 \
                 informative sentences with specific, factual descriptions. Use clear, objective language \
                 without bullet points or line breaks.",
                views
            ),
            Task::Category => format!(
                "{} Analyze the object and classify it into a single, precise category based on its primary \
                 function and characteristics. Provide ONLY the category name as your response - no additional \
                 text, explanation, or formatting.",
                views
            ),
            Task::FrontView => format!(
                "The 3D asset is represented by {n} separate images showing different views of the object.\n\
                 Identify the canonical front view index (0-{last}) from these {n} orthogonal images.\n\
                 Using 3D modeling standards. Output only the integer with no additional text or formatting.",
                n = image_number,
                last = image_number.saturating_sub(1)
            ),
            Task::Symmetry => format!(
                "You are given {} images showing a 360-degree rotation of the same object. Please analyze these \
                 images and determine:\nDoes the object appear nearly identical from all angles, such as being \
                 spherical, cylindrical, or highly symmetric?\nBased on your analysis, output exactly one of the \
                 following:\n- '0': If the object appear nearly identical from all angles.\n- '1': Else.\n\
                 Do NOT provide any additional explanation. Only return one number: 0, 1",
                image_number
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

/// One line of the batch input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequestRecord {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: ChatBody,
}

pub fn png_data_url(path: &Path) -> Result<String> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(data)))
}

#[derive(Debug, Clone)]
pub struct RequestBuilder {
    pub task: Task,
    pub model: String,
    pub temperature: f64,
}

impl RequestBuilder {
    pub fn new(task: Task) -> Self {
        Self { task, model: DEFAULT_MODEL.to_string(), temperature: DEFAULT_TEMPERATURE }
    }

    /// System prompt, then one user message with the text prompt and every image
    pub fn messages(&self, images: &[PathBuf]) -> Result<Vec<ChatMessage>> {
        let urls = images.par_iter().map(|p| png_data_url(p)).collect::<Result<Vec<_>>>()?;
        let mut parts = vec![ContentPart::Text { text: self.task.user_prompt(images.len()) }];
        parts.extend(urls.into_iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url, detail: "low".to_string() },
        }));
        Ok(vec![
            ChatMessage { role: "system".into(), content: MessageContent::Text(SYSTEM_PROMPT.into()) },
            ChatMessage { role: "user".into(), content: MessageContent::Parts(parts) },
        ])
    }

    pub fn body(&self, images: &[PathBuf]) -> Result<ChatBody> {
        Ok(ChatBody {
            model: self.model.clone(),
            messages: self.messages(images)?,
            temperature: self.temperature,
        })
    }

    /// Request records for every asset directory holding at least one view
    ///
    /// Returns the records and the asset names their `custom_id`s index into.
    pub fn build(&self, assets: &[(String, PathBuf)]) -> Result<(Vec<BatchRequestRecord>, Vec<String>)> {
        let mut records = vec![];
        let mut names = vec![];
        for (name, dir) in assets {
            let images = self.task.select_images(list_views(dir)?);
            if images.is_empty() {
                warn!("{}: no rendered views in {}, skipping", name, dir.display());
                continue;
            }
            records.push(BatchRequestRecord {
                custom_id: names.len().to_string(),
                method: "POST".to_string(),
                url: BATCH_ENDPOINT.to_string(),
                body: self.body(&images)?,
            });
            names.push(name.clone());
        }
        Ok((records, names))
    }

    /// Build and write the records as JSON lines to `path`
    pub fn write_jsonl(&self, assets: &[(String, PathBuf)], path: &Path) -> Result<Vec<String>> {
        let (records, names) = self.build(assets)?;
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for record in &records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        info!("wrote {} requests to {}", records.len(), path.display());
        Ok(names)
    }
}

/// Rendered view files of one asset directory
pub fn list_views(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut views = vec![];
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")) {
            views.push(path);
        }
    }
    Ok(views)
}

/// `(asset name, view dir)` for every subdirectory of `root`, natural sorted
pub fn list_asset_dirs(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = vec![];
    for entry in std::fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    natural_sort_paths(&mut dirs);
    Ok(dirs
        .into_iter()
        .filter_map(|dir| {
            let name = dir.file_name()?.to_string_lossy().into_owned();
            Some((name, dir))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;
    use rstest::rstest;

    use super::*;

    fn views(n: usize) -> Vec<PathBuf> {
        (0..n).rev().map(|i| PathBuf::from(format!("chair_{i}.png"))).collect()
    }

    fn indices(paths: &[PathBuf]) -> Vec<usize> {
        paths
            .iter()
            .map(|p| {
                let stem = p.file_stem().unwrap().to_string_lossy();
                stem.rsplit('_').next().unwrap().parse().unwrap()
            })
            .collect()
    }

    #[rstest]
    #[case(Task::FrontView, 4, vec![0, 1, 2, 3])]
    #[case(Task::Symmetry, 30, vec![0, 4, 8, 12, 16, 20])]
    #[case(Task::Caption, 30, vec![0, 8, 16, 27, 28, 29])]
    #[case(Task::Category, 2, vec![0, 0, 1])]
    fn test_select_images(#[case] task: Task, #[case] n: usize, #[case] expected: Vec<usize>) {
        assert_eq!(indices(&task.select_images(views(n))), expected);
    }

    #[test]
    fn test_front_view_prompt_counts() {
        let prompt = Task::FrontView.user_prompt(8);
        assert!(prompt.contains("represented by 8 separate images"));
        assert!(prompt.contains("(0-7)"));
    }

    #[test]
    fn test_build_records() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("chair/chair_0.png").write_binary(b"\x89PNG0").unwrap();
        root.child("chair/chair_1.png").write_binary(b"\x89PNG1").unwrap();
        root.child("empty").create_dir_all().unwrap();
        root.child("table/table_0.png").write_binary(b"\x89PNG2").unwrap();

        let assets = list_asset_dirs(root.path()).unwrap();
        assert_eq!(assets.iter().map(|a| a.0.as_str()).collect::<Vec<_>>(), ["chair", "empty", "table"]);

        let builder = RequestBuilder::new(Task::FrontView);
        let out = root.child("input.jsonl");
        let names = builder.write_jsonl(&assets, out.path()).unwrap();
        assert_eq!(names, ["chair", "table"]);

        let text = std::fs::read_to_string(out.path()).unwrap();
        let lines: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["custom_id"], "1");
        assert_eq!(lines[0]["method"], "POST");
        assert_eq!(lines[0]["url"], "/v1/chat/completions");
        assert_eq!(lines[0]["body"]["model"], "gpt-4o");
        assert_eq!(lines[0]["body"]["temperature"], 0.26);
        assert_eq!(lines[0]["body"]["messages"][0]["role"], "system");
        let content = &lines[0]["body"]["messages"][1]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["detail"], "low");
        assert_eq!(
            content[1]["image_url"]["url"],
            format!("data:image/png;base64,{}", BASE64.encode(b"\x89PNG0"))
        );
        assert_eq!(content.as_array().unwrap().len(), 3);
    }
}
