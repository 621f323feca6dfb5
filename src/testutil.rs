//! Shared fixtures for the test suites: a filesystem-backed stub extractor,
//! stub thumbnailers and a scripted prompt.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::{Map, Value as JsonValue};

use crate::catalog::{MetadataExtractor, Thumbnailer};
use crate::config::Config;
use crate::dupes::Prompt;
use crate::error::Result;

/// Fabricates exiftool-shaped metadata from real filesystem state, so
/// reconciliation tests exercise the same size/mtime/hash comparisons as
/// production without shelling out.
#[derive(Default)]
pub struct StubExtractor {
    /// Merged into every extraction.
    pub overrides: Map<String, JsonValue>,
    /// Merged into extractions for one specific filename, after `overrides`.
    pub per_file: HashMap<String, Map<String, JsonValue>>,
}

impl MetadataExtractor for StubExtractor {
    fn extract(&self, path: &Path) -> Option<JsonValue> {
        let meta = std::fs::metadata(path).ok()?;
        let mtime: DateTime<Local> = meta.modified().ok()?.into();

        let mut map = Map::new();
        map.insert("FileSize".to_string(), JsonValue::from(meta.len()));
        map.insert(
            "FileModifyDate".to_string(),
            JsonValue::String(mtime.format("%Y:%m:%d %H:%M:%S%.9f").to_string()),
        );
        map.insert("MIMEType".to_string(), JsonValue::String("image/png".to_string()));

        for (key, value) in &self.overrides {
            map.insert(key.clone(), value.clone());
        }
        let fname = path.file_name()?.to_string_lossy().into_owned();
        if let Some(extra) = self.per_file.get(&fname) {
            for (key, value) in extra {
                map.insert(key.clone(), value.clone());
            }
        }
        Some(JsonValue::Object(map))
    }
}

/// Records an empty png per file and returns its name.
pub struct StubThumbnailer {
    pub dir: PathBuf,
}

impl Thumbnailer for StubThumbnailer {
    fn generate(&self, _path: &Path, fname: &str, _mime_type: &str) -> Option<String> {
        let name = format!("{fname}.png");
        std::fs::create_dir_all(&self.dir).ok()?;
        std::fs::write(self.dir.join(&name), b"").ok()?;
        Some(name)
    }
}

/// Never produces a thumbnail.
pub struct NoThumbnailer;

impl Thumbnailer for NoThumbnailer {
    fn generate(&self, _path: &Path, _fname: &str, _mime_type: &str) -> Option<String> {
        None
    }
}

pub fn test_config(root: &Path) -> Config {
    Config {
        db_path: root.join("metadata.sqlite3"),
        upload_dir: root.join("uploads"),
        thumbnail_dir: root.join("thumbnails"),
        thumbnail_size: 240,
    }
}

/// Prompt with pre-scripted answers; keeps a transcript of everything shown.
pub struct ScriptedPrompt {
    pub answers: VecDeque<char>,
    pub transcript: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[char]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            transcript: Vec::new(),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, message: &str, options: &[char]) -> Result<char> {
        self.transcript.push(message.to_string());
        let choice = self.answers.pop_front().expect("prompt asked more than scripted");
        assert!(
            options.contains(&choice),
            "scripted answer {choice:?} not among offered options {options:?}"
        );
        Ok(choice)
    }

    fn say(&mut self, message: &str) {
        self.transcript.push(message.to_string());
    }
}
