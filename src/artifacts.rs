//! Files produced by a question-generation run.
//!
//! ```text
//! <root>/processed_notes/<topic>.md
//! <root>/final_prompt/<topic>.md
//! <root>/Generated_Questions/<topic>_<YYYYmmdd_HHMMSS>.json
//! <root>/generated_CSV/<topic>_<YYYYmmdd_HHMMSS>.csv
//! ```
//!
//! `<topic>` is the topic name with spaces replaced by underscores. All
//! writes go to a temporary sibling first and are renamed into place.

use crate::error::Pdf2McqError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const NOTES_DIR: &str = "processed_notes";
pub const PROMPT_DIR: &str = "final_prompt";
pub const QUESTIONS_DIR: &str = "Generated_Questions";
pub const RUN_LOG_DIR: &str = "generated_CSV";

/// Format of the run timestamp used in artifact names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File-name stem for a topic.
pub fn topic_slug(topic: &str) -> String {
    topic.trim().replace(' ', "_")
}

/// Local time formatted with [`TIMESTAMP_FORMAT`].
pub fn run_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// One row of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: String,
    pub pdf_page_range: String,
    pub markdown_filename: String,
    pub topic_pyq_modules: String,
    pub style_guide_pyq_modules: String,
    pub generated_question_file: String,
}

/// A saved question file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedQuestions {
    pub path: PathBuf,
    pub file_name: String,
}

/// Where a run's artifacts go.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn notes_path(&self, topic: &str) -> PathBuf {
        self.root
            .join(NOTES_DIR)
            .join(format!("{}.md", topic_slug(topic)))
    }

    pub fn prompt_path(&self, topic: &str) -> PathBuf {
        self.root
            .join(PROMPT_DIR)
            .join(format!("{}.md", topic_slug(topic)))
    }

    pub async fn save_notes(&self, topic: &str, markdown: &str) -> Result<PathBuf, Pdf2McqError> {
        let path = self.notes_path(topic);
        write_atomic(&path, markdown.as_bytes()).await?;
        info!("Markdown notes saved to {}", path.display());
        Ok(path)
    }

    pub async fn save_prompt(&self, topic: &str, prompt: &str) -> Result<PathBuf, Pdf2McqError> {
        let path = self.prompt_path(topic);
        write_atomic(&path, prompt.as_bytes()).await?;
        info!("Final prompt saved for review to {}", path.display());
        Ok(path)
    }

    /// Write questions as pretty JSON, named with `timestamp`.
    pub async fn save_questions(
        &self,
        topic: &str,
        timestamp: &str,
        questions: &[serde_json::Value],
    ) -> Result<SavedQuestions, Pdf2McqError> {
        let file_name = format!("{}_{}.json", topic_slug(topic), timestamp);
        let path = self.root.join(QUESTIONS_DIR).join(&file_name);
        let json = serde_json::to_string_pretty(questions)
            .map_err(|e| Pdf2McqError::Internal(format!("question serialisation: {e}")))?;
        write_atomic(&path, json.as_bytes()).await?;
        info!("{} questions saved to {}", questions.len(), path.display());
        Ok(SavedQuestions { path, file_name })
    }

    /// Write a one-row CSV run log named after the notes file.
    pub async fn save_run_record(&self, record: &RunRecord) -> Result<PathBuf, Pdf2McqError> {
        let stem = record
            .markdown_filename
            .strip_suffix(".md")
            .unwrap_or(&record.markdown_filename);
        let path = self
            .root
            .join(RUN_LOG_DIR)
            .join(format!("{}_{}.csv", stem, record.timestamp));

        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.serialize(record)
            .map_err(|e| Pdf2McqError::Internal(format!("run log: {e}")))?;
        let bytes = wtr
            .into_inner()
            .map_err(|e| Pdf2McqError::Internal(format!("run log: {e}")))?;

        write_atomic(&path, &bytes).await?;
        info!("Run details saved to {}", path.display());
        Ok(path)
    }
}

/// Write `bytes` to `path` through a temporary sibling and a rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2McqError> {
    let fail = |source: std::io::Error| Pdf2McqError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}
