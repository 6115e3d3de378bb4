//! Reference question banks.
//!
//! A bank root holds one folder per module, `output_<n>/questions.json`,
//! each a JSON array of questions. Two views are built from it:
//!
//! * **topic references**: every question carrying a label (by default
//!   [`RECENT_EXAM_LABEL`]), formatted as plain text;
//! * **style guide**: a random sample of at most [`STYLE_GUIDE_SAMPLE`]
//!   questions, reshaped to `{question, options{A..D}, correct_option,
//!   image_link, labels}` and pretty-printed as JSON.
//!
//! Module files that are missing or unparsable are logged and skipped.

use crate::error::Pdf2McqError;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Label that marks recent exam questions.
pub const RECENT_EXAM_LABEL: &str = "#recentNEET";

/// Maximum number of style-guide questions sent with a prompt.
pub const STYLE_GUIDE_SAMPLE: usize = 25;

/// A question as stored in a bank file. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BankQuestion {
    /// Number or string, depending on the exporter.
    #[serde(default)]
    pub question_number: Option<serde_json::Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub options: Vec<BankOption>,
    #[serde(default)]
    pub question_media_path: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BankOption {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub is_correct_answer: bool,
}

impl BankQuestion {
    fn number_label(&self) -> String {
        match &self.question_number {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => "N/A".to_string(),
            Some(other) => other.to_string(),
        }
    }

    fn correct_option(&self) -> Option<&BankOption> {
        self.options.iter().find(|o| o.is_correct_answer)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A question reshaped for the style guide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleGuideQuestion {
    pub question: String,
    /// Option letter → full option text (`"A. ..."`).
    pub options: BTreeMap<String, String>,
    /// Letter of the correct option, or empty when none is marked.
    pub correct_option: String,
    pub image_link: Option<String>,
    pub labels: Vec<String>,
}

impl From<&BankQuestion> for StyleGuideQuestion {
    fn from(q: &BankQuestion) -> Self {
        let mut options = BTreeMap::new();
        let mut correct_option = String::new();

        for opt in &q.options {
            let text = opt.text.clone().unwrap_or_default();
            let letter = text.split('.').next().unwrap_or_default().trim();
            if matches!(letter, "A" | "B" | "C" | "D") {
                if opt.is_correct_answer {
                    correct_option = letter.to_string();
                }
                options.insert(letter.to_string(), text.clone());
            }
        }

        Self {
            question: q.text.clone().unwrap_or_default(),
            options,
            correct_option,
            image_link: q.question_media_path.clone(),
            labels: q.labels.clone(),
        }
    }
}

/// Parse a comma-separated module list such as `"1,3,8"`.
///
/// Blank input yields an empty list.
pub fn parse_module_list(input: &str) -> Result<Vec<u32>, Pdf2McqError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    input
        .split(',')
        .map(|n| {
            n.trim().parse::<u32>().map_err(|_| {
                Pdf2McqError::QuestionBank(format!(
                    "invalid module list '{input}': use comma-separated numbers (e.g. 1,3,8)"
                ))
            })
        })
        .collect()
}

/// Keep only questions carrying `label`.
pub fn filter_by_label(questions: Vec<BankQuestion>, label: &str) -> Vec<BankQuestion> {
    questions.into_iter().filter(|q| q.has_label(label)).collect()
}

/// Format questions as the plain-text reference block of a prompt.
pub fn format_reference_text(questions: &[BankQuestion]) -> String {
    let mut out = String::new();
    for q in questions {
        let correct = q
            .correct_option()
            .and_then(|o| o.text.as_deref())
            .unwrap_or("N/A");

        out.push_str(&format!("Question {}:\n", q.number_label()));
        out.push_str(&format!("{}\n", q.text.as_deref().unwrap_or_default()));
        out.push_str("Options:\n");
        for opt in &q.options {
            out.push_str(&format!("{}\n", opt.text.as_deref().unwrap_or_default()));
        }
        let image = q
            .question_media_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or("None");
        out.push_str(&format!("Question Image: {image}\n"));
        out.push_str(&format!("Correct Option: {correct}\n\n"));
    }
    out.trim().to_string()
}

/// Up to `amount` questions; all of them, in order, if there are no more.
pub fn sample<R: Rng + ?Sized>(
    questions: Vec<BankQuestion>,
    amount: usize,
    rng: &mut R,
) -> Vec<BankQuestion> {
    if questions.len() <= amount {
        return questions;
    }
    questions.choose_multiple(rng, amount).cloned().collect()
}

/// Pretty-printed style-guide JSON.
pub fn style_guide_json(questions: &[BankQuestion]) -> Result<String, Pdf2McqError> {
    let shaped: Vec<StyleGuideQuestion> = questions.iter().map(StyleGuideQuestion::from).collect();
    serde_json::to_string_pretty(&shaped)
        .map_err(|e| Pdf2McqError::QuestionBank(format!("style guide serialisation: {e}")))
}

/// Topic reference questions, ready for a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicReferences {
    /// Module list as entered, for the run log.
    pub modules: String,
    pub text: String,
    /// Questions loaded before filtering.
    pub loaded: usize,
    /// Questions that carried the label.
    pub matched: usize,
}

/// Style-guide questions, ready for a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleGuide {
    /// Module list as entered, for the run log.
    pub modules: String,
    /// `{}` when no modules were given, otherwise a JSON array.
    pub json: String,
    pub loaded: usize,
    pub sampled: usize,
}

/// A directory of `output_<n>/questions.json` module files.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    root: PathBuf,
}

impl QuestionBank {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of module `n`'s question file.
    pub fn module_path(&self, n: u32) -> PathBuf {
        self.root.join(format!("output_{n}")).join("questions.json")
    }

    /// Load and concatenate the given modules, skipping unusable files.
    pub async fn load_modules(&self, modules: &[u32]) -> Vec<BankQuestion> {
        let mut all = Vec::new();
        for &n in modules {
            let path = self.module_path(n);
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping question file {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<Vec<BankQuestion>>(&raw) {
                Ok(questions) => all.extend(questions),
                Err(e) => warn!("Could not parse {}: {}", path.display(), e),
            }
        }
        all
    }

    /// Labelled questions from `modules`, formatted as reference text.
    pub async fn topic_references(
        &self,
        modules: &str,
        label: &str,
    ) -> Result<TopicReferences, Pdf2McqError> {
        let numbers = parse_module_list(modules)?;
        if numbers.is_empty() {
            info!("No topic modules given; prompt gets no reference questions");
            return Ok(TopicReferences::default());
        }

        let all = self.load_modules(&numbers).await;
        let loaded = all.len();
        let filtered = filter_by_label(all, label);
        info!(
            "Found {} topic questions, {} labelled {}",
            loaded,
            filtered.len(),
            label
        );

        Ok(TopicReferences {
            modules: modules.trim().to_string(),
            text: format_reference_text(&filtered),
            loaded,
            matched: filtered.len(),
        })
    }

    /// A random style-guide sample from `modules`.
    pub async fn style_guide<R: Rng + ?Sized>(
        &self,
        modules: &str,
        rng: &mut R,
    ) -> Result<StyleGuide, Pdf2McqError> {
        let numbers = parse_module_list(modules)?;
        if numbers.is_empty() {
            info!("No style-guide modules given");
            return Ok(StyleGuide {
                modules: String::new(),
                json: "{}".to_string(),
                loaded: 0,
                sampled: 0,
            });
        }

        let all = self.load_modules(&numbers).await;
        let loaded = all.len();
        let picked = sample(all, STYLE_GUIDE_SAMPLE, rng);
        info!("Found {} style-guide questions, using {}", loaded, picked.len());

        Ok(StyleGuide {
            modules: modules.trim().to_string(),
            json: style_guide_json(&picked)?,
            loaded,
            sampled: picked.len(),
        })
    }
}
