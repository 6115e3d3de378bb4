//! Batch Assembly Pipeline: convert one page range without per-page UI,
//! then turn the notes into a question-generation run.
//!
//! Steps, in order:
//!
//! 1. run the conversion driver (escalations go to the supplied observer);
//! 2. save the notes;
//! 3. load topic references and a style-guide sample from the banks;
//! 4. fill and save the prompt;
//! 5. generate questions, save them, and write the run log.
//!
//! Template and module lists are checked before step 1. A run that the
//! operator aborts or cancels, or that yields no notes, stops after step 1
//! and writes nothing.

use crate::artifacts::{topic_slug, run_timestamp, ArtifactLayout, RunRecord, SavedQuestions};
use crate::config::PageRange;
use crate::driver::{CancelFlag, ConversionDriver, ConversionRequest};
use crate::error::Pdf2McqError;
use crate::generate::{assemble_prompt, generate_questions, load_template, PromptInputs};
use crate::output::{ConversionOutcome, ConversionStats};
use crate::pipeline::llm::TextModel;
use crate::progress::ConversionObserver;
use crate::questions::{parse_module_list, QuestionBank, RECENT_EXAM_LABEL};
use rand::Rng;
use std::path::PathBuf;
use tracing::info;

/// Inputs of one batch run.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub document: PathBuf,
    pub range: PageRange,
    /// Topic name; spaces become underscores in file names.
    pub topic: String,
    pub template: PathBuf,
    pub topic_bank: PathBuf,
    /// Comma-separated module numbers, e.g. `"2,5,18"`. May be empty.
    pub topic_modules: String,
    /// Label that selects topic reference questions.
    pub topic_label: String,
    pub style_bank: PathBuf,
    /// Comma-separated module numbers, e.g. `"1,3,8"`. May be empty.
    pub style_modules: String,
    /// Directory receiving every artifact folder.
    pub output_root: PathBuf,
}

impl BatchSettings {
    pub fn new(document: impl Into<PathBuf>, range: PageRange, topic: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            range,
            topic: topic.into(),
            template: PathBuf::from("prompt_template.txt"),
            topic_bank: PathBuf::from("."),
            topic_modules: String::new(),
            topic_label: RECENT_EXAM_LABEL.to_string(),
            style_bank: PathBuf::from("."),
            style_modules: String::new(),
            output_root: PathBuf::from("."),
        }
    }
}

/// What a completed batch run produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub notes: PathBuf,
    pub prompt: PathBuf,
    pub questions: SavedQuestions,
    pub question_count: usize,
    pub run_log: PathBuf,
    pub conversion: ConversionStats,
}

/// How a batch run ended.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Completed(Box<BatchReport>),
    /// The operator ended the conversion at this page ordinal.
    Aborted { ordinal: usize },
    Cancelled,
}

/// Run the whole pipeline for `settings`.
pub async fn run_batch<O, R>(
    driver: &ConversionDriver,
    text_model: &dyn TextModel,
    settings: &BatchSettings,
    observer: &mut O,
    cancel: CancelFlag,
    rng: &mut R,
) -> Result<BatchOutcome, Pdf2McqError>
where
    O: ConversionObserver + ?Sized,
    R: Rng + ?Sized,
{
    // Fail on bad inputs before spending a conversion on them.
    let template = load_template(&settings.template).await?;
    parse_module_list(&settings.topic_modules)?;
    parse_module_list(&settings.style_modules)?;

    let request = ConversionRequest::new(&settings.document, settings.range);
    let output = match driver.spawn_with(request, cancel).observe(observer).await? {
        ConversionOutcome::Completed(output) => output,
        ConversionOutcome::Aborted { ordinal } => return Ok(BatchOutcome::Aborted { ordinal }),
        ConversionOutcome::Cancelled => return Ok(BatchOutcome::Cancelled),
    };

    if output.markdown.trim().is_empty() {
        return Err(Pdf2McqError::Generation(
            "no notes to generate from: every page was skipped or empty".into(),
        ));
    }

    let layout = ArtifactLayout::new(&settings.output_root);
    let notes = layout.save_notes(&settings.topic, &output.markdown).await?;

    let references = QuestionBank::new(&settings.topic_bank)
        .topic_references(&settings.topic_modules, &settings.topic_label)
        .await?;
    let style = QuestionBank::new(&settings.style_bank)
        .style_guide(&settings.style_modules, rng)
        .await?;

    let prompt = assemble_prompt(
        &template,
        PromptInputs {
            markdown: &output.markdown,
            topic_references: &references.text,
            style_guide_json: &style.json,
        },
    );
    let prompt_path = layout.save_prompt(&settings.topic, &prompt).await?;

    let questions = generate_questions(text_model, &prompt).await?;
    if questions.is_empty() {
        return Err(Pdf2McqError::Generation(
            "the model returned no questions".into(),
        ));
    }

    let timestamp = run_timestamp();
    let saved = layout
        .save_questions(&settings.topic, &timestamp, &questions)
        .await?;
    let record = RunRecord {
        timestamp,
        pdf_page_range: settings.range.to_string(),
        markdown_filename: format!("{}.md", topic_slug(&settings.topic)),
        topic_pyq_modules: references.modules,
        style_guide_pyq_modules: style.modules,
        generated_question_file: saved.file_name.clone(),
    };
    let run_log = layout.save_run_record(&record).await?;
    info!(
        "Batch run for '{}' done: {} questions",
        settings.topic,
        questions.len()
    );

    Ok(BatchOutcome::Completed(Box::new(BatchReport {
        notes,
        prompt: prompt_path,
        questions: saved,
        question_count: questions.len(),
        run_log,
        conversion: output.stats,
    })))
}
