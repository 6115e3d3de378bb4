//! Question generation: fill the prompt template, ask the text model for
//! JSON, and parse the answer into a list of questions.
//!
//! Generated questions are kept as raw JSON values; their schema belongs
//! to the prompt template, not to this crate.

use crate::error::Pdf2McqError;
use crate::pipeline::llm::TextModel;
use crate::prompts::fill_question_template;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Inputs substituted into a question template.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub markdown: &'a str,
    pub topic_references: &'a str,
    pub style_guide_json: &'a str,
}

/// Read a question template from disk.
pub async fn load_template(path: &Path) -> Result<String, Pdf2McqError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        Pdf2McqError::Generation(format!(
            "could not read prompt template '{}': {e}",
            path.display()
        ))
    })
}

/// Substitute the three placeholders of `template`.
pub fn assemble_prompt(template: &str, inputs: PromptInputs<'_>) -> String {
    fill_question_template(
        template,
        inputs.markdown,
        inputs.topic_references,
        inputs.style_guide_json,
    )
}

/// Send `prompt` and parse the reply as a list of questions.
pub async fn generate_questions(
    model: &dyn TextModel,
    prompt: &str,
) -> Result<Vec<Value>, Pdf2McqError> {
    info!("Requesting questions ({} chars of prompt)", prompt.len());
    let raw = model
        .generate_json(prompt)
        .await
        .map_err(|e| Pdf2McqError::Generation(e.to_string()))?;
    debug!("Model returned {} chars", raw.len());

    let questions = parse_questions(&raw)?;
    info!("Generated {} questions", questions.len());
    Ok(questions)
}

/// Parse a model reply into questions.
///
/// Accepts a bare JSON array, or an object whose `questions` field is an
/// array. A surrounding ```json fence is tolerated.
pub fn parse_questions(raw: &str) -> Result<Vec<Value>, Pdf2McqError> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Pdf2McqError::Generation(format!("reply is not valid JSON: {e}")))?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(Pdf2McqError::Generation(
                "reply is a JSON object without a `questions` array".into(),
            )),
        },
        other => Err(Pdf2McqError::Generation(format!(
            "expected a JSON array of questions, got {}",
            type_name(&other)
        ))),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
