//! Prompt text: the page transcription instruction and the question-prompt
//! template placeholders.
//!
//! The transcription instruction can be overridden per job via
//! [`crate::config::InstructionSource`]; the constant here is used only when
//! no override is provided. Question templates are always supplied by the
//! caller and only their placeholders are known to the crate.

/// Default instruction sent with every page image.
pub const DEFAULT_TRANSCRIPTION_INSTRUCTION: &str = r#"You are an expert transcriber of scanned study material. Convert the attached page image to clean, well-structured Markdown.

1. TEXT
   - Transcribe ALL text on the page, in natural reading order
   - Keep medical and scientific terminology, abbreviations and units exactly as printed

2. STRUCTURE
   - Use ## for section headings and ### for subsections
   - Use - for bullet lists and 1. 2. 3. for numbered lists, preserving nesting
   - Use **bold** and *italic* to match visual emphasis

3. TABLES AND FIGURES
   - Convert tables to GFM pipe tables
   - Describe flowcharts and diagrams briefly in italics instead of drawing them

4. OUTPUT
   - Output ONLY the Markdown content
   - Do NOT wrap the output in ```markdown fences
   - Do NOT add commentary, page numbers or running headers"#;

/// Placeholder replaced by the converted notes.
pub const MARKDOWN_PLACEHOLDER: &str = "{{INSERT_MARKDOWN_CONTENT_HERE}}";

/// Placeholder replaced by the topic reference questions (plain text).
pub const TOPIC_QUESTIONS_PLACEHOLDER: &str = "{{INSERT_THE_4_TOPIC_SPECIFIC_PYQS_HERE}}";

/// Placeholder replaced by the style-guide questions (JSON).
pub const STYLE_GUIDE_PLACEHOLDER: &str = "{{INSERT_THE_25_RANDOM_COMM_MED_PYQS_HERE}}";

/// Substitute the three placeholders of a question template.
///
/// Replacement is literal and applies to every occurrence. Substituted text
/// is not re-scanned, so notes that happen to contain a placeholder string
/// are left alone by later substitutions.
pub fn fill_question_template(
    template: &str,
    markdown: &str,
    topic_questions: &str,
    style_guide_json: &str,
) -> String {
    let mut out = String::with_capacity(
        template.len() + markdown.len() + topic_questions.len() + style_guide_json.len(),
    );
    let mut rest = template;

    loop {
        let next = [
            (MARKDOWN_PLACEHOLDER, markdown),
            (TOPIC_QUESTIONS_PLACEHOLDER, topic_questions),
            (STYLE_GUIDE_PLACEHOLDER, style_guide_json),
        ]
        .into_iter()
        .filter_map(|(needle, value)| rest.find(needle).map(|pos| (pos, needle, value)))
        .min_by_key(|(pos, _, _)| *pos);

        match next {
            Some((pos, needle, value)) => {
                out.push_str(&rest[..pos]);
                out.push_str(value);
                rest = &rest[pos + needle.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}
