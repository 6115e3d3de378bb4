//! Conversion results: per-page blocks, the accumulated document, and the
//! terminal outcome of a job.

use serde::{Deserialize, Serialize};

/// Header line written before a page's text when page markers are enabled.
pub fn page_marker(ordinal: usize) -> String {
    format!("--- Page {ordinal} ---")
}

/// One page's contribution to the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBlock {
    /// 1-based position of the page within the requested range.
    pub ordinal: usize,
    /// 1-based page number within the document.
    pub absolute_page: usize,
    /// Text produced by the model (possibly empty).
    pub text: String,
}

impl PageBlock {
    /// Render the block as it appears in the assembled Markdown.
    ///
    /// With markers: `--- Page N ---`, blank line, text, blank line.
    /// Without markers: text, blank line.
    pub fn render(&self, include_marker: bool) -> String {
        if include_marker {
            format!("{}\n\n{}\n\n", page_marker(self.ordinal), self.text)
        } else {
            format!("{}\n\n", self.text)
        }
    }
}

/// Ordered, append-only sequence of page blocks.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedMarkdown {
    include_markers: bool,
    blocks: Vec<PageBlock>,
}

impl AccumulatedMarkdown {
    pub fn new(include_markers: bool) -> Self {
        Self {
            include_markers,
            blocks: Vec::new(),
        }
    }

    /// Append a page. Blocks must arrive in ascending ordinal order.
    pub fn push(&mut self, block: PageBlock) {
        debug_assert!(
            self.blocks
                .last()
                .is_none_or(|last| last.ordinal < block.ordinal),
            "page blocks must be appended in ascending order"
        );
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[PageBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Concatenate the blocks and trim surrounding whitespace.
    pub fn finish(&self) -> String {
        let joined: String = self
            .blocks
            .iter()
            .map(|b| b.render(self.include_markers))
            .collect();
        joined.trim().to_string()
    }
}

/// Counters collected while a job runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the requested range.
    pub total_pages: usize,
    /// Pages whose text was appended (including empty ones).
    pub converted_pages: usize,
    /// Pages the operator chose to skip.
    pub skipped_pages: usize,
    /// Converted pages for which the model produced no text.
    pub empty_pages: usize,
    /// Failed attempts across all pages.
    pub failed_attempts: usize,
    /// Times a page was escalated to the operator.
    pub escalations: usize,
    /// Wall-clock duration of the job.
    pub duration_ms: u64,
}

/// Successful result of a conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Final Markdown, trimmed.
    pub markdown: String,
    /// Every converted page, in order.
    pub pages: Vec<PageBlock>,
    pub stats: ConversionStats,
}

/// How a job that did not hit a fatal error ended.
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    /// Every page was converted or skipped.
    Completed(ConversionOutput),
    /// The operator chose to end the job at this page ordinal.
    Aborted { ordinal: usize },
    /// `stop()` was observed; no result is produced.
    Cancelled,
}

impl ConversionOutcome {
    /// The Markdown, if the job completed.
    pub fn markdown(&self) -> Option<&str> {
        match self {
            ConversionOutcome::Completed(out) => Some(&out.markdown),
            _ => None,
        }
    }

    pub fn into_output(self) -> Option<ConversionOutput> {
        match self {
            ConversionOutcome::Completed(out) => Some(out),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(ordinal: usize, text: &str) -> PageBlock {
        PageBlock {
            ordinal,
            absolute_page: ordinal + 2,
            text: text.to_string(),
        }
    }

    #[test]
    fn marker_block_layout() {
        assert_eq!(block(2, "Hello").render(true), "--- Page 2 ---\n\nHello\n\n");
        assert_eq!(block(2, "Hello").render(false), "Hello\n\n");
        assert_eq!(block(1, "").render(true), "--- Page 1 ---\n\n\n\n");
    }

    #[test]
    fn finish_concatenates_in_order_and_trims() {
        let mut acc = AccumulatedMarkdown::new(true);
        acc.push(block(1, "One"));
        acc.push(block(2, "Hello"));
        acc.push(block(3, "Three"));
        let md = acc.finish();
        assert_eq!(
            md,
            "--- Page 1 ---\n\nOne\n\n--- Page 2 ---\n\nHello\n\n--- Page 3 ---\n\nThree"
        );
        assert_eq!(md.matches("--- Page 2 ---\n\nHello\n\n").count(), 1);
    }

    #[test]
    fn finish_without_markers() {
        let mut acc = AccumulatedMarkdown::new(false);
        acc.push(block(1, "  One"));
        acc.push(block(2, "Two  "));
        assert_eq!(acc.finish(), "One\n\nTwo");
    }

    #[test]
    fn empty_accumulator_finishes_empty() {
        assert_eq!(AccumulatedMarkdown::new(true).finish(), "");
    }
}
