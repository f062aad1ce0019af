//! The fixed prompt contract.
//!
//! One system prompt per processor, kept as Markdown files under `prompts/`
//! and compiled in. The user-side instruction is identical for both.

use crate::processor::ProcessorKind;

pub const GENAI_SYSTEM_PROMPT: &str = include_str!("../prompts/genai_system_prompt.md");
pub const REQUESTY_SYSTEM_PROMPT: &str = include_str!("../prompts/requesty_system_prompt.md");

/// Fixed user instruction sent alongside the document.
pub const EXTRACTION_INSTRUCTION: &str =
    "Extract the requested fields with bounding boxes from this document.";

/// System prompt for a processor.
pub fn system_prompt(kind: ProcessorKind) -> &'static str {
    match kind {
        ProcessorKind::GenAi => GENAI_SYSTEM_PROMPT,
        ProcessorKind::Requesty => REQUESTY_SYSTEM_PROMPT,
    }
}
