//! Prompts and prompt-assembly formats.
//!
//! Every string sent to the generation service is built here, so changing a
//! prompt never touches orchestration or error handling.

/// Instruction sent with each page image during extraction.
pub const TRANSCRIBE_PAGE_PROMPT: &str =
    "Transcribe all visible text in this document page exactly as it appears. Return only the text.";

/// Page text used when extraction degrades under the placeholder policy.
pub const EXTRACTION_PLACEHOLDER: &str = "[OCR Failed - Could not extract text]";

/// Agent output used when the service returns no text.
pub const EMPTY_GENERATION: &str = "No output generated.";

/// Instruction for rewriting the notes scratchpad.
pub const OPTIMIZE_NOTES_PROMPT: &str = r#"You are an expert editor and technical writer. Reformat the following raw notes into a clean, well-structured Markdown document.

Directives:
1. Use proper Markdown headers (#, ##) for sections.
2. Use bullet points for lists.
3. Bold key terms or numbers.
4. Fix any typos or grammar issues.
5. Keep the content concise but do not lose any information.

Raw Notes:
"#;

/// Header + body of one page inside the aggregated context.
pub fn page_segment(page_number: usize, text: &str) -> String {
    format!("[Page {page_number} Content]:\n{text}\n\n")
}

/// Full text prompt for one agent.
pub fn agent_prompt(prompt_template: &str, context: &str) -> String {
    format!("{prompt_template}\n\nContext:\n{context}")
}

/// Full text prompt for the notes rewrite.
pub fn optimize_notes_prompt(notes: &str) -> String {
    format!("{OPTIMIZE_NOTES_PROMPT}{notes}")
}

/// Degraded agent output carrying the failure message.
pub fn agent_error_output(agent_name: &str, message: &str) -> String {
    format!("Error executing agent {agent_name}: {message}")
}
