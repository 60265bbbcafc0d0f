//! Prompts for section regeneration.
//!
//! Every prompt lives here so wording changes touch exactly one file and
//! tests can inspect prompts without a provider. Callers can replace the
//! system prompt via [`crate::config::LlmWriterConfig::system_prompt`].

use crate::context::GenerationContext;
use crate::model::DocumentSection;
use std::fmt::Write;

/// Default system prompt for rewriting one HTML section.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert technical writer. You rewrite one section of an HTML document so that it describes a new project, keeping the section's structure intact.

Follow these rules precisely:

1. STRUCTURE
   - Keep the same heading level for the leading heading
   - Keep every table as a <table>; keep header cells as <th> inside <thead>
   - Keep lists as <ul>/<ol> with <li> items
   - Do not add sections that the original does not have

2. CONTENT
   - Replace project-specific facts with facts about the new project
   - Respect every variable given in the context exactly as written
   - Keep the tone and length of the original

3. OUTPUT FORMAT
   - Output ONLY the HTML fragment for this section
   - Do NOT use Markdown, do NOT wrap the output in ``` fences
   - Do NOT prefix the output with "html"
   - Do NOT add <html>, <head> or <body> elements
   - Close every element you open"#;

/// Build the user prompt for one section.
pub fn section_prompt(section: &DocumentSection, context: &GenerationContext) -> String {
    let mut prompt = String::with_capacity(section.html_content.len() + 512);
    prompt.push_str("Rewrite the following document section using the new project context.\n\n");

    let _ = writeln!(prompt, "Original section ({}):", section.section_type);
    prompt.push_str(&section.html_content);
    prompt.push_str("\n\nContext:\n");
    let _ = writeln!(prompt, "Project name: {}", context.project_name);
    let _ = writeln!(prompt, "Project description: {}", context.project_description);

    let cleaned = context.cleaned_prompt();
    if !cleaned.is_empty() {
        let _ = writeln!(prompt, "Instructions: {cleaned}");
    }

    let vars = context.effective_vars();
    if !vars.is_empty() {
        prompt.push_str("Variables (use these values exactly):\n");
        for (key, value) in &vars {
            let _ = writeln!(prompt, "- {key}: {value}");
        }
    }

    if section.metadata.level > 0 {
        let _ = write!(
            prompt,
            "\nStart with an <h{0}> heading, like the original.",
            section.metadata.level
        );
    }
    prompt.push_str("\nReturn valid HTML only.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{build_context, ContextInput};
    use crate::pipeline::parse::parse_sections;

    #[test]
    fn prompt_contains_section_and_context() {
        let section = &parse_sections("<h2>Stack</h2><p>Django</p>")[0];
        let ctx = build_context(
            ContextInput::new("FinStack", "Payments")
                .prompt(r#"Modern stack {"frontend": "Next.js"}"#)
                .strict_var("db", "postgres"),
        )
        .unwrap();
        let p = section_prompt(section, &ctx);
        assert!(p.contains("<h2>Stack</h2><p>Django</p>"));
        assert!(p.contains("Project name: FinStack"));
        assert!(p.contains("Instructions: Modern stack"));
        assert!(!p.contains(r#"{"frontend""#));
        assert!(p.contains("- frontend: Next.js"));
        assert!(p.contains("- db: postgres"));
        assert!(p.contains("<h2> heading"));
    }

    #[test]
    fn system_prompt_forbids_markdown() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Do NOT use Markdown"));
    }
}
