//! Instruction template and the output filter that goes with it.

pub const INSTRUCTION_TEMPLATE: &str = r#"<<INSTRUCTION>>
You are a TDD expert. Your task is to generate **exactly one** test case to verify correctness.

**Response format:**
- Start with "Test case: "
- Provide the reason after "Reason: "
- Show an example with "Example: "

**Rules:**
- Only **one** test case per response.
- Do **not** output multiple test cases.
- Do **not** include code formatting (no markdown, no JSON, no backticks).
<</INSTRUCTION>>

"#;

pub const INSTRUCTION_END: &str = "<</INSTRUCTION>>";
pub const TASK_MARKER: &str = "Task:";
pub const FIELD_LABELS: [&str; 3] = ["Test case:", "Reason:", "Example:"];
pub const FIELD_SEPARATOR: &str = " | ";

/// Template followed by whatever comes after the last `Task:` marker.
pub fn build_prompt(input_text: &str) -> String {
    let task = input_text
        .rsplit(TASK_MARKER)
        .next()
        .unwrap_or(input_text)
        .trim();
    format!("{}{}", INSTRUCTION_TEMPLATE, task)
}

/// Drops the echoed instruction block from a decoded generation.
pub fn strip_instruction_echo(decoded: &str) -> &str {
    decoded
        .rsplit(INSTRUCTION_END)
        .next()
        .unwrap_or(decoded)
        .trim()
}

/// Keeps the first three lines mentioning one of the field labels.
///
/// The model is only asked to follow the format, so the result can be
/// empty or hold the same label twice.
pub fn extract_test_case(text: &str) -> String {
    text.lines()
        .filter(|line| FIELD_LABELS.iter().any(|label| line.contains(label)))
        .map(str::trim)
        .take(FIELD_LABELS.len())
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Full post-processing applied to the decoded output of a templated prompt.
pub fn postprocess(decoded: &str) -> String {
    extract_test_case(strip_instruction_echo(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_keeps_text_after_last_task_marker() {
        let prompt = build_prompt("ignore me Task: first Task:  add two numbers  ");
        assert!(prompt.starts_with(INSTRUCTION_TEMPLATE));
        assert!(prompt.ends_with("<</INSTRUCTION>>\n\nadd two numbers"));
    }

    #[test]
    fn prompt_without_marker_uses_whole_input() {
        assert_eq!(
            build_prompt("  reverse a string\n"),
            format!("{}reverse a string", INSTRUCTION_TEMPLATE)
        );
    }

    #[test]
    fn empty_input_yields_template_only() {
        assert_eq!(build_prompt(""), INSTRUCTION_TEMPLATE);
    }

    #[test]
    fn strips_echoed_instruction() {
        let decoded = format!("{}sum\nTest case: adds", INSTRUCTION_TEMPLATE);
        assert_eq!(strip_instruction_echo(&decoded), "sum\nTest case: adds");
        assert_eq!(strip_instruction_echo("  no echo here "), "no echo here");
    }

    #[test]
    fn keeps_at_most_three_labelled_lines() {
        let output = "\
intro
Test case: add(1, 2)
  Reason: basic addition
noise
Example: add(1, 2) == 3
Test case: add(-1, 1)
Reason: negatives";

        assert_eq!(
            extract_test_case(output),
            "Test case: add(1, 2) | Reason: basic addition | Example: add(1, 2) == 3"
        );
    }

    #[test]
    fn labels_match_anywhere_in_line() {
        let output = "1. Test case: empty list\n- Reason: edge";
        assert_eq!(
            extract_test_case(output),
            "1. Test case: empty list | - Reason: edge"
        );
    }

    #[test]
    fn unlabelled_output_filters_to_empty() {
        assert_eq!(extract_test_case("just some prose\nand more"), "");
    }

    #[test]
    fn postprocess_combines_both_steps() {
        let decoded = format!(
            "{}Task text Reason: echoed\nTest case: a\nReason: b\nExample: c\nExample: d",
            INSTRUCTION_TEMPLATE
        );
        assert_eq!(
            postprocess(&decoded),
            "Task text Reason: echoed | Test case: a | Reason: b"
        );
    }
}
