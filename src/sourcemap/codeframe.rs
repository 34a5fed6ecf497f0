//! Plain-text code frame around a source position.
//!
//! Numbered gutter, `>` on the target row, caret row beneath it. The
//! exact spacing is part of the output contract with the rendering
//! layer, so the layout here is deliberately fixed.

/// Format a context block around a 1-based (line, column) in `text`,
/// showing `context` lines on each side of the target.
pub fn code_frame(text: &str, line: u32, column: u32, context: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let target = line.saturating_sub(1) as usize;
    let start = target.saturating_sub(context);
    let end = (target + context + 1).min(lines.len());
    let width = end.to_string().len();

    let mut rows = Vec::new();
    for (index, text_line) in lines.iter().enumerate().take(end).skip(start) {
        let number = index + 1;
        if index == target {
            rows.push(format!("> {number:>width$} | {text_line}"));
            let pad = " ".repeat(column.saturating_sub(1) as usize);
            rows.push(format!("  {:>width$} | {pad}^", ""));
        } else {
            rows.push(format!("  {number:>width$} | {text_line}"));
        }
    }
    rows.join("\n")
}
