//! Stack-frame extraction from free-form stack trace and console text.
//!
//! Browsers and runtimes disagree on frame syntax, so extraction layers
//! a few patterns per line and takes the first hit: Chrome/Node
//! `at f (file:1:2)`, Firefox/Safari `f@file:1:2`, and bare `file.js:1`
//! references in console output.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// `at name (file:line[:col])`, name and parentheses both optional
    static ref CALL_FRAME: Regex =
        Regex::new(r"^\s*at\s+(?:.*?\s)?\(?(\S+?):(\d+)(?::(\d+))?\)?\s*$").unwrap();
    /// bare `file:line:col` token; `@` is excluded from the file so the
    /// Firefox `name@file` form splits on its own
    static ref BARE_TOKEN: Regex = Regex::new(r"([^\s@]+?):(\d+):(\d+)").unwrap();
    /// `file.<script ext>:line`, column absent
    static ref FILE_LINE: Regex = Regex::new(r"(\S+\.(?:m?jsx?|tsx?)):(\d+)\b").unwrap();
}

/// One call site pulled out of a trace line. Produced independently of
/// any source map; callers correlate by `file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrameRef {
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// the originating text line, trimmed
    pub raw: String,
}

/// Lazily yields one frame per matching line.
///
/// The iterator borrows the input, so extraction is restartable: calling
/// again on the same text re-derives the same finite sequence.
pub fn extract_frames(text: &str) -> Frames<'_> {
    Frames {
        lines: text.split(['\n', '\r']),
    }
}

pub struct Frames<'a> {
    lines: std::str::Split<'a, [char; 2]>,
}

impl Iterator for Frames<'_> {
    type Item = StackFrameRef;

    fn next(&mut self) -> Option<StackFrameRef> {
        for line in self.lines.by_ref() {
            if let Some(frame) = match_line(line) {
                return Some(frame);
            }
        }
        None
    }
}

fn match_line(line: &str) -> Option<StackFrameRef> {
    let caps = CALL_FRAME
        .captures(line)
        .or_else(|| BARE_TOKEN.captures(line))
        .or_else(|| FILE_LINE.captures(line))?;

    let file = normalize_file(capture(&caps, 1)?);
    if file.is_empty() {
        return None;
    }
    let parsed_line = capture(&caps, 2)?.parse().ok()?;
    let column = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);

    Some(StackFrameRef {
        file,
        line: parsed_line,
        column,
        raw: line.trim().to_string(),
    })
}

fn capture<'t>(caps: &Captures<'t>, index: usize) -> Option<&'t str> {
    caps.get(index).map(|m| m.as_str())
}

/// Strip wrapping noise from a matched file reference. A trailing `)`
/// comes from call-wrapped frames; a final unclosed parenthesized group
/// that looks like a path wins over the text around it (eval frames,
/// decorated log lines).
fn normalize_file(raw: &str) -> String {
    let mut file = raw.trim();
    if let Some(stripped) = file.strip_suffix(')') {
        file = stripped;
    }
    if let Some(index) = file.rfind('(') {
        let inner = file[index + 1..].trim();
        if !inner.contains(')') && looks_like_path(inner) {
            file = inner;
        }
    }
    file.to_string()
}

fn looks_like_path(text: &str) -> bool {
    if text.starts_with('/')
        || text.starts_with("./")
        || text.starts_with("../")
        || text.starts_with("webpack")
    {
        return true;
    }
    if text.contains(".js") || text.contains(".ts") {
        return true;
    }
    text.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric())
    })
}
