//! Generated-position to original-position lookup.

use super::codeframe::code_frame;
use super::{ParsedSourceMap, Segment};

/// Lines of surrounding source shown in a snippet by default.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// A resolved original location. Immutable result value; `line` and
/// `column` are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
    pub source_index: u32,
    pub snippet: Option<String>,
}

/// Resolve a 1-based generated (line, column) to its original position.
///
/// Returns `None` when the line has no mappings, the governing segment
/// is a gap, or the segment's source index is out of bounds.
pub fn resolve(map: &ParsedSourceMap, line: u32, column: u32) -> Option<OriginalPosition> {
    resolve_with_context(map, line, column, DEFAULT_CONTEXT_LINES)
}

pub fn resolve_with_context(
    map: &ParsedSourceMap,
    line: u32,
    column: u32,
    context: usize,
) -> Option<OriginalPosition> {
    let row = map.lines.get(line.checked_sub(1)? as usize)?.as_ref()?;
    let segment = floor_segment(row, column.saturating_sub(1))?;

    let source_index = segment.source?;
    let raw_source = map.sources.get(source_index as usize)?;
    let source = join_source_root(map.source_root.as_deref(), raw_source);

    let original_line = segment.original_line.map_or(1, |l| l + 1);
    let original_column = segment.original_column.map_or(1, |c| c + 1);
    let name = segment
        .name
        .and_then(|index| map.names.get(index as usize))
        .cloned();

    let snippet = map
        .sources_content
        .as_ref()
        .and_then(|contents| contents.get(source_index as usize))
        .and_then(|content| content.as_deref())
        .map(|text| code_frame(text, original_line, original_column, context));

    Some(OriginalPosition {
        source,
        line: original_line,
        column: original_column,
        name,
        source_index,
        snippet,
    })
}

/// Rightmost segment whose `generated_column <= column`. When every
/// segment on the row starts past `column`, the first segment still
/// governs.
fn floor_segment(row: &[Segment], column: u32) -> Option<&Segment> {
    let index = row.partition_point(|segment| segment.generated_column <= column);
    if index == 0 { row.first() } else { row.get(index - 1) }
}

fn join_source_root(root: Option<&str>, source: &str) -> String {
    match root {
        None | Some("") => source.to_string(),
        Some(root) => {
            if root.ends_with('/') && source.starts_with('/') {
                format!("{}{}", root, &source[1..])
            } else if root.ends_with('/') || source.starts_with('/') {
                format!("{root}{source}")
            } else {
                format!("{root}/{source}")
            }
        }
    }
}
