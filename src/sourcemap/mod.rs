//! Source Map v3 model and parser.
//!
//! Parses the JSON sidecar emitted by minifiers into a per-line segment
//! table. Parsing is strict by contract: corrupt VLQ data or an indexed
//! map (`sections` key) aborts with a typed error, because guessing at
//! mapping data would hand the caller wrong source locations.

mod cache;
mod codeframe;
mod resolve;

pub use cache::{CacheEntry, SourceMapCache};
pub use codeframe::code_frame;
pub use resolve::{DEFAULT_CONTEXT_LINES, OriginalPosition, resolve, resolve_with_context};

use serde::Deserialize;

use crate::{Result, RetraceError, vlq};

/// An immutable, fully decoded source map.
///
/// `lines` is indexed by 0-based generated-line number; a `None` row has
/// no segments at all. Rows are sorted ascending by `generated_column`.
#[derive(Debug, Clone)]
pub struct ParsedSourceMap {
    pub version: u32,
    pub file: Option<String>,
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    pub names: Vec<String>,
    pub sources_content: Option<Vec<Option<String>>>,
    pub lines: Vec<Option<Vec<Segment>>>,
}

/// One mapping unit on a generated line.
///
/// A segment carrying only `generated_column` is a gap: the range it
/// covers has no source mapping, and lookups landing on it resolve to
/// nothing rather than to a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub generated_column: u32,
    pub source: Option<u32>,
    pub original_line: Option<u32>,
    pub original_column: Option<u32>,
    pub name: Option<u32>,
}

#[derive(Deserialize)]
struct RawSourceMap {
    #[serde(default)]
    version: u32,
    file: Option<String>,
    #[serde(rename = "sourceRoot")]
    source_root: Option<String>,
    #[serde(default)]
    sources: Vec<Option<String>>,
    #[serde(default)]
    names: Vec<Option<String>>,
    #[serde(rename = "sourcesContent")]
    sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    mappings: String,
    sections: Option<serde_json::Value>,
}

impl ParsedSourceMap {
    /// Parse a source map document.
    ///
    /// Fails with `UnsupportedFormat` on indexed maps (`sections`) and
    /// with `MalformedMapping` on any VLQ error. Null `sources`/`names`
    /// entries become empty strings; index positions matter, so nothing
    /// is dropped or deduplicated.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawSourceMap = serde_json::from_str(json)?;

        if raw.sections.is_some() {
            return Err(RetraceError::UnsupportedFormat(
                "indexed source maps (sections) are not supported".to_string(),
            ));
        }

        let lines = decode_mappings(&raw.mappings)?;
        tracing::debug!(
            sources = raw.sources.len(),
            generated_lines = lines.len(),
            "parsed source map"
        );

        Ok(Self {
            version: raw.version,
            file: raw.file,
            source_root: raw.source_root,
            sources: raw.sources.into_iter().map(Option::unwrap_or_default).collect(),
            names: raw.names.into_iter().map(Option::unwrap_or_default).collect(),
            sources_content: raw.sources_content,
            lines,
        })
    }

    /// Scan a generated file for a `//# sourceMappingURL=` comment and
    /// parse an inline base64 payload.
    ///
    /// Only `data:` URLs are decoded here; an external URL returns
    /// `Ok(None)` and fetching stays the caller's job.
    pub fn from_generated_source(generated: &str) -> Result<Option<Self>> {
        const URL_PREFIX: &str = "//# sourceMappingURL=";
        const DATA_PREFIX: &str = "data:application/json;base64,";

        for line in generated.lines().rev() {
            let Some(url) = line.trim().strip_prefix(URL_PREFIX) else {
                continue;
            };
            let Some(payload) = url.trim().strip_prefix(DATA_PREFIX) else {
                return Ok(None);
            };
            let decoded =
                base64::Engine::decode(&base64::engine::general_purpose::STANDARD, payload)
                    .map_err(|e| {
                        RetraceError::UnsupportedFormat(format!(
                            "invalid base64 source map payload: {e}"
                        ))
                    })?;
            let json = String::from_utf8(decoded).map_err(|e| {
                RetraceError::UnsupportedFormat(format!("source map payload is not UTF-8: {e}"))
            })?;
            return Self::parse(&json).map(Some);
        }
        Ok(None)
    }
}

/// Walk the `mappings` string byte by byte.
///
/// Five running deltas, all zeroed at each `;` (new generated line) and
/// never reset at `,`: deltas accumulate across the segments of a line,
/// gap segments included. A segment supplies 1 field (gap), 4 or 5
/// fields; 2-3 field segments are accepted permissively: the fields that
/// are present still feed their running deltas, but no source mapping is
/// recorded for them.
fn decode_mappings(mappings: &str) -> Result<Vec<Option<Vec<Segment>>>> {
    let bytes = mappings.as_bytes();
    let mut lines: Vec<Option<Vec<Segment>>> = Vec::new();
    let mut row: Vec<Segment> = Vec::new();

    let mut generated_column = 0i64;
    let mut source = 0i64;
    let mut original_line = 0i64;
    let mut original_column = 0i64;
    let mut name = 0i64;

    let mut pos = 0usize;
    while pos < bytes.len() {
        match bytes[pos] {
            b';' => {
                lines.push(finish_row(&mut row));
                generated_column = 0;
                source = 0;
                original_line = 0;
                original_column = 0;
                name = 0;
                pos += 1;
            }
            b',' => {
                pos += 1;
            }
            _ => {
                let mut fields = [0i64; 5];
                let mut count = 0usize;
                while pos < bytes.len() && bytes[pos] != b',' && bytes[pos] != b';' {
                    let (value, next) = vlq::decode(bytes, pos)?;
                    if count < fields.len() {
                        fields[count] = value;
                    }
                    count += 1;
                    pos = next;
                }

                generated_column += fields[0];
                let segment = if count >= 4 {
                    source += fields[1];
                    original_line += fields[2];
                    original_column += fields[3];
                    let name_index = if count >= 5 {
                        name += fields[4];
                        Some(name as u32)
                    } else {
                        None
                    };
                    Segment {
                        generated_column: generated_column as u32,
                        source: Some(source as u32),
                        original_line: Some(original_line as u32),
                        original_column: Some(original_column as u32),
                        name: name_index,
                    }
                } else {
                    if count >= 2 {
                        source += fields[1];
                    }
                    if count >= 3 {
                        original_line += fields[2];
                    }
                    Segment {
                        generated_column: generated_column as u32,
                        source: None,
                        original_line: None,
                        original_column: None,
                        name: None,
                    }
                };
                row.push(segment);
            }
        }
    }
    lines.push(finish_row(&mut row));

    Ok(lines)
}

fn finish_row(row: &mut Vec<Segment>) -> Option<Vec<Segment>> {
    if row.is_empty() {
        return None;
    }
    let mut finished = std::mem::take(row);
    // input order is not guaranteed sorted
    finished.sort_by_key(|segment| segment.generated_column);
    Some(finished)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_map() {
        let json = r#"{
            "version": 3,
            "file": "out.js",
            "sourceRoot": "",
            "sources": ["input.ts"],
            "names": ["greet"],
            "mappings": "AAAA,SAASA"
        }"#;

        let map = ParsedSourceMap::parse(json).unwrap();
        assert_eq!(map.version, 3);
        assert_eq!(map.file, Some("out.js".to_string()));
        assert_eq!(map.sources, vec!["input.ts"]);
        assert_eq!(map.names, vec!["greet"]);
        assert_eq!(map.lines.len(), 1);

        let row = map.lines[0].as_ref().unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row[0].generated_column, 0);
        assert_eq!(row[1].generated_column, 9);
        assert_eq!(row[1].name, Some(0));
    }

    #[test]
    fn test_rejects_indexed_maps() {
        let json = r#"{"version":3,"sections":[],"sources":[],"names":[],"mappings":""}"#;
        let err = ParsedSourceMap::parse(json).unwrap_err();
        assert!(matches!(err, RetraceError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_malformed_vlq_is_fatal() {
        let json = r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"AA!A"}"#;
        let err = ParsedSourceMap::parse(json).unwrap_err();
        assert!(matches!(err, RetraceError::MalformedMapping(_)));
    }

    #[test]
    fn test_null_sources_become_empty_strings() {
        let json = r#"{"version":3,"sources":["a.js",null,"b.js"],"names":[null],"mappings":""}"#;
        let map = ParsedSourceMap::parse(json).unwrap();
        assert_eq!(map.sources, vec!["a.js", "", "b.js"]);
        assert_eq!(map.names, vec![""]);
    }

    #[test]
    fn test_deltas_survive_gap_segments() {
        // AAAA sets the running deltas, E is a gap (generated column
        // only), EAEA must still see the accumulated state
        let json = r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"AAAA,E,EAEA"}"#;
        let map = ParsedSourceMap::parse(json).unwrap();

        let row = map.lines[0].as_ref().unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row[1].generated_column, 2);
        assert_eq!(row[1].source, None, "gap segment must not map");
        assert_eq!(row[2].generated_column, 4);
        assert_eq!(row[2].source, Some(0));
        assert_eq!(row[2].original_line, Some(2));
        assert_eq!(row[2].original_column, Some(0));
    }

    #[test]
    fn test_deltas_reset_at_line_boundary() {
        // second generated line starts from zeroed deltas
        let json = r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"SASS;SASS"}"#;
        let map = ParsedSourceMap::parse(json).unwrap();

        let first = map.lines[0].as_ref().unwrap();
        let second = map.lines[1].as_ref().unwrap();
        assert_eq!(first[0].generated_column, second[0].generated_column);
        assert_eq!(first[0].original_line, second[0].original_line);
        assert_eq!(first[0].original_column, second[0].original_column);
    }

    #[test]
    fn test_empty_rows_are_none() {
        let json = r#"{"version":3,"sources":["a.js"],"names":[],"mappings":";;AAAA"}"#;
        let map = ParsedSourceMap::parse(json).unwrap();
        assert_eq!(map.lines.len(), 3);
        assert!(map.lines[0].is_none());
        assert!(map.lines[1].is_none());
        assert!(map.lines[2].is_some());
    }

    #[test]
    fn test_rows_sorted_by_generated_column() {
        // SAAS then TAAT walks the generated column back to 0
        let json = r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"SAAS,TAAT"}"#;
        let map = ParsedSourceMap::parse(json).unwrap();

        let row = map.lines[0].as_ref().unwrap();
        assert_eq!(row[0].generated_column, 0);
        assert_eq!(row[1].generated_column, 9);
    }

    #[test]
    fn test_missing_mappings_field() {
        let json = r#"{"version":3,"sources":[],"names":[]}"#;
        let map = ParsedSourceMap::parse(json).unwrap();
        assert_eq!(map.lines.len(), 1);
        assert!(map.lines[0].is_none());
    }

    #[test]
    fn test_inline_data_url_extraction() {
        let map_json = r#"{"version":3,"sources":["a.ts"],"names":[],"mappings":"AAAA"}"#;
        let payload =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, map_json);
        let generated = format!(
            "console.log(1);\n//# sourceMappingURL=data:application/json;base64,{payload}\n"
        );

        let map = ParsedSourceMap::from_generated_source(&generated)
            .unwrap()
            .expect("inline map expected");
        assert_eq!(map.sources, vec!["a.ts"]);
    }

    #[test]
    fn test_external_map_url_is_left_to_caller() {
        let generated = "console.log(1);\n//# sourceMappingURL=bundle.js.map\n";
        assert!(ParsedSourceMap::from_generated_source(generated).unwrap().is_none());
    }

    #[test]
    fn test_no_map_url_comment() {
        assert!(ParsedSourceMap::from_generated_source("var x = 1;\n").unwrap().is_none());
    }
}
