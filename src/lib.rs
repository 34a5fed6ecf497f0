//! # stack-retrace-rs
//!
//! Deobfuscation engine for crash-report stack traces: source map
//! decoding and position lookup for minified JavaScript, plus
//! ProGuard-style mapping-table retrace and word-list substitution for
//! obfuscated mobile builds.
//!
//! ## Example
//!
//! ```rust
//! use stack_retrace_rs::extract_frames;
//!
//! let trace = "TypeError: n is not a function\n    at B (page-x.js:1:8190)";
//! let frame = extract_frames(trace).next().expect("no frame matched");
//! assert_eq!(frame.file, "page-x.js");
//! assert_eq!((frame.line, frame.column), (1, 8190));
//! ```

pub mod dispatch;
pub mod frames;
pub mod retrace;
pub mod sourcemap;
pub mod substitute;
pub mod vlq;

pub use dispatch::{Dispatcher, EngineKind, RuleRepository};
pub use frames::{StackFrameRef, extract_frames};
pub use retrace::{RenameTable, Retracer, retrace_file};
pub use sourcemap::{OriginalPosition, ParsedSourceMap, Segment, SourceMapCache};
pub use substitute::{SubstitutionRule, SubstitutionRules};

#[derive(Debug, thiserror::Error)]
pub enum RetraceError {
    #[error("unsupported source map format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed mappings: {0}")]
    MalformedMapping(String),

    #[error("invalid source map JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_then_resolve() {
        let map = ParsedSourceMap::parse(
            r#"{"version":3,"sources":["page-x.ts"],"names":[],"mappings":"AAAA"}"#,
        )
        .expect("parse failed");

        let trace = "    at B (page-x.js:1:8190)";
        let frame = extract_frames(trace).next().expect("no frame");
        let position =
            sourcemap::resolve(&map, frame.line, frame.column).expect("no mapping");

        assert_eq!(position.source, "page-x.ts");
        assert_eq!(position.line, 1);
    }
}
