use stack_retrace_rs::sourcemap::{self, ParsedSourceMap, SourceMapCache};
use stack_retrace_rs::{RetraceError, extract_frames};

const MAP_JSON: &str = r#"{
    "version": 3,
    "file": "bundle.min.js",
    "sourceRoot": "webpack:///",
    "sources": ["src/checkout.ts"],
    "names": ["submitOrder"],
    "sourcesContent": ["export function submitOrder() {\n    return post('/order');\n}\n"],
    "mappings": "AAAA,SAASA,KCAT"
}"#;

#[test]
fn test_parse_resolve_and_snippet() {
    let map = ParsedSourceMap::parse(MAP_JSON).expect("parse failed");
    assert_eq!(map.version, 3);
    assert_eq!(map.sources, vec!["src/checkout.ts"]);

    // column 10 falls in the second segment's range
    let position = sourcemap::resolve(&map, 1, 10).expect("no mapping");
    assert_eq!(position.source, "webpack:///src/checkout.ts");
    assert_eq!(position.line, 1);
    assert_eq!(position.column, 10);
    assert_eq!(position.name.as_deref(), Some("submitOrder"));

    let snippet = position.snippet.expect("snippet expected");
    assert!(snippet.contains("> 1 | export function submitOrder() {"));

    println!("resolved position:\n{snippet}");
}

#[test]
fn test_frame_extraction_feeds_resolution() {
    let trace = "TypeError: n is not a function\n    at submit (bundle.min.js:1:10)";
    let map = ParsedSourceMap::parse(MAP_JSON).expect("parse failed");

    let frames: Vec<_> = extract_frames(trace).collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].file, "bundle.min.js");

    let position = sourcemap::resolve(&map, frames[0].line, frames[0].column)
        .expect("frame did not resolve");
    assert_eq!(position.source, "webpack:///src/checkout.ts");
}

#[test]
fn test_gap_segment_short_circuits() {
    // a line holding only a gap segment must resolve to nothing, not to
    // a neighbouring mapping
    let json = r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"K"}"#;
    let map = ParsedSourceMap::parse(json).expect("parse failed");
    assert!(sourcemap::resolve(&map, 1, 20).is_none());
}

#[test]
fn test_indexed_maps_rejected() {
    let json = r#"{"version":3,"sections":[{"offset":{"line":0,"column":0}}]}"#;
    match ParsedSourceMap::parse(json) {
        Err(RetraceError::UnsupportedFormat(message)) => {
            assert!(message.contains("sections"));
        }
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[test]
fn test_corrupt_mappings_rejected() {
    let json = r#"{"version":3,"sources":["a.js"],"names":[],"mappings":"AAAA,g"}"#;
    assert!(matches!(
        ParsedSourceMap::parse(json),
        Err(RetraceError::MalformedMapping(_))
    ));
}

#[test]
fn test_inline_map_roundtrip_through_cache() {
    let payload = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        r#"{"version":3,"sources":["inline.ts"],"names":[],"mappings":"AAAA"}"#,
    );
    let generated =
        format!("fn();\n//# sourceMappingURL=data:application/json;base64,{payload}");

    let map = ParsedSourceMap::from_generated_source(&generated)
        .expect("extraction failed")
        .expect("inline map expected");

    let mut cache = SourceMapCache::new(60_000);
    cache.insert("bundle.min.js", map);

    let cached = cache.get("bundle.min.js").expect("cache miss");
    assert_eq!(cached.sources, vec!["inline.ts"]);
}
