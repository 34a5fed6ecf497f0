//! ProGuard/R8 `mapping.txt` parsing.
//!
//! ```text
//! original.ClassName -> a.a:
//!     fieldType fieldName -> b
//!     returnType methodName(params) -> a
//!     start:end:returnType methodName(params) -> a
//!     start:end:returnType methodName(params):origStart[:origEnd] -> a
//! ```
//!
//! The `:origStart[:origEnd]` suffix carries the original line range for
//! inlined methods; several ranged entries may share one obfuscated
//! name (inlining and overloads), which is where retrace ambiguity
//! comes from.

use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::FxHashMap;

lazy_static! {
    static ref CLASS_LINE: Regex = Regex::new(r"^(\S+)\s+->\s+(\S+):$").unwrap();
    static ref METHOD_RANGED: Regex = Regex::new(
        r"^\s+(\d+):(\d+):(\S+)\s+([^\s(]+)\(([^)]*)\)(?::(\d+)(?::(\d+))?)?\s+->\s+(\S+)$"
    )
    .unwrap();
    static ref METHOD_PLAIN: Regex =
        Regex::new(r"^\s+(\S+)\s+([^\s(]+)\(([^)]*)\)\s+->\s+(\S+)$").unwrap();
    static ref FIELD_LINE: Regex = Regex::new(r"^\s+(\S+)\s+(\S+)\s+->\s+(\S+)$").unwrap();
}

/// One ranged method entry: obfuscated lines `obf_start..=obf_end` map
/// onto original lines starting at `orig_start`.
#[derive(Debug, Clone)]
pub struct MemberRange {
    pub obf_start: u32,
    pub obf_end: u32,
    pub orig_start: u32,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct ClassEntry {
    pub original: String,
    /// ranged method entries keyed by obfuscated method name
    pub methods: FxHashMap<String, Vec<MemberRange>>,
    /// obfuscated method name -> original, entries without line info
    pub methods_plain: FxHashMap<String, String>,
    /// obfuscated field name -> original
    pub fields: FxHashMap<String, String>,
}

/// A candidate original frame for one obfuscated frame; several
/// candidates model ambiguous inlining. `line == None` means the source
/// line is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameCandidate {
    pub class: String,
    pub method: String,
    pub line: Option<u32>,
}

/// The rename table for one mapping file, keyed by obfuscated class
/// name. Loaded once, logically immutable afterwards.
#[derive(Debug, Default)]
pub struct RenameTable {
    classes: FxHashMap<String, ClassEntry>,
}

impl RenameTable {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Parse mapping text. Unrecognized lines are skipped, not errors:
    /// real mapping files carry comments and tool preamble.
    pub fn parse(text: &str) -> Self {
        let mut classes = FxHashMap::default();
        let mut current: Option<(String, ClassEntry)> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(caps) = CLASS_LINE.captures(line) {
                if let Some((obfuscated, entry)) = current.take() {
                    classes.insert(obfuscated, entry);
                }
                current = Some((
                    caps[2].to_string(),
                    ClassEntry {
                        original: caps[1].to_string(),
                        ..ClassEntry::default()
                    },
                ));
                continue;
            }

            let Some((_, entry)) = current.as_mut() else {
                continue;
            };

            if let Some(caps) = METHOD_RANGED.captures(line) {
                let obf_start: u32 = caps[1].parse().unwrap_or(0);
                let obf_end: u32 = caps[2].parse().unwrap_or(0);
                let orig_start = caps
                    .get(6)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(obf_start);
                entry
                    .methods
                    .entry(caps[8].to_string())
                    .or_default()
                    .push(MemberRange {
                        obf_start,
                        obf_end,
                        orig_start,
                        name: caps[4].to_string(),
                    });
            } else if let Some(caps) = METHOD_PLAIN.captures(line) {
                entry
                    .methods_plain
                    .entry(caps[4].to_string())
                    .or_insert_with(|| caps[2].to_string());
            } else if let Some(caps) = FIELD_LINE.captures(line) {
                entry.fields.insert(caps[3].to_string(), caps[2].to_string());
            }
        }

        if let Some((obfuscated, entry)) = current.take() {
            classes.insert(obfuscated, entry);
        }

        Self { classes }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Original name for an obfuscated class, if mapped.
    pub fn class(&self, obfuscated: &str) -> Option<&str> {
        self.classes.get(obfuscated).map(|entry| entry.original.as_str())
    }

    /// Class remap that falls back to the input when unmapped.
    pub fn class_or_self<'a>(&'a self, obfuscated: &'a str) -> &'a str {
        self.class(obfuscated).unwrap_or(obfuscated)
    }

    /// Original `(class, field)` for an obfuscated field reference.
    pub fn field(&self, class: &str, field: &str) -> Option<(&str, &str)> {
        let entry = self.classes.get(class)?;
        let original_field = entry.fields.get(field)?;
        Some((entry.original.as_str(), original_field.as_str()))
    }

    /// Original `(class, method)` for an obfuscated method reference,
    /// ignoring line information (message remaps, native frames).
    pub fn method(&self, class: &str, method: &str) -> Option<(&str, &str)> {
        let entry = self.classes.get(class)?;
        let original_method = entry
            .methods_plain
            .get(method)
            .map(String::as_str)
            .or_else(|| {
                entry
                    .methods
                    .get(method)
                    .and_then(|ranges| ranges.first())
                    .map(|range| range.name.as_str())
            })?;
        Some((entry.original.as_str(), original_method))
    }

    /// Candidate original frames for `class.method` at `line`
    /// (0 = unknown). `None` when the class itself is unmapped.
    pub fn frame_candidates(
        &self,
        class: &str,
        method: &str,
        line: u32,
    ) -> Option<Vec<FrameCandidate>> {
        let entry = self.classes.get(class)?;
        let mut candidates = Vec::new();

        if line > 0 {
            if let Some(ranges) = entry.methods.get(method) {
                for range in ranges {
                    if line >= range.obf_start && line <= range.obf_end {
                        candidates.push(FrameCandidate {
                            class: entry.original.clone(),
                            method: range.name.clone(),
                            line: Some(range.orig_start + (line - range.obf_start)),
                        });
                    }
                }
            }
            if candidates.is_empty() {
                // method resolved by name alone; the frame's line number
                // is preserved when no range covers it
                let method_name = entry
                    .methods_plain
                    .get(method)
                    .cloned()
                    .or_else(|| {
                        entry
                            .methods
                            .get(method)
                            .and_then(|ranges| ranges.first())
                            .map(|range| range.name.clone())
                    })
                    .unwrap_or_else(|| method.to_string());
                candidates.push(FrameCandidate {
                    class: entry.original.clone(),
                    method: method_name,
                    line: Some(line),
                });
            }
        } else {
            // line unknown: every known rename for this method is a
            // candidate, in mapping-file order
            let mut names: Vec<&str> = Vec::new();
            if let Some(plain) = entry.methods_plain.get(method) {
                names.push(plain);
            }
            if let Some(ranges) = entry.methods.get(method) {
                for range in ranges {
                    if !names.contains(&range.name.as_str()) {
                        names.push(range.name.as_str());
                    }
                }
            }
            if names.is_empty() {
                names.push(method);
            }
            candidates.extend(names.into_iter().map(|name| FrameCandidate {
                class: entry.original.clone(),
                method: name.to_string(),
                line: None,
            }));
        }

        Some(candidates)
    }
}
