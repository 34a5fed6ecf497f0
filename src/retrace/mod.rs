//! Mapping-table retrace over whole stack traces.
//!
//! Best-effort by contract: a crash report with an obfuscated frame
//! left in place is still a crash report, so every failure path
//! (unreadable mapping file included) returns the input unchanged.

pub mod mapping;

use std::path::Path;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

pub use mapping::{FrameCandidate, RenameTable};

lazy_static! {
    /// `at obf.Class.method(File:Line)`
    static ref AT_FRAME: Regex = Regex::new(
        r"^(?P<head>\s*at\s+)(?P<class>[\w.$]+)\.(?P<method>[\w$<>]+)\((?P<file>[^():]*)(?::(?P<line>\d+))?\)(?P<tail>.*)$"
    )
    .unwrap();
    /// platform-native frame: `#NN pc ADDR ... (obf.Class.method+OFFSET)`
    static ref NATIVE_FRAME: Regex = Regex::new(
        r"^(?P<head>\s*#\d+\s+pc\s+\S+\s+.*?)\((?P<class>[\w.$]+)\.(?P<method>[\w$<>]+)\+(?P<offset>\d+)\)(?P<tail>.*)$"
    )
    .unwrap();
    /// newer `class X cannot be cast to class Y` message shape
    static ref CAST_CLASS: Regex = Regex::new(
        r"class (?P<from>[\w.$]+) cannot be cast to class (?P<to>[\w.$]+)"
    )
    .unwrap();
    /// classic `X cannot be cast to Y`
    static ref CAST: Regex =
        Regex::new(r"(?P<from>[\w.$]+) cannot be cast to (?P<to>[\w.$]+)").unwrap();
    /// ART null-pointer field access
    static ref NPE_FIELD: Regex = Regex::new(
        r"Attempt to (?P<access>read from|write to) field '(?P<type>[\w.$\[\]]+) (?P<class>[\w.$]+)\.(?P<field>[\w$]+)'"
    )
    .unwrap();
    /// ART null-pointer method invocation
    static ref NPE_METHOD: Regex = Regex::new(
        r"Attempt to invoke (?P<kind>\w+) method '(?P<ret>[\w.$\[\]]+) (?P<class>[\w.$]+)\.(?P<method>[\w$<>]+)\((?P<args>[^)]*)\)'"
    )
    .unwrap();
    /// helpful-NPE clause; later runtimes pack two of these on one line
    static ref RETURN_VALUE: Regex = Regex::new(
        r#"the return value of "(?P<class>[\w.$]+)\.(?P<method>[\w$<>]+)\((?P<args>[^)]*)\)" is null"#
    )
    .unwrap();
}

/// Retrace `stack_text` against the ProGuard mapping file at
/// `mapping_path`. Never fails; any problem degrades to returning the
/// input unchanged.
pub fn retrace_file(mapping_path: &Path, stack_text: &str) -> String {
    match Retracer::load(mapping_path) {
        Ok(retracer) => retracer.retrace(stack_text),
        Err(err) => {
            tracing::warn!(
                path = %mapping_path.display(),
                %err,
                "retrace fell back to the obfuscated trace"
            );
            stack_text.to_string()
        }
    }
}

/// Replays one loaded rename table against stack-trace text.
pub struct Retracer {
    table: RenameTable,
}

impl Retracer {
    pub fn new(table: RenameTable) -> Self {
        Self { table }
    }

    /// Read and parse the mapping file. Done once per retrace call;
    /// callers needing throughput cache the `Retracer` themselves.
    pub fn load(mapping_path: &Path) -> crate::Result<Self> {
        Ok(Self::new(RenameTable::load(mapping_path)?))
    }

    pub fn table(&self) -> &RenameTable {
        &self.table
    }

    /// Retrace a whole trace line by line. Unmatched lines pass through
    /// verbatim; a matched frame may expand to several candidate lines.
    pub fn retrace(&self, text: &str) -> String {
        let mut out: Vec<String> = Vec::new();
        for line in text.lines() {
            self.retrace_line(line, &mut out);
        }
        let mut joined = out.join("\n");
        if text.ends_with('\n') {
            joined.push('\n');
        }
        joined
    }

    fn retrace_line(&self, line: &str, out: &mut Vec<String>) {
        if let Some(caps) = AT_FRAME.captures(line) {
            self.expand_frame(&caps, line, out);
            return;
        }
        // the native-frame tail may still carry message clauses, so the
        // rewritten line goes through the message remaps as well
        let line = match NATIVE_FRAME.captures(line) {
            Some(caps) => self.remap_native(&caps),
            None => line.to_string(),
        };
        out.push(self.remap_messages(&line));
    }

    /// One obfuscated frame becomes one or more candidate frames. With
    /// an unknown line number the alternatives are indistinguishable, so
    /// every candidate after the first has the prefix it shares with its
    /// predecessor blanked out; a candidate trimmed to nothing is
    /// dropped.
    fn expand_frame(&self, caps: &Captures<'_>, raw_line: &str, out: &mut Vec<String>) {
        let class = &caps["class"];
        let method = &caps["method"];
        let line_number: u32 = caps
            .name("line")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);

        let Some(candidates) = self.table.frame_candidates(class, method, line_number) else {
            out.push(raw_line.to_string());
            return;
        };

        let mut previous: Option<String> = None;
        for candidate in candidates {
            let formatted = format_frame(caps, &candidate);
            match previous.as_deref() {
                Some(prev) if candidate.line.is_none() => {
                    if let Some(trimmed) = trim_common_prefix(prev, &formatted) {
                        out.push(trimmed);
                    }
                }
                _ => out.push(formatted.clone()),
            }
            previous = Some(formatted);
        }
    }

    fn remap_native(&self, caps: &Captures<'_>) -> String {
        let class = &caps["class"];
        let method = &caps["method"];
        let (original_class, original_method) = match self.table.method(class, method) {
            Some((c, m)) => (c.to_string(), m.to_string()),
            None => (self.table.class_or_self(class).to_string(), method.to_string()),
        };
        format!(
            "{}({}.{}+{}){}",
            &caps["head"], original_class, original_method, &caps["offset"], &caps["tail"]
        )
    }

    fn remap_messages(&self, line: &str) -> String {
        let line = self.remap_cast(line);
        let line = self.remap_npe(&line);
        // two packed clauses per line at most; deliberately applied
        // twice rather than to a fixpoint
        let (line, end) = self.remap_return_value(&line, 0);
        match end {
            Some(end) => self.remap_return_value(&line, end).0,
            None => line,
        }
    }

    fn remap_cast(&self, line: &str) -> String {
        if CAST_CLASS.is_match(line) {
            return CAST_CLASS
                .replace(line, |caps: &Captures<'_>| {
                    format!(
                        "class {} cannot be cast to class {}",
                        self.table.class_or_self(&caps["from"]),
                        self.table.class_or_self(&caps["to"]),
                    )
                })
                .into_owned();
        }
        CAST.replace(line, |caps: &Captures<'_>| {
            format!(
                "{} cannot be cast to {}",
                self.table.class_or_self(&caps["from"]),
                self.table.class_or_self(&caps["to"]),
            )
        })
        .into_owned()
    }

    fn remap_npe(&self, line: &str) -> String {
        if NPE_FIELD.is_match(line) {
            return NPE_FIELD
                .replace(line, |caps: &Captures<'_>| {
                    let class = &caps["class"];
                    let (original_class, original_field) =
                        match self.table.field(class, &caps["field"]) {
                            Some((c, f)) => (c.to_string(), f.to_string()),
                            None => (
                                self.table.class_or_self(class).to_string(),
                                caps["field"].to_string(),
                            ),
                        };
                    format!(
                        "Attempt to {} field '{} {}.{}'",
                        &caps["access"],
                        self.table.class_or_self(&caps["type"]),
                        original_class,
                        original_field,
                    )
                })
                .into_owned();
        }
        NPE_METHOD
            .replace(line, |caps: &Captures<'_>| {
                let class = &caps["class"];
                let (original_class, original_method) = match self.table.method(class, &caps["method"]) {
                    Some((c, m)) => (c.to_string(), m.to_string()),
                    None => (
                        self.table.class_or_self(class).to_string(),
                        caps["method"].to_string(),
                    ),
                };
                format!(
                    "Attempt to invoke {} method '{} {}.{}({})'",
                    &caps["kind"],
                    self.table.class_or_self(&caps["ret"]),
                    original_class,
                    original_method,
                    &caps["args"],
                )
            })
            .into_owned()
    }

    /// Remap one "return value of ... is null" clause at or after byte
    /// offset `from`. Returns the rewritten line and the offset just
    /// past the replacement, for the second application.
    fn remap_return_value(&self, line: &str, from: usize) -> (String, Option<usize>) {
        let Some(caps) = RETURN_VALUE.captures_at(line, from) else {
            return (line.to_string(), None);
        };
        let Some(whole) = caps.get(0) else {
            return (line.to_string(), None);
        };

        let class = &caps["class"];
        let method = &caps["method"];
        let (original_class, original_method) = match self.table.method(class, method) {
            Some((c, m)) => (c.to_string(), m.to_string()),
            None => (self.table.class_or_self(class).to_string(), method.to_string()),
        };
        let replacement = format!(
            "the return value of \"{}.{}({})\" is null",
            original_class, original_method, &caps["args"],
        );

        let end = whole.start() + replacement.len();
        let mut rewritten = String::with_capacity(line.len());
        rewritten.push_str(&line[..whole.start()]);
        rewritten.push_str(&replacement);
        rewritten.push_str(&line[whole.end()..]);
        (rewritten, Some(end))
    }
}

fn format_frame(caps: &Captures<'_>, candidate: &FrameCandidate) -> String {
    let file = &caps["file"];
    let location = match candidate.line {
        Some(line) => format!("{file}:{line}"),
        None => file.to_string(),
    };
    format!(
        "{}{}.{}({}){}",
        &caps["head"], candidate.class, candidate.method, location, &caps["tail"]
    )
}

/// Blank out the prefix `current` shares with `previous`, keeping the
/// trailing run of identifier characters so the first differing token
/// stays whole. `None` when nothing but blanks would remain.
fn trim_common_prefix(previous: &str, current: &str) -> Option<String> {
    let mut common = 0;
    for ((index, a), b) in current.char_indices().zip(previous.chars()) {
        if a != b {
            break;
        }
        common = index + a.len_utf8();
    }
    while common > 0 {
        let Some(last) = current[..common].chars().next_back() else {
            break;
        };
        if is_identifier_char(last) {
            common -= last.len_utf8();
        } else {
            break;
        }
    }
    if common == 0 {
        return Some(current.to_string());
    }
    if current[common..].trim().is_empty() {
        return None;
    }
    Some(format!(
        "{}{}",
        " ".repeat(current[..common].chars().count()),
        &current[common..]
    ))
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
