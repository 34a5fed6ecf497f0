//! Ordered literal-substitution deobfuscation.
//!
//! The simpler of the two obfuscation schemes: a flat rename word list
//! replayed by cumulative literal replacement. Rules are ordered longest
//! obfuscated token first at construction time; a short token must
//! never fire inside a longer token that also needed substitution.

/// One rename pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionRule {
    pub obfuscated: String,
    pub original: String,
}

/// A rule list in application order.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionRules {
    rules: Vec<SubstitutionRule>,
}

impl SubstitutionRules {
    /// Build a rule set, establishing the longest-token-first order the
    /// apply path relies on. Ties keep their load order.
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut rules: Vec<SubstitutionRule> = pairs
            .into_iter()
            .map(|(obfuscated, original)| SubstitutionRule { obfuscated, original })
            .collect();
        rules.sort_by(|a, b| b.obfuscated.len().cmp(&a.obfuscated.len()));
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[SubstitutionRule] {
        &self.rules
    }

    /// Cumulative literal replacement in rule order. Never fails; an
    /// empty rule set returns the input unchanged.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            if rule.obfuscated.is_empty() {
                continue;
            }
            out = out.replace(&rule.obfuscated, &rule.original);
        }
        out
    }
}
