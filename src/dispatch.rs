//! Engine selection per application key.
//!
//! Which obfuscator produced an app's builds is configuration owned by
//! the surrounding system; this module only needs the lookups in
//! [`RuleRepository`] and routes each convert call to the matching
//! engine. Missing configuration is the normal "nothing to map" case,
//! never an error.

use std::path::PathBuf;

use crate::retrace;
use crate::substitute::SubstitutionRules;

/// Obfuscation scheme an application was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// ProGuard/R8 mapping-table retrace
    Proguard,
    /// ordered word-list substitution
    Substitution,
}

/// Externally owned per-application configuration lookups.
pub trait RuleRepository {
    fn engine_kind(&self, app_key: &str) -> Option<EngineKind>;
    fn mapping_path(&self, app_key: &str) -> Option<PathBuf>;
    fn substitution_rules(&self, app_key: &str) -> Option<SubstitutionRules>;
}

/// Routes whole-trace deobfuscation to the engine configured for an app.
pub struct Dispatcher<R: RuleRepository> {
    repository: R,
}

impl<R: RuleRepository> Dispatcher<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Deobfuscate `text` for the app identified by `app_key`.
    /// Best-effort: every missing-configuration and failure path returns
    /// the input unchanged.
    pub fn convert(&self, app_key: &str, text: &str) -> String {
        match self.repository.engine_kind(app_key) {
            Some(EngineKind::Proguard) => match self.repository.mapping_path(app_key) {
                Some(path) => retrace::retrace_file(&path, text),
                None => {
                    tracing::debug!(app_key, "no mapping path configured");
                    text.to_string()
                }
            },
            Some(EngineKind::Substitution) => match self.repository.substitution_rules(app_key) {
                Some(rules) if !rules.is_empty() => rules.apply(text),
                _ => text.to_string(),
            },
            None => {
                tracing::debug!(app_key, "no engine configured");
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;
    use std::io::Write;

    #[derive(Default)]
    struct StubRepository {
        kinds: FxHashMap<String, EngineKind>,
        paths: FxHashMap<String, PathBuf>,
        rules: FxHashMap<String, SubstitutionRules>,
    }

    impl RuleRepository for StubRepository {
        fn engine_kind(&self, app_key: &str) -> Option<EngineKind> {
            self.kinds.get(app_key).copied()
        }
        fn mapping_path(&self, app_key: &str) -> Option<PathBuf> {
            self.paths.get(app_key).cloned()
        }
        fn substitution_rules(&self, app_key: &str) -> Option<SubstitutionRules> {
            self.rules.get(app_key).cloned()
        }
    }

    #[test]
    fn test_unconfigured_app_returns_input() {
        let dispatcher = Dispatcher::new(StubRepository::default());
        assert_eq!(dispatcher.convert("app-1", "trace"), "trace");
    }

    #[test]
    fn test_substitution_route() {
        let mut repository = StubRepository::default();
        repository
            .kinds
            .insert("app-1".to_string(), EngineKind::Substitution);
        repository.rules.insert(
            "app-1".to_string(),
            SubstitutionRules::new([("qx".to_string(), "MainView".to_string())]),
        );

        let dispatcher = Dispatcher::new(repository);
        assert_eq!(dispatcher.convert("app-1", "error in qx"), "error in MainView");
    }

    #[test]
    fn test_substitution_with_empty_rules_returns_input() {
        let mut repository = StubRepository::default();
        repository
            .kinds
            .insert("app-1".to_string(), EngineKind::Substitution);
        repository
            .rules
            .insert("app-1".to_string(), SubstitutionRules::default());

        let dispatcher = Dispatcher::new(repository);
        assert_eq!(dispatcher.convert("app-1", "error in qx"), "error in qx");
    }

    #[test]
    fn test_proguard_route() {
        let mut mapping = tempfile::NamedTempFile::new().unwrap();
        writeln!(mapping, "com.example.Main -> a.a:").unwrap();
        writeln!(mapping, "    void start() -> a").unwrap();

        let mut repository = StubRepository::default();
        repository
            .kinds
            .insert("app-1".to_string(), EngineKind::Proguard);
        repository
            .paths
            .insert("app-1".to_string(), mapping.path().to_path_buf());

        let dispatcher = Dispatcher::new(repository);
        assert_eq!(
            dispatcher.convert("app-1", "    at a.a.a(SourceFile:1)"),
            "    at com.example.Main.start(SourceFile:1)"
        );
    }

    #[test]
    fn test_proguard_route_missing_file_returns_input() {
        let mut repository = StubRepository::default();
        repository
            .kinds
            .insert("app-1".to_string(), EngineKind::Proguard);
        repository
            .paths
            .insert("app-1".to_string(), PathBuf::from("/nonexistent/mapping.txt"));

        let dispatcher = Dispatcher::new(repository);
        assert_eq!(
            dispatcher.convert("app-1", "    at a.a.a(SourceFile:1)"),
            "    at a.a.a(SourceFile:1)"
        );
    }

    #[test]
    fn test_proguard_route_without_path_returns_input() {
        let mut repository = StubRepository::default();
        repository
            .kinds
            .insert("app-1".to_string(), EngineKind::Proguard);

        let dispatcher = Dispatcher::new(repository);
        assert_eq!(dispatcher.convert("app-1", "trace"), "trace");
    }
}
