//! Configuration types for the profiling agent
//!
//! Settings come from an optional file (TOML, JSON or YAML, picked by
//! extension) overlaid by `CALLSPAN_*` environment variables. Nested keys
//! use a double underscore: `CALLSPAN_FILTER__MODE=whitelist`.

use crate::classifier::DEFAULT_DISPATCHERS;
use crate::collector::FilterMode;
use crate::engine::SessionOptions;
use crate::error::AgentError;
use crate::spans::ExtractorRule;
use callspan_shared::Flags;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CALLSPAN";

/// Symbol filter settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: FilterMode,

    /// Symbols dropped (blacklist) or kept (whitelist)
    pub functions: Vec<String>,
}

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Flag names, e.g. `gather_cpu_time`
    pub flags: Vec<String>,

    pub filter: FilterConfig,

    /// Symbol whose first string argument names the transaction
    pub transaction_function: Option<String>,

    /// Symbol whose arguments are scanned for an exception
    pub exception_function: Option<String>,

    /// Transaction markers named `ReceiverClass::argument`
    pub dispatcher_functions: Vec<String>,

    /// Attribute top-level calls to a synthetic `main()` frame
    pub synthetic_root: bool,

    pub extractors: Vec<ExtractorRule>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            flags: Vec::new(),
            filter: FilterConfig::default(),
            transaction_function: None,
            exception_function: None,
            dispatcher_functions: DEFAULT_DISPATCHERS.iter().map(|s| s.to_string()).collect(),
            synthetic_root: false,
            extractors: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load from `path` (if any) and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, env: config::Environment) -> Result<Self, AgentError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(env);

        let config: AgentConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed flag bitmask
    pub fn flags(&self) -> Result<Flags, AgentError> {
        Ok(Flags::from_names(&self.flags)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), AgentError> {
        self.flags()?;

        if self.filter.mode == FilterMode::Whitelist
            && self.filter.functions.iter().all(|f| f.is_empty())
        {
            return Err(AgentError::Invalid(
                "whitelist filter needs at least one function".to_string(),
            ));
        }

        for rule in &self.extractors {
            rule.validate()?;
        }

        Ok(())
    }

    /// Engine options for a session
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            filter_mode: self.filter.mode,
            filter_functions: self.filter.functions.clone(),
            transaction_function: self.transaction_function.clone(),
            exception_function: self.exception_function.clone(),
            dispatcher_functions: self.dispatcher_functions.clone(),
            synthetic_root: self.synthetic_root,
            extractors: self.extractors.clone(),
        }
    }
}

/// `CALLSPAN_` variables; nested keys joined with `__`
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("flags")
        .with_list_parse_key("filter.functions")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spans::RuleKind;
    use std::io::Write;

    fn write_config(ext: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(ext)
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flags().unwrap(), Flags::empty());
        assert_eq!(config.dispatcher_functions.len(), 4);
        assert_eq!(config.session_options(), SessionOptions::default());
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            ".toml",
            r#"
flags = ["gather_cpu_time", "no-compile-tracking"]
transaction_function = "Router::route"
synthetic_root = true

[filter]
mode = "blacklist"
functions = ["strlen"]

[[extractors]]
kind = "argument"
symbols = ["PDO::query", "mysqli_query"]
key = "sql"
"#,
        );

        let config = AgentConfig::load(Some(file.path())).unwrap();
        assert_eq!(
            config.flags().unwrap(),
            Flags::GATHER_CPU_TIME | Flags::NO_COMPILE_TRACKING
        );
        assert_eq!(config.filter.mode, FilterMode::Blacklist);
        assert_eq!(config.extractors[0].kind, RuleKind::Argument);
        assert_eq!(config.extractors[0].symbols.len(), 2);

        let options = config.session_options();
        assert!(options.synthetic_root);
        assert_eq!(options.transaction_function.as_deref(), Some("Router::route"));
        // Dispatchers keep their default when not configured
        assert_eq!(options.dispatcher_functions.len(), 4);
    }

    #[test]
    fn test_load_json() {
        let file = write_config(
            ".json",
            r#"{"filter": {"mode": "whitelist", "functions": ["App::run"]}}"#,
        );
        let config = AgentConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.filter.functions, vec!["App::run".to_string()]);
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        environment().source(Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let config = AgentConfig::load_with(
            None,
            env(&[
                ("CALLSPAN_SYNTHETIC_ROOT", "true"),
                ("CALLSPAN_FILTER__MODE", "blacklist"),
                ("CALLSPAN_FILTER__FUNCTIONS", "strlen,count"),
                ("CALLSPAN_FLAGS", "gather_cpu_time,no_spans"),
                ("OTHER_SYNTHETIC_ROOT", "false"),
            ]),
        )
        .unwrap();

        assert!(config.synthetic_root);
        assert_eq!(config.filter.mode, FilterMode::Blacklist);
        assert_eq!(config.filter.functions, vec!["strlen", "count"]);
        assert_eq!(
            config.flags().unwrap(),
            Flags::GATHER_CPU_TIME | Flags::NO_SPANS
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config(
            ".toml",
            r#"
transaction_function = "Router::route"

[filter]
mode = "whitelist"
functions = ["App::run"]
"#,
        );
        let config = AgentConfig::load_with(
            Some(file.path()),
            env(&[
                ("CALLSPAN_TRANSACTION_FUNCTION", "Kernel::handle"),
                ("CALLSPAN_FILTER__MODE", "disabled"),
            ]),
        )
        .unwrap();

        assert_eq!(config.transaction_function.as_deref(), Some("Kernel::handle"));
        assert_eq!(config.filter.mode, FilterMode::Disabled);
        assert_eq!(config.filter.functions, vec!["App::run"]);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let config = AgentConfig {
            flags: vec!["gather_everything".to_string()],
            ..AgentConfig::default()
        };
        assert!(matches!(config.validate(), Err(AgentError::Flag(_))));
    }

    #[test]
    fn test_empty_whitelist_rejected() {
        let config = AgentConfig {
            filter: FilterConfig {
                mode: FilterMode::Whitelist,
                functions: Vec::new(),
            },
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_rule_rejected_on_load() {
        let file = write_config(
            ".toml",
            r#"
[[extractors]]
kind = "fixed"
symbols = ["mysqli_commit"]
"#,
        );
        assert!(AgentConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AgentConfig::load(Some(Path::new("/nonexistent/callspan.toml")));
        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
