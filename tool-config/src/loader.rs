use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::RuntimeConfig;

/// File read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "tool-runtime.toml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "TOOL_RUNTIME_CONFIG";

impl RuntimeConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for semantic violations.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|source| ConfigError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or the defaults when the file does not exist.
    ///
    /// Without a path, `TOOL_RUNTIME_CONFIG` and then
    /// [`DEFAULT_CONFIG_PATH`] are tried.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`], [`ConfigError::Parse`] or
    /// [`ConfigError::Invalid`].
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV);
        let path = path
            .or_else(|| env_path.as_deref().map(Path::new))
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        match Self::load_required(path) {
            Err(ConfigError::NotFound { path }) => {
                info!(path = %path.display(), "no runtime configuration file; using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Loads `path`, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] in addition to the errors of
    /// [`Self::load`].
    pub fn load_required(path: &Path) -> ConfigResult<Self> {
        debug!(path = %path.display(), "reading runtime configuration");
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;
    use tool_primitives::{PluginKind, ToolKind};

    use super::*;
    use crate::schema::{LogFormat, RoutingStrategy};

    const FULL: &str = r#"
[logging]
level = "tool_router=debug,info"
format = "compact"

[breaker]
failure_threshold = 3
cooldown_secs = 10
max_cooldown_secs = 60

[execution]
default_timeout_secs = 5
journal_path = "/var/lib/tools/executions.ndjson"

[loader]
plugins_dir = "/srv/plugins"

[routing]
strategy = "delegated"

[[tools]]
name = "weather"
version = "1.0.0"
kind = "internal"
description = "Weather lookups"

[[tools.capabilities]]
name = "get_current"
description = "Current conditions"
input_schema = [{ name = "location", type = "string", required = true }]

[tools.config.settings]
provider = "weather"

[tools.config.limits]
max_execution_secs = 2
max_concurrency = 4

[[tools]]
name = "converter"
version = "0.2.0"
kind = { plugin = "executable" }

[tools.config]
allowed_users = ["ada"]

[tools.config.settings]
command = ["python3", "convert.py"]
"#;

    #[test]
    fn parses_every_section() {
        let config = RuntimeConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.cooldown().as_secs(), 10);
        assert_eq!(config.execution.default_timeout().as_secs(), 5);
        assert_eq!(config.execution.max_output_bytes, 1024 * 1024);
        assert_eq!(config.loader.blob_dir(), PathBuf::from("/srv/plugins/.archives"));
        assert_eq!(config.routing.strategy, RoutingStrategy::Delegated);

        let weather = &config.tools[0];
        assert_eq!(weather.metadata.name(), "weather");
        assert_eq!(weather.metadata.capabilities()[0].input_schema()[0].name(), "location");
        assert_eq!(weather.config.setting_str("provider"), Some("weather"));
        assert_eq!(weather.config.limits().max_execution_secs, Some(2));

        let converter = &config.tools[1];
        assert_eq!(converter.metadata.kind(), ToolKind::Plugin(PluginKind::Executable));
        assert_eq!(converter.config.setting("command"), Some(&json!(["python3", "convert.py"])));
        assert!(converter.config.permits_user(Some("ada")));
        assert!(!converter.config.permits_user(None));
    }

    #[test]
    fn empty_text_is_default() {
        assert_eq!(RuntimeConfig::from_toml_str("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert_eq!(RuntimeConfig::load(Some(&path)).unwrap(), RuntimeConfig::default());
        assert!(matches!(
            RuntimeConfig::load_required(&path),
            Err(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn malformed_files_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[breaker\nfailure_threshold = 3").unwrap();
        assert!(matches!(
            RuntimeConfig::load(Some(&path)),
            Err(ConfigError::Parse { path: Some(_), .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_toml_str("[routing]\nstrategy = \"telepathy\""),
            Err(ConfigError::Parse { path: None, .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_toml_str("[breaker]\nthreshold = 2"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn semantic_violations_are_invalid() {
        for text in [
            "[breaker]\nfailure_threshold = 0",
            "[breaker]\ncooldown_secs = 600",
            "[execution]\ndefault_timeout_secs = 0",
            "[[tools]]\nname = \"a__b\"\nversion = \"1.0.0\"\nkind = \"internal\"",
            "[[tools]]\nname = \"a\"\nversion = \"1.0.0\"\nkind = \"internal\"\n\
             [[tools]]\nname = \"a\"\nversion = \"1.0.0\"\nkind = \"internal\"",
        ] {
            assert!(
                matches!(RuntimeConfig::from_toml_str(text), Err(ConfigError::Invalid(_))),
                "{text}"
            );
        }
    }
}
