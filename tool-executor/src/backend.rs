//! Backend selection from a tool's kind and configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tool_primitives::{PluginKind, ToolConfiguration, ToolKind, settings};

use crate::error::DispatchError;

/// How a tool's capabilities are reached. Each variant owns its teardown:
/// providers are plain futures, processes are killed on drop, HTTP requests
/// are abandoned when their future is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginBackend {
    /// In-process provider built by the factory under `key`.
    InProcess {
        /// Factory key.
        key: String,
    },
    /// Child process speaking one JSON line in, one JSON line out.
    Process(ProcessSpec),
    /// HTTP endpoint receiving the input map as a JSON body.
    Http(HttpSpec),
}

/// Command line and environment of a process-backed tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program to execute.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

/// Target of an HTTP-backed tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSpec {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Optional path template; `{capability}` is substituted.
    pub endpoint: Option<String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
}

impl HttpSpec {
    /// URL for `capability`.
    #[must_use]
    pub fn url_for(&self, capability: &str) -> String {
        let path = self
            .endpoint
            .as_deref()
            .map_or_else(|| capability.to_owned(), |template| template.replace("{capability}", capability));
        if path.starts_with("http://") || path.starts_with("https://") {
            return path;
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn string_list(config: &ToolConfiguration, key: &str) -> Result<Vec<String>, DispatchError> {
    match config.setting(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| DispatchError::Misconfigured(format!("`{key}` must contain only strings")))
            })
            .collect(),
        Some(Value::String(line)) => Ok(line.split_whitespace().map(str::to_owned).collect()),
        Some(_) => Err(DispatchError::Misconfigured(format!("`{key}` must be a list of strings"))),
    }
}

fn string_map(config: &ToolConfiguration, key: &str) -> Result<BTreeMap<String, String>, DispatchError> {
    match config.setting(key) {
        None => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, value)| {
                value
                    .as_str()
                    .map(|value| (name.clone(), value.to_owned()))
                    .ok_or_else(|| DispatchError::Misconfigured(format!("`{key}.{name}` must be a string")))
            })
            .collect(),
        Some(_) => Err(DispatchError::Misconfigured(format!("`{key}` must be a map of strings"))),
    }
}

fn process_spec(config: &ToolConfiguration, command_key: &str) -> Result<ProcessSpec, DispatchError> {
    let mut command = string_list(config, command_key)?.into_iter();
    let program = command
        .next()
        .ok_or_else(|| DispatchError::Misconfigured(format!("`{command_key}` is required")))?;
    let mut args: Vec<String> = command.collect();
    args.extend(string_list(config, settings::ARGS)?);
    Ok(ProcessSpec {
        program,
        args,
        working_dir: config.setting_str(settings::WORKING_DIR).map(PathBuf::from),
        env: config.env().clone(),
    })
}

fn http_spec(config: &ToolConfiguration) -> Result<HttpSpec, DispatchError> {
    let base_url = config
        .setting_str(settings::BASE_URL)
        .map(|url| url.trim().trim_end_matches('/').to_owned())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| DispatchError::Misconfigured(format!("`{}` is required", settings::BASE_URL)))?;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(DispatchError::Misconfigured(
            "base URL must start with http:// or https://".to_owned(),
        ));
    }
    Ok(HttpSpec {
        base_url,
        endpoint: config.setting_str(settings::ENDPOINT).map(str::to_owned),
        headers: string_map(config, settings::HEADERS)?,
    })
}

impl PluginBackend {
    /// Chooses the backend for a tool.
    ///
    /// Internal tools and native modules use the `provider` (or `module`)
    /// setting as factory key, defaulting to the tool name. Remote servers
    /// prefer `server_command` over `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Misconfigured`] when required settings are
    /// missing or malformed.
    pub fn resolve(tool: &str, kind: ToolKind, config: &ToolConfiguration) -> Result<Self, DispatchError> {
        let provider_key = || {
            config
                .setting_str(settings::PROVIDER)
                .or_else(|| config.setting_str(settings::MODULE))
                .unwrap_or(tool)
                .to_owned()
        };
        match kind {
            ToolKind::Internal | ToolKind::Plugin(PluginKind::NativeModule) => {
                Ok(Self::InProcess { key: provider_key() })
            }
            ToolKind::Plugin(PluginKind::Executable) => {
                process_spec(config, settings::COMMAND).map(Self::Process)
            }
            ToolKind::Plugin(PluginKind::HttpApi) => http_spec(config).map(Self::Http),
            ToolKind::RemoteServer => {
                if config.setting(settings::SERVER_COMMAND).is_some() {
                    process_spec(config, settings::SERVER_COMMAND).map(Self::Process)
                } else if config.setting(settings::BASE_URL).is_some() {
                    http_spec(config).map(Self::Http)
                } else {
                    Err(DispatchError::Misconfigured(format!(
                        "remote server needs `{}` or `{}`",
                        settings::SERVER_COMMAND,
                        settings::BASE_URL
                    )))
                }
            }
        }
    }
}

/// Interprets a backend response: a `{success, output, error}` envelope is
/// unwrapped, anything else is the output itself.
pub(crate) fn interpret_response(value: Value) -> Result<Value, DispatchError> {
    let Value::Object(mut map) = value else {
        return Ok(value);
    };
    match map.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(map.remove("output").unwrap_or(Value::Null)),
        Some(false) => {
            let message = match map.remove("error") {
                Some(Value::String(message)) => message,
                Some(Value::Object(error)) => error
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| Value::Object(error.clone()).to_string(), str::to_owned),
                Some(other) => other.to_string(),
                None => "tool reported failure".to_owned(),
            };
            Err(DispatchError::Remote(message))
        }
        None => Ok(Value::Object(map)),
    }
}

/// Parses a textual response, falling back to a JSON string for non-JSON text.
pub(crate) fn parse_response(text: &str) -> Result<Value, DispatchError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DispatchError::Protocol("empty response".to_owned()));
    }
    let value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()));
    interpret_response(value)
}
