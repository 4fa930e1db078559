use crate::reasoning::DEFAULT_REASONING_CAPACITY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE: &str = "answer-stream.json";
const APP_DIR: &str = "answer-stream";

pub const DEFAULT_FALLBACK_ERROR_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Where and how to reach the chat backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub base_url: String,
    /// Endpoint answering with a `data:` framed stream
    pub stream_path: String,
    /// Endpoint answering with one complete body
    pub complete_path: String,
    pub connect_timeout_secs: u64,
    /// Deadline for the non-streaming request. The stream has no total deadline.
    pub request_timeout_secs: u64,
    /// Sent as a bearer token when present
    pub auth_token: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            stream_path: "/chat/message/stream".to_string(),
            complete_path: "/chat/message".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            auth_token: None,
        }
    }
}

/// Per-turn processing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Number of reasoning lines kept for display
    pub reasoning_capacity: usize,
    /// Answer shown when both transports failed
    pub fallback_error_message: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            reasoning_capacity: DEFAULT_REASONING_CAPACITY,
            fallback_error_message: DEFAULT_FALLBACK_ERROR_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub turn: TurnConfig,
}

impl ClientConfig {
    /// Load from the first config directory holding a config file, or defaults
    pub fn load() -> Result<Self> {
        for dir in Self::config_directories() {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }

        debug!("No {} found, using default configuration", CONFIG_FILE);
        Ok(Self::default())
    }

    /// Load from a specific file, which must exist
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        let value = Self::substitute_env_vars_in_value(value)
            .with_context(|| format!("Failed to substitute env vars in: {}", path.display()))?;

        let mut config: ClientConfig = serde_json::from_value(value)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.turn.reasoning_capacity = config.turn.reasoning_capacity.max(1);

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Recursively substitute environment variables in JSON values
    fn substitute_env_vars_in_value(value: serde_json::Value) -> Result<serde_json::Value> {
        match value {
            serde_json::Value::String(s) => Ok(serde_json::Value::String(
                Self::substitute_env_vars_in_string(&s)?,
            )),
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, val)| Ok((key, Self::substitute_env_vars_in_value(val)?)))
                .collect::<Result<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            serde_json::Value::Array(arr) => arr
                .into_iter()
                .map(Self::substitute_env_vars_in_value)
                .collect::<Result<Vec<_>>>()
                .map(serde_json::Value::Array),
            other => Ok(other),
        }
    }

    /// Replace every `${VAR}` with its value. Values are not expanded again.
    fn substitute_env_vars_in_string(input: &str) -> Result<String> {
        let mut output = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                anyhow::anyhow!("Unclosed environment variable substitution: {input}")
            })?;

            let var_name = &after[..end];
            let var_value = std::env::var(var_name)
                .with_context(|| format!("Environment variable not set: {var_name}"))?;
            output.push_str(&var_value);
            rest = &after[end + 1..];
        }

        output.push_str(rest);
        Ok(output)
    }

    /// Directories that may contain the config file, ordered by priority
    fn config_directories() -> Vec<PathBuf> {
        let mut dirs = Vec::new();

        if let Ok(custom_dir) = std::env::var("ANSWER_STREAM_CONFIG_DIR") {
            Self::push_unique_dir(&mut dirs, PathBuf::from(custom_dir));
        }
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            Self::push_unique_dir(&mut dirs, PathBuf::from(xdg_config).join(APP_DIR));
        }
        if let Some(home_dir) = dirs::home_dir() {
            Self::push_unique_dir(&mut dirs, home_dir.join(".config").join(APP_DIR));
        }
        if let Some(system_config) = dirs::config_dir() {
            Self::push_unique_dir(&mut dirs, system_config.join(APP_DIR));
        }

        dirs
    }

    fn push_unique_dir(dirs: &mut Vec<PathBuf>, candidate: PathBuf) {
        if !dirs.iter().any(|existing| existing == &candidate) {
            dirs.push(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("ANSWER_STREAM_TEST_TOKEN", "secret");

        let result =
            ClientConfig::substitute_env_vars_in_string("Bearer ${ANSWER_STREAM_TEST_TOKEN}!")
                .unwrap();
        assert_eq!(result, "Bearer secret!");

        env::set_var("ANSWER_STREAM_TEST_NESTED", "${ANSWER_STREAM_TEST_TOKEN}");
        let result =
            ClientConfig::substitute_env_vars_in_string("${ANSWER_STREAM_TEST_NESTED}").unwrap();
        assert_eq!(result, "${ANSWER_STREAM_TEST_TOKEN}");

        env::remove_var("ANSWER_STREAM_TEST_TOKEN");
        env::remove_var("ANSWER_STREAM_TEST_NESTED");
    }

    #[test]
    fn test_env_var_substitution_errors() {
        let missing = ClientConfig::substitute_env_vars_in_string("${ANSWER_STREAM_NOT_SET_XYZ}");
        assert!(missing
            .unwrap_err()
            .to_string()
            .contains("ANSWER_STREAM_NOT_SET_XYZ"));

        let unclosed = ClientConfig::substitute_env_vars_in_string("prefix_${UNCLOSED");
        assert!(unclosed.unwrap_err().to_string().contains("Unclosed"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        env::set_var("ANSWER_STREAM_TEST_BASE_URL", "https://chat.example.com");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "transport": {{ "base_url": "${{ANSWER_STREAM_TEST_BASE_URL}}" }},
                "turn": {{ "reasoning_capacity": 0 }}
            }}"#
        )
        .unwrap();

        let config = ClientConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.transport.base_url, "https://chat.example.com");
        assert_eq!(config.transport.stream_path, "/chat/message/stream");
        assert_eq!(config.transport.request_timeout_secs, 120);
        assert_eq!(config.turn.reasoning_capacity, 1);
        assert_eq!(
            config.turn.fallback_error_message,
            DEFAULT_FALLBACK_ERROR_MESSAGE
        );

        env::remove_var("ANSWER_STREAM_TEST_BASE_URL");
    }

    #[test]
    fn test_missing_or_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ClientConfig::load_from_path(&dir.path().join("nope.json"));
        assert!(missing.unwrap_err().to_string().contains("Failed to read"));

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, "{ not json").unwrap();
        let err = ClientConfig::load_from_path(&invalid).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.turn.reasoning_capacity, DEFAULT_REASONING_CAPACITY);
        assert_eq!(config.transport.auth_token, None);
    }
}
