//! Configuration management for the Notion MCP agent.
//!
//! Configuration is read once at process start (after `.env` is loaded) and
//! shared immutably with every request handler:
//! - `OPENAI_API_KEY` - Required. API key for the completion service.
//! - `OPENAI_API_BASE` - Optional. Defaults to `https://api.openai.com/v1`.
//! - `DEFAULT_MODEL` - Optional. Model identifier. Defaults to `gpt-4o`.
//! - `NOTION_INTEGRATION_SECRET` - Required. Handed to the MCP bridge as `NOTION_API_KEY`.
//! - `MCP_COMMAND` - Optional. Bridge command. Defaults to `npx`.
//! - `MCP_ARGS` - Optional. Whitespace-separated bridge arguments.
//! - `MCP_READ_TIMEOUT_SECS` - Optional. Bridge read timeout. Defaults to `20`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `7001`.
//! - `MAX_TURNS` - Optional. Round-robin turn ceiling. Defaults to `5`.
//! - `STOP_PHRASE` - Optional. Termination text. Defaults to `TERMINATE`.
//! - `REFLECT_ON_TOOL_USE` - Optional. Defaults to `true`.
//! - `MAX_CONCURRENT_SESSIONS` - Optional. Defaults to `4`.
//! - `NGROK_AUTH_TOKEN` - Optional. Enables the public tunnel when set.
//! - `TUNNEL_ENABLED` - Optional. Explicit tunnel toggle.
//! - `NGROK_BIN` - Optional. Defaults to `ngrok`.
//! - `NGROK_API_URL` - Optional. Defaults to `http://127.0.0.1:4040`.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MCP_ARGS: &str = "-y mcp-remote https://mcp.notion.com/mcp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// How to launch the MCP tool bridge subprocess.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Executable to spawn
    pub command: String,

    /// Arguments passed to the executable
    pub args: Vec<String>,

    /// Extra environment variables (the integration secret lives here)
    pub env: HashMap<String, String>,

    /// Upper bound on every wait for a bridge response
    pub read_timeout: Duration,
}

impl BridgeConfig {
    /// Bridge settings for the hosted Notion MCP server via `mcp-remote`.
    pub fn notion(secret: impl Into<String>) -> Self {
        let mut env = HashMap::new();
        env.insert("NOTION_API_KEY".to_string(), secret.into());
        Self {
            command: "npx".to_string(),
            args: split_args(DEFAULT_MCP_ARGS),
            env,
            read_timeout: Duration::from_secs(20),
        }
    }
}

/// Public tunnel configuration.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Whether to open a tunnel at startup
    pub enabled: bool,

    /// ngrok auth token
    pub auth_token: Option<String>,

    /// ngrok binary
    pub binary: String,

    /// Local ngrok agent API used to discover the public URL
    pub api_url: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auth_token: None,
            binary: "ngrok".to_string(),
            api_url: "http://127.0.0.1:4040".to_string(),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Completion service API key
    pub api_key: String,

    /// Completion service base URL
    pub api_base: String,

    /// Model identifier
    pub default_model: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum number of agent turns per session
    pub max_turns: usize,

    /// Text that ends a session when an agent says it
    pub stop_phrase: String,

    /// Whether the agent makes a follow-up model call over tool results
    pub reflect_on_tool_use: bool,

    /// Number of sessions allowed to run at once
    pub max_concurrent_sessions: usize,

    /// Tool bridge launch settings
    pub bridge: BridgeConfig,

    /// Public tunnel settings
    pub tunnel: TunnelConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENAI_API_KEY` or
    /// `NOTION_INTEGRATION_SECRET` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let api_key = required("OPENAI_API_KEY")?;
        let notion_secret = required("NOTION_INTEGRATION_SECRET")?;

        let api_base = get("OPENAI_API_BASE")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();

        let default_model = get("DEFAULT_MODEL").unwrap_or_else(|| "gpt-4o".to_string());

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = parse_or("PORT", get("PORT"), 7001)?;

        let max_turns: usize = parse_or("MAX_TURNS", get("MAX_TURNS"), 5)?;
        if max_turns == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_TURNS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let stop_phrase = get("STOP_PHRASE").unwrap_or_else(|| "TERMINATE".to_string());

        let reflect_on_tool_use = get("REFLECT_ON_TOOL_USE")
            .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue("REFLECT_ON_TOOL_USE".to_string(), e)))
            .transpose()?
            .unwrap_or(true);

        let max_concurrent_sessions: usize =
            parse_or("MAX_CONCURRENT_SESSIONS", get("MAX_CONCURRENT_SESSIONS"), 4)?;
        if max_concurrent_sessions == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONCURRENT_SESSIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let mut bridge = BridgeConfig::notion(notion_secret);
        if let Some(command) = get("MCP_COMMAND") {
            bridge.command = command;
        }
        if let Some(args) = get("MCP_ARGS") {
            bridge.args = split_args(&args);
        }
        let read_timeout_secs: u64 = parse_or("MCP_READ_TIMEOUT_SECS", get("MCP_READ_TIMEOUT_SECS"), 20)?;
        bridge.read_timeout = Duration::from_secs(read_timeout_secs);

        let auth_token = get("NGROK_AUTH_TOKEN");
        let enabled = get("TUNNEL_ENABLED")
            .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue("TUNNEL_ENABLED".to_string(), e)))
            .transpose()?
            .unwrap_or(auth_token.is_some());
        let defaults = TunnelConfig::default();
        let tunnel = TunnelConfig {
            enabled,
            auth_token,
            binary: get("NGROK_BIN").unwrap_or(defaults.binary),
            api_url: get("NGROK_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
        };

        Ok(Self {
            api_key,
            api_base,
            default_model,
            host,
            port,
            max_turns,
            stop_phrase,
            reflect_on_tool_use,
            max_concurrent_sessions,
            bridge,
            tunnel,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, default_model: String, bridge: BridgeConfig) -> Self {
        Self {
            api_key,
            api_base: "https://api.openai.com/v1".to_string(),
            default_model,
            host: "127.0.0.1".to_string(),
            port: 7001,
            max_turns: 5,
            stop_phrase: "TERMINATE".to_string(),
            reflect_on_tool_use: true,
            max_concurrent_sessions: 4,
            bridge,
            tunnel: TunnelConfig::default(),
        }
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), format!("{}", e))),
        None => Ok(default),
    }
}

fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(str::to_string).collect()
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
