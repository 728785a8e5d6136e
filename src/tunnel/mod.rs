//! Public tunnel via the ngrok agent.
//!
//! The agent is started as a child process and its local inspection API is
//! polled until the tunnel for our port shows up.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

use crate::config::TunnelConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("NGROK_AUTH_TOKEN is not set")]
    MissingToken,

    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ngrok exited before the tunnel came up ({0})")]
    Exited(std::process::ExitStatus),

    #[error("No tunnel for port {port} after {timeout:?}")]
    Timeout { port: u16, timeout: Duration },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A running tunnel. Dropping it stops the ngrok agent.
pub struct Tunnel {
    _child: Child,
    public_url: String,
}

impl Tunnel {
    /// Start ngrok for `port` and wait for its public URL.
    pub async fn start(config: &TunnelConfig, port: u16) -> Result<Self, TunnelError> {
        let token = config.auth_token.as_deref().ok_or(TunnelError::MissingToken)?;

        tracing::info!(binary = %config.binary, port, "Starting ngrok tunnel");
        let mut child = ngrok_command(&config.binary, token, port)
            .spawn()
            .map_err(|source| TunnelError::Spawn {
                binary: config.binary.clone(),
                source,
            })?;
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_log(stdout));
        }

        let client = reqwest::Client::new();
        let endpoint = format!("{}/api/tunnels", config.api_url.trim_end_matches('/'));
        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;

        loop {
            if let Some(status) = child.try_wait()? {
                return Err(TunnelError::Exited(status));
            }

            match client.get(&endpoint).send().await {
                Ok(response) => match response.json::<Value>().await {
                    Ok(body) => {
                        if let Some(url) = select_public_url(&body, port) {
                            tracing::info!("Public URL: {}", url);
                            return Ok(Self {
                                _child: child,
                                public_url: url,
                            });
                        }
                    }
                    Err(e) => tracing::debug!("Unreadable ngrok API response: {}", e),
                },
                Err(e) => tracing::debug!("ngrok API not ready: {}", e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(TunnelError::Timeout {
                    port,
                    timeout: STARTUP_TIMEOUT,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }
}

/// The auth token goes in the environment, never in argv.
fn ngrok_command(binary: &str, token: &str, port: u16) -> Command {
    let mut command = Command::new(binary);
    command
        .arg("http")
        .arg(port.to_string())
        .arg("--log")
        .arg("stdout")
        .env("NGROK_AUTHTOKEN", token)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    command
}

async fn forward_log(stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "notion_mcp_agent::tunnel::ngrok", "{}", line);
    }
}

/// Pick the public URL forwarding to `port` from an `/api/tunnels` listing.
/// HTTPS wins over HTTP when both exist.
pub fn select_public_url(listing: &Value, port: u16) -> Option<String> {
    let suffix = format!(":{}", port);
    let urls: Vec<&str> = listing
        .get("tunnels")?
        .as_array()?
        .iter()
        .filter(|t| {
            t["config"]["addr"]
                .as_str()
                .is_some_and(|addr| addr.ends_with(&suffix))
        })
        .filter_map(|t| t["public_url"].as_str())
        .collect();

    urls.iter()
        .find(|u| u.starts_with("https://"))
        .or_else(|| urls.first())
        .map(|u| u.to_string())
}
