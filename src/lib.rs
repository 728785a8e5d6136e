//! # Notion MCP Agent
//!
//! An HTTP service that runs natural-language tasks against a Notion
//! workspace through a single LLM agent.
//!
//! This library provides:
//! - An HTTP API for task submission (`POST /run`) and liveness checks
//! - A Model Context Protocol client that talks to the Notion tool server over stdio
//! - An assistant agent and a round-robin session with turn and stop-phrase limits
//! - An optional ngrok tunnel for public access
//!
//! ## Architecture
//!
//! Every request is self-contained:
//! 1. Launch the tool bridge subprocess and list its tools
//! 2. Build the agent with the tools and the system prompt
//! 3. Run the session until the stop phrase appears or turns run out
//! 4. Shut the bridge down and return the transcript
//!
//! ## Example
//!
//! ```rust,ignore
//! use notion_mcp_agent::{config::Config, runner::{NotionTaskRunner, TaskRunner}};
//!
//! let config = std::sync::Arc::new(Config::from_env()?);
//! let runner = NotionTaskRunner::new(config);
//! let result = runner.run_task("Create a new page titled 'Weekly notes'").await?;
//! ```

pub mod agent;
pub mod api;
pub mod bridge;
pub mod config;
pub mod llm;
pub mod runner;
pub mod team;
pub mod tools;
pub mod tunnel;

pub use config::Config;
