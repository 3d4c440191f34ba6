/*
 * Enclave - Sandboxed Tool-Calling Agent
 * File Path: src/lib.rs
 * Responsibility: Shared library modules
 */

pub mod agent_loop;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod llm;
pub mod logging;
pub mod sandbox;
pub mod tools;

pub use agent_loop::{AgentError, AgentLoop, AgentOutcome};
pub use catalog::ToolCatalog;
pub use config::Config;
pub use dispatcher::Dispatcher;
pub use sandbox::WorkingRoot;
