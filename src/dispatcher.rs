/*
 * Enclave - Sandboxed Tool-Calling Agent
 * File Path: src/dispatcher.rs
 * Responsibility: Route model tool calls to catalog entries inside the working root.
 */

use crate::catalog::ToolCatalog;
use crate::conversation::Part;
use crate::llm::ToolCallRequest;
use crate::sandbox::WorkingRoot;
use crate::tools::{ToolError, ToolErrorKind};
use serde_json::json;
use tracing::debug;

/// Outcome of one dispatched call, still typed.
#[derive(Debug)]
pub struct ToolResponse {
    pub id: Option<String>,
    pub name: String,
    pub outcome: Result<String, ToolError>,
}

impl ToolResponse {
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        self.outcome.as_ref().err().map(ToolError::kind)
    }

    /// What the model reads for this call.
    pub fn text(&self) -> String {
        match &self.outcome {
            Ok(output) => output.clone(),
            Err(err) => err.to_string(),
        }
    }

    /// Unknown tools come back under `error`; everything a tool produced,
    /// including its own error text, comes back under `result`.
    pub fn into_part(self) -> Part {
        let response = match &self.outcome {
            Err(err @ ToolError::UnknownTool(_)) => json!({ "error": err.to_string() }),
            _ => json!({ "result": self.text() }),
        };
        Part::FunctionResponse {
            id: self.id,
            name: self.name,
            response,
        }
    }
}

pub struct Dispatcher {
    catalog: ToolCatalog,
    root: WorkingRoot,
}

impl Dispatcher {
    pub fn new(catalog: ToolCatalog, root: WorkingRoot) -> Self {
        Self { catalog, root }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn root(&self) -> &WorkingRoot {
        &self.root
    }

    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolResponse {
        println!("🛠️ Calling function: {}", call.name);
        debug!(tool = %call.name, args = %call.args, "tool arguments");

        let outcome = match self.catalog.get(&call.name) {
            Some(tool) => tool.call(&self.root, &call.args).await,
            None => Err(ToolError::UnknownTool(call.name.clone())),
        };

        match &outcome {
            Ok(output) => debug!(tool = %call.name, chars = output.chars().count(), "tool succeeded"),
            Err(err) => debug!(tool = %call.name, kind = ?err.kind(), error = %err, "tool failed"),
        }

        ToolResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            outcome,
        }
    }

    /// Run calls one after another; responses keep the request order.
    pub async fn dispatch_all(&self, calls: &[ToolCallRequest]) -> Vec<ToolResponse> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            responses.push(self.dispatch(call).await);
        }
        responses
    }
}
