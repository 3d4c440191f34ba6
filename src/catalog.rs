/*
 * Enclave - Sandboxed Tool-Calling Agent
 * File Path: src/catalog.rs
 * Responsibility: Immutable tool registry and the declarations sent to the model.
 */

use crate::config::RuntimeConfig;
use crate::tools::{ListDirectory, ReadFile, RunScript, Tool, WriteFile};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    StringArray,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: true, description }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self { name, kind, required: false, description }
    }

    fn schema(&self) -> Value {
        match self.kind {
            ParamKind::String => json!({ "type": "string", "description": self.description }),
            ParamKind::StringArray => json!({
                "type": "array",
                "description": self.description,
                "items": { "type": "string" }
            }),
        }
    }
}

/// Name, description and ordered parameter schema of one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    /// The function declaration in the shape Gemini expects.
    ///
    /// The working root is never part of the schema; the dispatcher supplies it.
    pub fn declaration(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(param.name.to_string(), param.schema());
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();

        let mut parameters = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            parameters["required"] = json!(required);
        }

        json!({
            "name": self.name,
            "description": self.description,
            "parameters": parameters
        })
    }
}

#[derive(Debug, Error)]
#[error("tool `{0}` is already registered")]
pub struct DuplicateTool(pub String);

/// Read-only set of tools, built once at startup and handed to the dispatcher.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in tools, configured from the runtime section.
    pub fn builtin(runtime: &RuntimeConfig) -> Self {
        Self {
            tools: vec![
                Arc::new(ListDirectory),
                Arc::new(ReadFile::new(runtime.character_limit)),
                Arc::new(WriteFile),
                Arc::new(RunScript::new(
                    runtime.interpreter.clone(),
                    runtime.script_extension.clone(),
                    runtime.script_timeout(),
                )),
            ],
        }
    }

    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Result<Self, DuplicateTool> {
        if self.get(tool.name()).is_some() {
            return Err(DuplicateTool(tool.name().to_string()));
        }
        self.tools.push(Arc::new(tool));
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog").field("tools", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::WorkingRoot;
    use crate::tools::ToolError;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo",
                description: "Echo the text back.",
                params: vec![ParamSpec::required("text", ParamKind::String, "Text to echo")],
            }
        }

        async fn call(&self, _root: &WorkingRoot, args: &Value) -> Result<String, ToolError> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    #[test]
    fn test_builtin_catalog_has_unique_names() {
        let catalog = ToolCatalog::builtin(&RuntimeConfig::default());
        let mut names = catalog.names();
        assert_eq!(
            names,
            vec!["get_files_info", "get_file_content", "write_file", "run_python_file"]
        );
        names.dedup();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn test_with_tool_rejects_duplicates() {
        let catalog = ToolCatalog::new().with_tool(Echo).unwrap();
        let err = catalog.clone().with_tool(Echo).unwrap_err();
        assert_eq!(err.to_string(), "tool `echo` is already registered");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_declaration_lists_required_params_only_when_present() {
        let catalog = ToolCatalog::builtin(&RuntimeConfig::default());

        let list = catalog.get("get_files_info").unwrap().spec().declaration();
        assert_eq!(list["parameters"]["type"], "object");
        assert!(list["parameters"].get("required").is_none());
        assert_eq!(list["parameters"]["properties"]["directory"]["type"], "string");

        let run = catalog.get("run_python_file").unwrap().spec().declaration();
        assert_eq!(run["parameters"]["required"], json!(["file_path"]));
        assert_eq!(run["parameters"]["properties"]["args"]["type"], "array");
        assert_eq!(run["parameters"]["properties"]["args"]["items"]["type"], "string");
    }

    #[test]
    fn test_declarations_never_expose_the_working_root() {
        let catalog = ToolCatalog::builtin(&RuntimeConfig::default());
        for spec in catalog.specs() {
            let declaration = spec.declaration();
            let properties = declaration["parameters"]["properties"].as_object().unwrap();
            assert!(!properties.contains_key("working_directory"));
        }
    }
}
