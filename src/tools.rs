/*
 * Enclave - Sandboxed Tool-Calling Agent
 * File Path: src/tools.rs
 * Responsibility: Built-in tool bodies, argument parsing, and typed tool errors.
 */

use crate::catalog::{ParamKind, ParamSpec, ToolSpec};
use crate::sandbox::WorkingRoot;
use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// A failed tool call.
///
/// `Display` yields the exact text the model sees, so every variant except
/// `UnknownTool` starts with `Error:`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Error: Cannot {action} \"{path}\" as it is outside the permitted working directory")]
    OutsideRoot { action: &'static str, path: String },

    #[error("Error: \"{0}\" is not a directory")]
    NotADirectory(String),

    #[error("Error: File not found or is not a regular file: \"{0}\"")]
    NotAFile(String),

    #[error("Error: File \"{0}\" not found")]
    NotFound(String),

    #[error("Error: \"{path}\" is not a {kind} file.")]
    WrongScriptType { path: String, kind: String },

    #[error("Error: Missing required argument \"{0}\"")]
    MissingArgument(&'static str),

    #[error("Error: Invalid argument \"{name}\": {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Error: {0}")]
    Io(#[from] io::Error),

    #[error("Error: executing {kind} file: {source}")]
    Spawn { kind: String, source: io::Error },

    #[error("Error: \"{path}\" timed out after {timeout:?} and was killed")]
    Timeout { path: String, timeout: Duration },

    #[error("Unknown function: {0}")]
    UnknownTool(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    Containment,
    NotFound,
    WrongType,
    InvalidArgument,
    Io,
    Timeout,
    UnknownTool,
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::OutsideRoot { .. } => ToolErrorKind::Containment,
            Self::NotFound(_) => ToolErrorKind::NotFound,
            Self::NotADirectory(_) | Self::NotAFile(_) | Self::WrongScriptType { .. } => {
                ToolErrorKind::WrongType
            }
            Self::MissingArgument(_) | Self::InvalidArgument { .. } => ToolErrorKind::InvalidArgument,
            Self::Io(_) | Self::Spawn { .. } => ToolErrorKind::Io,
            Self::Timeout { .. } => ToolErrorKind::Timeout,
            Self::UnknownTool(_) => ToolErrorKind::UnknownTool,
        }
    }

    fn outside(action: &'static str, path: &str) -> Self {
        Self::OutsideRoot { action, path: path.to_string() }
    }
}

/// One entry of the tool catalog.
///
/// `root` is supplied by the dispatcher on every call. Model arguments only
/// ever arrive through `args`, so they cannot move the sandbox.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn spec(&self) -> ToolSpec;

    async fn call(&self, root: &WorkingRoot, args: &Value) -> Result<String, ToolError>;
}

fn required_str<'a>(args: &'a Value, field: &'static str) -> Result<&'a str, ToolError> {
    match args.get(field) {
        None | Some(Value::Null) => Err(ToolError::MissingArgument(field)),
        Some(Value::String(value)) if value.is_empty() => Err(ToolError::MissingArgument(field)),
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(ToolError::InvalidArgument {
            name: field,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

fn optional_str<'a>(args: &'a Value, field: &'static str, default: &'a str) -> Result<&'a str, ToolError> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(value)) if value.is_empty() => Ok(default),
        Some(_) => required_str(args, field),
    }
}

fn string_list(args: &Value, field: &'static str) -> Result<Vec<String>, ToolError> {
    let items = match args.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ToolError::InvalidArgument {
                name: field,
                reason: format!("expected an array of strings, got {}", other),
            });
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(value) => Ok(value.clone()),
            Value::Number(number) => Ok(number.to_string()),
            Value::Bool(flag) => Ok(flag.to_string()),
            other => Err(ToolError::InvalidArgument {
                name: field,
                reason: format!("unsupported array item {}", other),
            }),
        })
        .collect()
}

pub struct ListDirectory;

#[async_trait]
impl Tool for ListDirectory {
    fn name(&self) -> &'static str {
        "get_files_info"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Lists files in the specified directory along with their sizes, constrained to the working directory.",
            params: vec![ParamSpec::optional(
                "directory",
                ParamKind::String,
                "The directory to list files from, relative to the working directory. If not provided, lists files in the working directory itself.",
            )],
        }
    }

    async fn call(&self, root: &WorkingRoot, args: &Value) -> Result<String, ToolError> {
        let directory = optional_str(args, "directory", ".")?;
        let target = root
            .contain(directory)
            .ok_or_else(|| ToolError::outside("list", directory))?;
        if !target.is_dir() {
            return Err(ToolError::NotADirectory(directory.to_string()));
        }

        let mut lines = Vec::new();
        for entry in fs::read_dir(&target)? {
            let entry = entry?;
            let meta = fs::metadata(entry.path())?;
            lines.push(format!(
                "- {}: files_size={}, is_dir={}",
                entry.file_name().to_string_lossy(),
                meta.len(),
                meta.is_dir()
            ));
        }
        Ok(lines.join("\n"))
    }
}

pub struct ReadFile {
    character_limit: usize,
}

impl ReadFile {
    pub fn new(character_limit: usize) -> Self {
        Self { character_limit }
    }

    /// Read at most `character_limit + 1` characters without loading the rest.
    fn read_prefix(&self, path: &Path) -> Result<String, ToolError> {
        // A UTF-8 character is at most four bytes.
        let byte_cap = (self.character_limit.saturating_add(1)).saturating_mul(4) as u64;
        let mut buf = Vec::new();
        fs::File::open(path)?.take(byte_cap).read_to_end(&mut buf)?;

        let hit_cap = buf.len() as u64 == byte_cap;
        match String::from_utf8(buf) {
            Ok(text) => Ok(text),
            Err(err) => {
                let utf8 = err.utf8_error();
                // Only a character split by the byte cap is tolerated.
                if hit_cap && utf8.error_len().is_none() {
                    let mut bytes = err.into_bytes();
                    bytes.truncate(utf8.valid_up_to());
                    String::from_utf8(bytes)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
                } else {
                    Err(io::Error::new(io::ErrorKind::InvalidData, utf8).into())
                }
            }
        }
    }
}

pub(crate) fn truncate_chars(content: String, limit: usize) -> String {
    match content.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}... truncated at {} characters", &content[..cut], limit),
        None => content,
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &'static str {
        "get_file_content"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Reads the content of a file, constrained to the working directory. Long files are truncated.",
            params: vec![ParamSpec::required(
                "file_path",
                ParamKind::String,
                "The path of the file to read, relative to the working directory.",
            )],
        }
    }

    async fn call(&self, root: &WorkingRoot, args: &Value) -> Result<String, ToolError> {
        let file_path = required_str(args, "file_path")?;
        let target = root
            .contain(file_path)
            .ok_or_else(|| ToolError::outside("read", file_path))?;
        if !target.is_file() {
            return Err(ToolError::NotAFile(file_path.to_string()));
        }

        let content = self.read_prefix(&target)?;
        Ok(truncate_chars(content, self.character_limit))
    }
}

pub struct WriteFile;

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Writes or overwrites a file, constrained to the working directory. Creates missing parent directories.",
            params: vec![
                ParamSpec::required(
                    "file_path",
                    ParamKind::String,
                    "The path of the file to write, relative to the working directory.",
                ),
                ParamSpec::required("content", ParamKind::String, "The text to write into the file."),
            ],
        }
    }

    async fn call(&self, root: &WorkingRoot, args: &Value) -> Result<String, ToolError> {
        let file_path = required_str(args, "file_path")?;
        let target = root
            .contain(file_path)
            .ok_or_else(|| ToolError::outside("write to", file_path))?;
        let content = match args.get("content") {
            Some(Value::String(content)) => content.as_str(),
            None | Some(Value::Null) => return Err(ToolError::MissingArgument("content")),
            Some(other) => {
                return Err(ToolError::InvalidArgument {
                    name: "content",
                    reason: format!("expected a string, got {}", other),
                });
            }
        };

        if let Some(parent) = target.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&target, content)?;

        Ok(format!(
            "Successfully wrote to \"{}\" ({} characters written)",
            file_path,
            content.chars().count()
        ))
    }
}

/// Runs a script under the configured interpreter with a wall-clock limit.
pub struct RunScript {
    interpreter: String,
    extension: String,
    timeout: Duration,
}

impl RunScript {
    pub fn new(interpreter: impl Into<String>, extension: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            timeout,
        }
    }

    fn script_kind(&self) -> String {
        match self.extension.as_str() {
            "py" => "Python".to_string(),
            "sh" => "shell".to_string(),
            "js" => "JavaScript".to_string(),
            "rb" => "Ruby".to_string(),
            other => other.to_string(),
        }
    }

    fn command(&self, script: &Path, extra: &[String], root: &WorkingRoot) -> Command {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .args(extra)
            .current_dir(root.path())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

fn render_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut rendered = if stdout.is_empty() && stderr.is_empty() {
        "No output produced.\n".to_string()
    } else {
        format!("STDOUT: {}\nSTDERR:{}\n", stdout, stderr)
    };

    if !output.status.success() {
        match output.status.code() {
            Some(code) => rendered.push_str(&format!("Process exited with code {}", code)),
            None => rendered.push_str("Process terminated by signal"),
        }
    }
    rendered
}

#[async_trait]
impl Tool for RunScript {
    fn name(&self) -> &'static str {
        "run_python_file"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: "Runs a script file with optional arguments, constrained to the working directory. Returns its stdout, stderr and exit code.",
            params: vec![
                ParamSpec::required(
                    "file_path",
                    ParamKind::String,
                    "The path of the script to run, relative to the working directory.",
                ),
                ParamSpec::optional(
                    "args",
                    ParamKind::StringArray,
                    "Optional command-line arguments passed to the script.",
                ),
            ],
        }
    }

    async fn call(&self, root: &WorkingRoot, args: &Value) -> Result<String, ToolError> {
        let file_path = required_str(args, "file_path")?;
        let target = root
            .contain(file_path)
            .ok_or_else(|| ToolError::outside("execute", file_path))?;
        if !target.is_file() {
            return Err(ToolError::NotFound(file_path.to_string()));
        }
        if target.extension().and_then(|ext| ext.to_str()) != Some(self.extension.as_str()) {
            return Err(ToolError::WrongScriptType {
                path: file_path.to_string(),
                kind: self.script_kind(),
            });
        }
        let extra = string_list(args, "args")?;

        debug!(interpreter = %self.interpreter, script = %target.display(), ?extra, "spawning script");
        let mut command = self.command(&target, &extra, root);
        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(render_output(&output)),
            Ok(Err(source)) => {
                warn!(interpreter = %self.interpreter, error = %source, "failed to spawn script");
                Err(ToolError::Spawn { kind: self.script_kind(), source })
            }
            Err(_) => {
                // Dropping the output future kills the child.
                warn!(script = %file_path, timeout = ?self.timeout, "script timed out");
                Err(ToolError::Timeout {
                    path: file_path.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}
