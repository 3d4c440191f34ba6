use async_trait::async_trait;
use enclave::catalog::{ToolCatalog, ToolSpec};
use enclave::config::RuntimeConfig;
use enclave::conversation::{Part, Role, Turn};
use enclave::llm::{CompletionError, CompletionService, ModelReply, ModelTurn, TokenUsage, ToolCallRequest};
use enclave::{AgentError, AgentLoop, Dispatcher, WorkingRoot};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;
use tempfile::tempdir;

/// Plays back a fixed list of model turns; keeps requesting a listing once exhausted.
struct Scripted {
    turns: Mutex<VecDeque<ModelTurn>>,
    transcripts: Mutex<Vec<Vec<Turn>>>,
}

impl Scripted {
    fn new(turns: Vec<ModelTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            transcripts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionService for Scripted {
    async fn complete(
        &self,
        _system_prompt: &str,
        turns: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply, CompletionError> {
        assert_eq!(tools.len(), 4);
        self.transcripts.lock().unwrap().push(turns.to_vec());
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| calls(vec![("get_files_info", json!({}))]));
        Ok(ModelReply {
            turn,
            usage: TokenUsage { prompt_tokens: 100, response_tokens: 10 },
        })
    }
}

fn calls(requests: Vec<(&str, Value)>) -> ModelTurn {
    ModelTurn::ToolCalls {
        thought: None,
        calls: requests
            .into_iter()
            .map(|(name, args)| ToolCallRequest { id: None, name: name.to_string(), args })
            .collect(),
        parts: Vec::new(),
    }
}

fn agent(root: &std::path::Path, turns: Vec<ModelTurn>, max: usize) -> AgentLoop<Scripted> {
    let runtime = RuntimeConfig::default();
    let dispatcher = Dispatcher::new(ToolCatalog::builtin(&runtime), WorkingRoot::new(root).unwrap());
    AgentLoop::new(Scripted::new(turns), dispatcher, max)
}

fn tool_results(turn: &Turn) -> Vec<(String, Value)> {
    turn.parts
        .iter()
        .filter_map(|part| match part {
            Part::FunctionResponse { name, response, .. } => Some((name.clone(), response.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_every_requested_call_lands_in_one_tool_turn_in_order() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
    let agent = agent(
        dir.path(),
        vec![
            calls(vec![
                ("write_file", json!({ "file_path": "notes/todo.txt", "content": "fix the bug" })),
                ("delete_everything", json!({})),
                ("get_file_content", json!({ "file_path": "notes/todo.txt" })),
                ("get_file_content", json!({ "file_path": "../../etc/passwd" })),
            ]),
            ModelTurn::Narrative("Wrote the note.".to_string()),
        ],
        10,
    );

    let outcome = agent.run("leave me a note").await.unwrap();
    assert_eq!(outcome.answer, "Wrote the note.");
    assert_eq!(outcome.iterations, 2);

    let turns = outcome.conversation.turns();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[2].role, Role::Tool);

    let results = tool_results(&turns[2]);
    let names: Vec<&str> = results.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["write_file", "delete_everything", "get_file_content", "get_file_content"]
    );
    assert_eq!(
        results[0].1["result"],
        "Successfully wrote to \"notes/todo.txt\" (11 characters written)"
    );
    assert_eq!(results[1].1["error"], "Unknown function: delete_everything");
    assert_eq!(results[2].1["result"], "fix the bug");
    assert!(
        results[3].1["result"]
            .as_str()
            .unwrap()
            .starts_with("Error: Cannot read \"../../etc/passwd\"")
    );

    // The second request saw the full tool turn.
    let transcripts = agent.client().transcripts.lock().unwrap();
    assert_eq!(transcripts[1].len(), 3);
    assert_eq!(fs::read_to_string(dir.path().join("notes/todo.txt")).unwrap(), "fix the bug");
}

#[tokio::test]
async fn test_never_terminating_model_exhausts_budget() {
    let dir = tempdir().unwrap();
    let agent = agent(dir.path(), Vec::new(), 3);

    let err = agent.run("keep listing").await.unwrap_err();
    assert!(matches!(err, AgentError::MaxIterations(3)));
    assert_eq!(agent.client().transcripts.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_transcript_is_only_ever_appended() {
    let dir = tempdir().unwrap();
    let agent = agent(
        dir.path(),
        vec![
            calls(vec![("get_files_info", json!({}))]),
            calls(vec![("get_files_info", json!({ "directory": "missing" }))]),
            ModelTurn::Narrative("Done.".to_string()),
        ],
        5,
    );

    agent.run("look around").await.unwrap();

    let transcripts = agent.client().transcripts.lock().unwrap();
    for pair in transcripts.windows(2) {
        let (earlier, later) = (&pair[0], &pair[1]);
        assert!(later.len() > earlier.len());
        assert_eq!(&later[..earlier.len()], earlier.as_slice());
    }
}
