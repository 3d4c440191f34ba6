/*
 * Enclave - Sandboxed Tool-Calling Agent
 * File Path: src/agent_loop.rs
 * Responsibility: Bounded model/tool loop and its termination policy.
 */

use crate::conversation::{Conversation, Part};
use crate::dispatcher::{Dispatcher, ToolResponse};
use crate::llm::{CompletionError, CompletionService, ModelTurn, TokenUsage, ToolCallRequest};
use thiserror::Error;
use tracing::{debug, warn};

pub const SYSTEM_PROMPT: &str = "\
You are a helpful AI coding agent.

When a user asks a question or makes a request, make a function call plan. You can perform the following operations:

- List files and directories
- Read file contents
- Execute Python files with optional arguments
- Write or overwrite files

All paths you provide should be relative to the working directory. You do not need to specify the working directory in your function calls as it is automatically injected for security reasons.
";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Maximum iterations ({0}) reached.")]
    MaxIterations(usize),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

#[derive(Debug)]
pub struct AgentOutcome {
    pub answer: String,
    pub iterations: usize,
    pub usage: TokenUsage,
    pub conversation: Conversation,
}

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    DispatchingTools(Vec<ToolCallRequest>),
    Done(String),
    Failed(AgentError),
}

pub struct AgentLoop<C> {
    client: C,
    dispatcher: Dispatcher,
    system_prompt: String,
    max_iterations: usize,
}

impl<C: CompletionService> AgentLoop<C> {
    pub fn new(client: C, dispatcher: Dispatcher, max_iterations: usize) -> Self {
        Self {
            client,
            dispatcher,
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Drive the conversation until the model answers in plain text.
    ///
    /// Each model call is one iteration. Transient completion failures still
    /// use up an iteration; the budget is checked before every call.
    pub async fn run(&self, prompt: &str) -> Result<AgentOutcome, AgentError> {
        let specs = self.dispatcher.catalog().specs();
        let mut conversation = Conversation::new(prompt);
        let mut usage = TokenUsage::default();
        let mut iteration = 0;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel if iteration >= self.max_iterations => {
                    LoopState::Failed(AgentError::MaxIterations(self.max_iterations))
                }
                LoopState::AwaitingModel => {
                    iteration += 1;
                    println!("🧠 Iteration {}/{}: Reasoning...", iteration, self.max_iterations);

                    match self
                        .client
                        .complete(&self.system_prompt, conversation.turns(), &specs)
                        .await
                    {
                        Ok(reply) => {
                            usage += reply.usage;
                            debug!(
                                iteration,
                                prompt_tokens = reply.usage.prompt_tokens,
                                response_tokens = reply.usage.response_tokens,
                                "completion usage"
                            );
                            absorb_model_turn(&mut conversation, reply.turn)
                        }
                        Err(err) if err.is_fatal() => LoopState::Failed(err.into()),
                        Err(err) => {
                            warn!(iteration, error = %err, "completion failed, retrying on next iteration");
                            LoopState::AwaitingModel
                        }
                    }
                }
                LoopState::DispatchingTools(calls) => {
                    let responses = self.dispatcher.dispatch_all(&calls).await;
                    conversation.push_tool_results(
                        responses.into_iter().map(ToolResponse::into_part).collect(),
                    );
                    LoopState::AwaitingModel
                }
                LoopState::Done(answer) => {
                    debug!(
                        iterations = iteration,
                        prompt_tokens = usage.prompt_tokens,
                        response_tokens = usage.response_tokens,
                        "agent finished"
                    );
                    return Ok(AgentOutcome {
                        answer,
                        iterations: iteration,
                        usage,
                        conversation,
                    });
                }
                LoopState::Failed(err) => return Err(err),
            };
        }
    }
}

/// Append the model turn and pick the next state from it.
fn absorb_model_turn(conversation: &mut Conversation, turn: ModelTurn) -> LoopState {
    match turn {
        ModelTurn::Narrative(text) => {
            conversation.push_model(vec![Part::text(text.clone())]);
            LoopState::Done(text)
        }
        ModelTurn::ToolCalls { thought, calls, .. } if calls.is_empty() => {
            let text = thought.unwrap_or_default();
            conversation.push_model(vec![Part::text(text.clone())]);
            LoopState::Done(text)
        }
        ModelTurn::ToolCalls { thought, calls, parts } => {
            if let Some(thought) = thought.as_ref() {
                println!("💬 Thought: {}", thought);
            }

            let model_parts = if parts.is_empty() {
                calls
                    .iter()
                    .map(|call| Part::FunctionCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        args: call.args.clone(),
                        thought_signature: None,
                    })
                    .collect()
            } else {
                parts
            };
            conversation.push_model(model_parts);
            LoopState::DispatchingTools(calls)
        }
    }
}
