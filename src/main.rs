use enclave::config::Config;
use enclave::llm::GeminiClient;
use enclave::{AgentLoop, Dispatcher, ToolCatalog, WorkingRoot, logging};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(author, version, about = "Enclave - a coding agent confined to one working directory", long_about = None)]
struct Cli {
    /// What you want the agent to do
    prompt: String,

    /// Show tool arguments, token counts and the echoed prompt
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: ./enclave.yml, then ~/.enclave/enclave.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    logging::init(args.verbose);

    match run(args).await {
        Ok(answer) => {
            println!("Final response:\n{}", answer);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> anyhow::Result<String> {
    // A missing .env is fine; the key may already be in the environment.
    let _ = dotenvy::dotenv();
    let config = Config::discover(args.config.as_deref())?;

    let root = WorkingRoot::new(&config.runtime.working_dir).with_context(|| {
        format!("Working directory {:?} is not usable", config.runtime.working_dir)
    })?;
    debug!(root = %root.path().display(), model = %config.gemini.model, "configuration loaded");
    debug!("User prompt: {}", args.prompt);

    let dispatcher = Dispatcher::new(ToolCatalog::builtin(&config.runtime), root);
    let agent = AgentLoop::new(
        GeminiClient::new(&config.gemini),
        dispatcher,
        config.runtime.max_iterations(),
    );

    let outcome = agent.run(&args.prompt).await?;
    debug!(
        iterations = outcome.iterations,
        prompt_tokens = outcome.usage.prompt_tokens,
        response_tokens = outcome.usage.response_tokens,
        "token usage"
    );
    Ok(outcome.answer)
}
