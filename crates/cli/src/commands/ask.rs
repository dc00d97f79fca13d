use std::path::PathBuf;

use sqlreact_agent::HttpLlmClient;
use sqlreact_core::config::LoadOptions;

use crate::commands::session::{answer_details, run_question, SessionRequest};
use crate::commands::{build_runtime, exit, load_config, CommandResult};

pub fn run(question: &str, trace_file: Option<PathBuf>) -> CommandResult {
    run_with_options(question, trace_file, LoadOptions::default())
}

/// Answers one question with the configured model. `trace_file` takes precedence over
/// `agent.trace_path`.
pub fn run_with_options(
    question: &str,
    trace_file: Option<PathBuf>,
    options: LoadOptions,
) -> CommandResult {
    if question.trim().is_empty() {
        return CommandResult::failure("ask", "usage", "question must not be empty", exit::CONFIG);
    }

    let config = match load_config("ask", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let llm = match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                exit::CONFIG,
            )
        }
    };
    let runtime = match build_runtime("ask") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let request = SessionRequest {
        question,
        seed_demo: false,
        trace_path: trace_file.or_else(|| config.agent.trace_path.clone()),
    };
    match runtime.block_on(run_question(&config, llm, request)) {
        Ok(outcome) => CommandResult::success_with_details(
            "ask",
            outcome.answer.text.clone(),
            Some(answer_details(&outcome, false)),
        ),
        Err(failure) => failure.into_command_result("ask", false),
    }
}
