use sqlreact_agent::{HttpLlmClient, LlmClient, ScriptedLlmClient};
use sqlreact_core::config::LoadOptions;

use crate::commands::session::{answer_details, run_question, SessionRequest};
use crate::commands::{build_runtime, exit, load_config, CommandResult};

pub const DEMO_QUESTION: &str = "Who is the highest paid employee and what is their salary?";

/// Canned model output for [`DEMO_QUESTION`] against the demo dataset.
const DEMO_SCRIPT: [&str; 4] = [
    "The Employees table holds employee names and their salaries.",
    "Order the employees by salary from highest to lowest so the top row is the highest paid.",
    "SELECT name, salary FROM Employees ORDER BY salary DESC LIMIT 100",
    "Clark Kent is the highest paid employee, with a salary of 80000.",
];

pub fn run(question: Option<String>, offline: bool) -> CommandResult {
    run_with_options(question, offline, LoadOptions::default())
}

/// Runs one question against the demo dataset and returns every stage's prompt and output.
pub fn run_with_options(
    question: Option<String>,
    offline: bool,
    options: LoadOptions,
) -> CommandResult {
    let question = question.unwrap_or_else(|| DEMO_QUESTION.to_string());
    if offline && question != DEMO_QUESTION {
        return CommandResult::failure(
            "trace",
            "usage",
            format!("offline traces replay the built-in demo question only: {DEMO_QUESTION}"),
            exit::CONFIG,
        );
    }

    let config = match load_config("trace", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let llm: Box<dyn LlmClient> = if offline {
        Box::new(ScriptedLlmClient::new(DEMO_SCRIPT))
    } else {
        match HttpLlmClient::from_config(&config.llm) {
            Ok(client) => Box::new(client),
            Err(error) => {
                return CommandResult::failure(
                    "trace",
                    "config_validation",
                    format!("configuration issue: {error}"),
                    exit::CONFIG,
                )
            }
        }
    };
    let runtime = match build_runtime("trace") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let request = SessionRequest {
        question: &question,
        seed_demo: true,
        trace_path: config.agent.trace_path.clone(),
    };
    match runtime.block_on(run_question(&config, llm, request)) {
        Ok(outcome) => CommandResult::success_with_details(
            "trace",
            outcome.answer.text.clone(),
            Some(answer_details(&outcome, true)),
        ),
        Err(failure) => failure.into_command_result("trace", true),
    }
}
