use std::path::PathBuf;

use serde_json::{json, Value};
use sqlreact_agent::{FinalAnswer, HardStop, LlmClient, ReactConfig, ReactController};
use sqlreact_core::config::AppConfig;
use sqlreact_core::domain::observation::Observation;
use sqlreact_core::trace::{
    CompositeTraceSink, InMemoryTraceSink, JsonlTraceSink, TraceRecord, TracingTraceSink,
};
use sqlreact_db::{
    connect_from_config, migrations, DemoSeedDataset, SqliteQueryExecutor, SqliteSchemaProvider,
};
use tracing::info;

use crate::commands::{exit, CommandResult};

/// Everything one agent run needs besides the configuration and the model.
pub(crate) struct SessionRequest<'a> {
    pub question: &'a str,
    pub seed_demo: bool,
    pub trace_path: Option<PathBuf>,
}

pub(crate) struct SessionOutcome {
    pub answer: FinalAnswer,
    pub trace: Vec<TraceRecord>,
}

pub(crate) enum SessionFailure {
    Database(String),
    Migration(String),
    Seed(String),
    HardStop { stop: HardStop, trace: Vec<TraceRecord> },
}

/// Connects, migrates, optionally loads the demo rows, then runs the controller once.
pub(crate) async fn run_question<L>(
    config: &AppConfig,
    llm: L,
    request: SessionRequest<'_>,
) -> Result<SessionOutcome, SessionFailure>
where
    L: LlmClient,
{
    let pool = connect_from_config(&config.database)
        .await
        .map_err(|error| SessionFailure::Database(error.to_string()))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| SessionFailure::Migration(error.to_string()))?;
    if request.seed_demo {
        DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| SessionFailure::Seed(error.to_string()))?;
    }

    let memory = InMemoryTraceSink::default();
    let mut sink = CompositeTraceSink::new().with_sink(TracingTraceSink).with_sink(memory.clone());
    if let Some(path) = &request.trace_path {
        info!(
            event_name = "cli.trace.file_enabled",
            path = %path.display(),
            "appending stage trace to file"
        );
        sink = sink.with_sink(JsonlTraceSink::open(path));
    }

    let controller = ReactController::new(
        llm,
        SqliteSchemaProvider::new(pool.clone()),
        SqliteQueryExecutor::new(pool.clone(), config.database.timeout_secs),
        sink,
    )
    .with_config(ReactConfig::from(&config.agent));

    let result = controller.run(request.question).await;
    pool.close().await;

    match result {
        Ok(answer) => Ok(SessionOutcome { answer, trace: memory.records() }),
        Err(stop) => Err(SessionFailure::HardStop { stop, trace: memory.records() }),
    }
}

impl SessionFailure {
    pub(crate) fn into_command_result(self, command: &str, include_trace: bool) -> CommandResult {
        match self {
            Self::Database(message) => {
                CommandResult::failure(command, "db_connectivity", message, exit::DATABASE)
            }
            Self::Migration(message) => {
                CommandResult::failure(command, "migration", message, exit::MIGRATION)
            }
            Self::Seed(message) => {
                CommandResult::failure(command, "seed_execution", message, exit::MIGRATION)
            }
            Self::HardStop { stop, trace } => {
                let mut details = json!({
                    "stop_class": stop.error_class(),
                    "reason": stop.to_string(),
                });
                if include_trace {
                    details["trace"] = trace_json(&trace);
                }
                CommandResult::failure_with_details(
                    command,
                    "hard_stop",
                    stop.user_message(),
                    exit::HARD_STOP,
                    Some(details),
                )
            }
        }
    }
}

pub(crate) fn answer_details(outcome: &SessionOutcome, include_trace: bool) -> Value {
    let answer = &outcome.answer;
    let mut details = json!({
        "run_id": answer.run_id,
        "query": answer.query,
        "attempts": answer.attempts,
        "observation": observation_json(&answer.observation),
    });
    if include_trace {
        details["trace"] = trace_json(&outcome.trace);
    }
    details
}

fn observation_json(observation: &Observation) -> Value {
    match observation {
        Observation::Rows(result) => json!({
            "kind": "rows",
            "row_count": result.row_count(),
            "columns": result.columns,
            "rows": result.rows,
        }),
        Observation::ExecutionFailed(error) => json!({
            "kind": "execution_failed",
            "error_class": error.error_class(),
            "message": error.to_string(),
        }),
        Observation::Rejected(rejection) => json!({
            "kind": "rejected",
            "reason_code": rejection.reason_code(),
            "message": rejection.to_string(),
        }),
    }
}

fn trace_json(trace: &[TraceRecord]) -> Value {
    trace
        .iter()
        .map(|record| {
            json!({
                "stage": record.stage,
                "attempt": record.attempt,
                "input": record.input,
                "output": record.output,
                "recorded_at": record.recorded_at.to_rfc3339(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use sqlreact_core::domain::observation::{CellValue, Observation, ResultSet};
    use sqlreact_core::errors::ExecutionError;

    use super::observation_json;

    #[test]
    fn observations_serialize_with_a_kind_tag() {
        let rows = Observation::Rows(ResultSet::new(
            vec!["name".to_string()],
            vec![vec![CellValue::Text("Clark Kent".to_string())]],
        ));
        let value = observation_json(&rows);
        assert_eq!(value["kind"], "rows");
        assert_eq!(value["row_count"], 1);
        assert_eq!(value["rows"][0][0], "Clark Kent");

        let failed = Observation::ExecutionFailed(ExecutionError::Timeout { timeout_secs: 30 });
        let value = observation_json(&failed);
        assert_eq!(value["kind"], "execution_failed");
        assert_eq!(value["error_class"], "timeout");
    }
}
