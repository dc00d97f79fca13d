use sqlreact_core::config::AgentConfig;
use sqlreact_core::domain::observation::Observation;
use sqlreact_core::domain::schema::SchemaDescription;
use sqlreact_core::errors::SchemaError;
use sqlreact_core::guard::{QueryGuard, Rejection};
use sqlreact_core::ports::{QueryExecutor, SchemaProvider};
use sqlreact_core::trace::{TraceRecord, TraceSink};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::StageContext;
use crate::flow::{RunEvent, RunFlow, RunState, RunTransitionError, TransitionOutcome};
use crate::llm::LlmClient;
use crate::stages::{descriptor, PromptInput, Stage, PLANNING_STAGES};

pub const DEFAULT_MAX_ACT_ATTEMPTS: u32 = 2;

/// Unrecoverable end of one run. Nothing partial is returned alongside it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HardStop {
    #[error("schema unavailable: {0}")]
    Schema(#[from] SchemaError),
    #[error("completion provider failed during {stage} stage: {message}")]
    Provider { stage: Stage, message: String },
    #[error("exceeded retry budget: {}", .rejection.reason_code())]
    RetryBudgetExceeded { rejection: Rejection, attempts: u32 },
    #[error("{stage} stage returned malformed output: {reason}")]
    MalformedStageOutput { stage: Stage, reason: String },
    #[error("run aborted: {0}")]
    Flow(#[from] RunTransitionError),
}

impl HardStop {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema",
            Self::Provider { .. } => "provider",
            Self::RetryBudgetExceeded { .. } => "retry_budget",
            Self::MalformedStageOutput { .. } => "malformed_output",
            Self::Flow(_) => "internal",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Schema(_) => "I can't see the database schema right now, so I didn't try to answer.",
            Self::Provider { .. } => {
                "The language model is unavailable right now. Please try again shortly."
            }
            Self::RetryBudgetExceeded { .. } => {
                "I couldn't produce a safe read-only query for that request, so nothing was run."
            }
            Self::MalformedStageOutput { .. } => {
                "The language model returned an unusable response. Please rephrase and try again."
            }
            Self::Flow(_) => "Something went wrong while answering. Please try again.",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FinalAnswer {
    pub run_id: String,
    pub text: String,
    pub query: Option<String>,
    pub observation: Observation,
    pub attempts: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReactConfig {
    pub max_act_attempts: u32,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self { max_act_attempts: DEFAULT_MAX_ACT_ATTEMPTS }
    }
}

impl From<&AgentConfig> for ReactConfig {
    fn from(config: &AgentConfig) -> Self {
        Self { max_act_attempts: config.max_act_attempts }
    }
}

/// Drives one request through Reason, Think, Act, Guard+Execute, Observe and Answer.
///
/// Every model call goes through a [`crate::stages::StageDescriptor`]; the controller only
/// decides ordering, retries and termination. Runs share no state, so one controller can
/// serve any number of sequential requests.
pub struct ReactController<L, S, E, T> {
    llm: L,
    schema_provider: S,
    executor: E,
    trace_sink: T,
    guard: QueryGuard,
    config: ReactConfig,
}

impl<L, S, E, T> ReactController<L, S, E, T>
where
    L: LlmClient,
    S: SchemaProvider,
    E: QueryExecutor,
    T: TraceSink,
{
    pub fn new(llm: L, schema_provider: S, executor: E, trace_sink: T) -> Self {
        Self {
            llm,
            schema_provider,
            executor,
            trace_sink,
            guard: QueryGuard::new(),
            config: ReactConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReactConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_act_attempts(mut self, max_act_attempts: u32) -> Self {
        self.config.max_act_attempts = max_act_attempts;
        self
    }

    pub fn config(&self) -> ReactConfig {
        self.config
    }

    /// Fetches the schema once, then runs every stage against it.
    pub async fn run(&self, request: &str) -> Result<FinalAnswer, HardStop> {
        let run_id = Uuid::new_v4().to_string();
        info!(
            event_name = "agent.run.started",
            correlation_id = %run_id,
            max_act_attempts = self.config.max_act_attempts,
            "react run started"
        );

        let schema = match self.schema_provider.describe_schema().await {
            Ok(schema) => schema,
            Err(error) => return Err(self.hard_stop(&run_id, HardStop::Schema(error))),
        };
        self.run_stages(&run_id, request, &schema).await
    }

    pub async fn run_with_schema(
        &self,
        request: &str,
        schema: &SchemaDescription,
    ) -> Result<FinalAnswer, HardStop> {
        let run_id = Uuid::new_v4().to_string();
        info!(
            event_name = "agent.run.started",
            correlation_id = %run_id,
            max_act_attempts = self.config.max_act_attempts,
            "react run started"
        );
        self.run_stages(&run_id, request, schema).await
    }

    async fn run_stages(
        &self,
        run_id: &str,
        request: &str,
        schema: &SchemaDescription,
    ) -> Result<FinalAnswer, HardStop> {
        if schema.is_empty() {
            return Err(self.hard_stop(run_id, HardStop::Schema(SchemaError::Empty)));
        }

        let mut context = StageContext::new();
        let mut flow = RunFlow::new(self.config.max_act_attempts);

        for stage in PLANNING_STAGES {
            let output = self.invoke(run_id, stage, 0, request, schema, &context, &mut flow).await?;
            context.push(stage, 0, output);
        }

        let (query, observation) = loop {
            let attempt = self.transition(run_id, &mut flow, RunEvent::CandidateDrafted)?.attempts;
            let candidate =
                self.invoke(run_id, Stage::Act, attempt, request, schema, &context, &mut flow).await?;
            context.push(Stage::Act, attempt, candidate.as_str());

            match self.guard.validate(&candidate, schema).into_result() {
                Ok(approved) => {
                    self.transition(run_id, &mut flow, RunEvent::CandidateApproved)?;
                    let observation = match self.executor.execute(&approved).await {
                        Ok(rows) => Observation::Rows(rows),
                        Err(error) => {
                            warn!(
                                event_name = "agent.query.execution_failed",
                                correlation_id = %run_id,
                                error_class = error.error_class(),
                                error = %error,
                                "approved query failed to execute"
                            );
                            Observation::ExecutionFailed(error)
                        }
                    };
                    self.observe(run_id, attempt, approved.as_str(), &observation, &mut context);
                    self.transition(run_id, &mut flow, RunEvent::ResultObserved)?;
                    break (approved.into_inner(), observation);
                }
                Err(rejection) => {
                    warn!(
                        event_name = "agent.guard.rejected",
                        correlation_id = %run_id,
                        attempt,
                        reason_code = rejection.reason_code(),
                        "candidate query rejected"
                    );
                    let observation = Observation::Rejected(rejection.clone());
                    self.observe(run_id, attempt, &candidate, &observation, &mut context);

                    let outcome = self.transition(run_id, &mut flow, RunEvent::CandidateRejected)?;
                    if outcome.to == RunState::HardStopped {
                        let stop =
                            HardStop::RetryBudgetExceeded { rejection, attempts: outcome.attempts };
                        return Err(self.hard_stop(run_id, stop));
                    }
                }
            }
        };

        let answer =
            self.invoke(run_id, Stage::Answer, 0, request, schema, &context, &mut flow).await?;
        self.transition(run_id, &mut flow, RunEvent::AnswerProduced)?;

        let text = match &observation {
            Observation::ExecutionFailed(error) => {
                format!("Query could not be completed: {error}. {answer}")
            }
            _ => answer,
        };

        let rows = match &observation {
            Observation::Rows(rows) => rows.row_count(),
            _ => 0,
        };
        info!(
            event_name = "agent.run.completed",
            correlation_id = %run_id,
            attempts = flow.attempts(),
            rows,
            "react run completed"
        );

        Ok(FinalAnswer {
            run_id: run_id.to_string(),
            text,
            query: Some(query),
            observation,
            attempts: flow.attempts(),
        })
    }

    /// One model call: render, complete, trace, validate.
    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        run_id: &str,
        stage: Stage,
        attempt: u32,
        request: &str,
        schema: &SchemaDescription,
        context: &StageContext,
        flow: &mut RunFlow,
    ) -> Result<String, HardStop> {
        let Some(descriptor) = descriptor(stage) else {
            let stop = HardStop::MalformedStageOutput {
                stage,
                reason: "stage has no prompt descriptor".to_string(),
            };
            return Err(self.hard_stop(run_id, stop));
        };

        let prompt = (descriptor.render_prompt)(&PromptInput { request, schema, context });
        let raw = match self.llm.complete(&prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                self.trace_sink.record(TraceRecord::new(
                    run_id,
                    stage.as_str(),
                    attempt,
                    prompt,
                    format!("provider error: {error}"),
                ));
                if let Ok(outcome) = flow.apply(RunEvent::ProviderFailed) {
                    debug!(
                        event_name = "agent.run.transition",
                        correlation_id = %run_id,
                        from = ?outcome.from,
                        to = ?outcome.to,
                        "run state changed"
                    );
                }
                let stop = HardStop::Provider { stage, message: error.to_string() };
                return Err(self.hard_stop(run_id, stop));
            }
        };

        self.trace_sink.record(TraceRecord::new(
            run_id,
            stage.as_str(),
            attempt,
            prompt,
            raw.as_str(),
        ));

        (descriptor.validate_output)(&raw).map_err(|error| {
            self.hard_stop(
                run_id,
                HardStop::MalformedStageOutput { stage, reason: error.to_string() },
            )
        })
    }

    fn observe(
        &self,
        run_id: &str,
        attempt: u32,
        query: &str,
        observation: &Observation,
        context: &mut StageContext,
    ) {
        let rendered = observation.render_for_prompt();
        self.trace_sink.record(TraceRecord::new(
            run_id,
            Stage::Observe.as_str(),
            attempt,
            query,
            rendered.as_str(),
        ));
        context.push(Stage::Observe, attempt, rendered);
    }

    fn transition(
        &self,
        run_id: &str,
        flow: &mut RunFlow,
        event: RunEvent,
    ) -> Result<TransitionOutcome, HardStop> {
        match flow.apply(event) {
            Ok(outcome) => {
                debug!(
                    event_name = "agent.run.transition",
                    correlation_id = %run_id,
                    from = ?outcome.from,
                    to = ?outcome.to,
                    event = ?outcome.event,
                    attempts = outcome.attempts,
                    "run state changed"
                );
                Ok(outcome)
            }
            Err(error) => Err(self.hard_stop(run_id, HardStop::Flow(error))),
        }
    }

    fn hard_stop(&self, run_id: &str, stop: HardStop) -> HardStop {
        warn!(
            event_name = "agent.run.hard_stopped",
            correlation_id = %run_id,
            error_class = stop.error_class(),
            reason = %stop,
            "react run hard stopped"
        );
        stop
    }
}

#[cfg(test)]
mod tests {
    use sqlreact_core::errors::SchemaError;
    use sqlreact_core::guard::Rejection;

    use super::{HardStop, ReactConfig, DEFAULT_MAX_ACT_ATTEMPTS};
    use crate::flow::RunTransitionError;
    use crate::stages::Stage;

    #[test]
    fn retry_budget_message_names_the_reason_code() {
        let stop = HardStop::RetryBudgetExceeded { rejection: Rejection::NonReadOnly, attempts: 2 };
        assert_eq!(stop.to_string(), "exceeded retry budget: non-read-only");

        let stop = HardStop::RetryBudgetExceeded {
            rejection: Rejection::UnknownIdentifier("secrets".to_string()),
            attempts: 2,
        };
        assert_eq!(stop.to_string(), "exceeded retry budget: unknown-identifier");
        assert_eq!(stop.error_class(), "retry_budget");
    }

    #[test]
    fn provider_stop_names_the_stage() {
        let stop = HardStop::Provider { stage: Stage::Think, message: "timeout".to_string() };
        assert_eq!(
            stop.to_string(),
            "completion provider failed during think stage: timeout"
        );
    }

    #[test]
    fn user_messages_never_leak_internal_detail() {
        let stops = [
            HardStop::Schema(SchemaError::Unavailable("/var/db/secret.db locked".to_string())),
            HardStop::Provider { stage: Stage::Act, message: "HTTP 401 key=abc".to_string() },
            HardStop::RetryBudgetExceeded { rejection: Rejection::MissingLimit, attempts: 2 },
            HardStop::MalformedStageOutput { stage: Stage::Answer, reason: "empty".to_string() },
            HardStop::Flow(RunTransitionError::BudgetSpent { max_attempts: 2 }),
        ];
        for stop in stops {
            let message = stop.user_message();
            assert!(!message.contains("secret"), "{message}");
            assert!(!message.contains("401"), "{message}");
            assert!(!message.is_empty());
        }
    }

    #[test]
    fn default_budget_allows_one_retry() {
        assert_eq!(ReactConfig::default().max_act_attempts, DEFAULT_MAX_ACT_ATTEMPTS);
        assert_eq!(DEFAULT_MAX_ACT_ATTEMPTS, 2);
    }
}
