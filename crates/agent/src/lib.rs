//! ReACT controller for read-only natural-language questions over SQLite.
//!
//! One request flows through a fixed pipeline:
//! 1. **Reason** and **Think** (`stages`): planning sentences, no SQL.
//! 2. **Act**: one candidate `SELECT`, checked by `sqlreact_core::guard`.
//! 3. **Observe**: the guard rejection or executor result, appended to the `context`.
//! 4. **Answer**: a natural-language reply grounded in the latest observation.
//!
//! Rejected candidates are redrafted with the rejection in context until the attempt
//! budget held by `flow::RunFlow` is spent, at which point the run hard-stops.
//!
//! # Safety Principle
//!
//! The model only ever proposes text. Nothing it writes reaches the database without an
//! `ApprovedQuery` from the guard.

pub mod context;
pub mod flow;
pub mod llm;
pub mod runtime;
pub mod stages;

pub use context::{ContextEntry, StageContext};
pub use flow::{RunEvent, RunFlow, RunState, RunTransitionError, TransitionOutcome};
pub use llm::{HttpLlmClient, LlmClient, ProviderError, ScriptedLlmClient};
pub use runtime::{FinalAnswer, HardStop, ReactConfig, ReactController, DEFAULT_MAX_ACT_ATTEMPTS};
pub use stages::{Stage, StageDescriptor, PLANNING_STAGES, STAGES};
