//! Stage descriptors: one prompt template and one output validator per model call.
//!
//! The controller never formats prompts itself. It looks up the descriptor for a stage in
//! [`STAGES`] and folds the planning stages over the accumulating [`StageContext`].

use std::fmt;

use serde::Serialize;
use sqlreact_core::domain::schema::SchemaDescription;
use sqlreact_core::guard::MANDATORY_LIMIT;
use thiserror::Error;

use crate::context::StageContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Reason,
    Think,
    Act,
    Observe,
    Answer,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reason => "reason",
            Self::Think => "think",
            Self::Act => "act",
            Self::Observe => "observe",
            Self::Answer => "answer",
        }
    }

    /// Prefix used when the stage's output is replayed to the model.
    pub fn label(self) -> &'static str {
        match self {
            Self::Reason => "REASON",
            Self::Think => "THINK",
            Self::Act => "ACT",
            Self::Observe => "OBSERVATION",
            Self::Answer => "ANSWER",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StageOutputError {
    #[error("{stage} stage returned empty output")]
    Empty { stage: Stage },
}

pub struct PromptInput<'a> {
    pub request: &'a str,
    pub schema: &'a SchemaDescription,
    pub context: &'a StageContext,
}

pub struct StageDescriptor {
    pub stage: Stage,
    pub name: &'static str,
    pub render_prompt: fn(&PromptInput<'_>) -> String,
    pub validate_output: fn(&str) -> Result<String, StageOutputError>,
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor").field("stage", &self.stage).field("name", &self.name).finish()
    }
}

/// Model-backed stages in execution order. Observe has no descriptor: it records the
/// guard verdict or executor result without a model call.
pub static STAGES: [StageDescriptor; 4] = [
    StageDescriptor {
        stage: Stage::Reason,
        name: "reason",
        render_prompt: render_reason,
        validate_output: validate_reason,
    },
    StageDescriptor {
        stage: Stage::Think,
        name: "think",
        render_prompt: render_think,
        validate_output: validate_think,
    },
    StageDescriptor {
        stage: Stage::Act,
        name: "act",
        render_prompt: render_act,
        validate_output: normalize_candidate,
    },
    StageDescriptor {
        stage: Stage::Answer,
        name: "answer",
        render_prompt: render_answer,
        validate_output: validate_answer,
    },
];

pub const PLANNING_STAGES: [Stage; 2] = [Stage::Reason, Stage::Think];

pub fn descriptor(stage: Stage) -> Option<&'static StageDescriptor> {
    STAGES.iter().find(|descriptor| descriptor.stage == stage)
}

const ACT_RULES: &str = "\
1. Write exactly one SELECT statement and nothing else.
2. Use only tables and columns from SCHEMA. Introduce column aliases with AS.
3. Allowed clauses: FROM, WHERE, GROUP BY, ORDER BY, and at most one INNER JOIN ... ON.
4. Never use HAVING, UNION, subqueries, WITH, OFFSET, window functions, comments or semicolons.
5. The statement must end with exactly LIMIT 100.
6. If an earlier OBSERVATION rejected a candidate, fix the reason it names.";

fn compose(
    role: &str,
    task: &str,
    output_format: &str,
    input: &PromptInput<'_>,
    with_context: bool,
) -> String {
    let mut prompt = format!(
        "ROLE: You are the {role} component of a read-only SQLite agent.\nSCHEMA:\n{}\n",
        input.schema.render_for_prompt()
    );
    if with_context {
        prompt.push_str(&format!("PRIOR STEPS:\n{}\n", input.context.render()));
    }
    prompt.push_str(&format!(
        "TASK: {task}\nOUTPUT FORMAT: {output_format}\n\nUSER REQUEST: {}",
        input.request
    ));
    prompt
}

fn render_reason(input: &PromptInput<'_>) -> String {
    compose(
        "REASON",
        "In a single sentence, name the table or tables that contain the data needed to answer \
         the user request. Do not write SQL.",
        "Respond only with the reasoning sentence.",
        input,
        false,
    )
}

fn render_think(input: &PromptInput<'_>) -> String {
    compose(
        "THINK",
        "In a single sentence, describe the logical steps needed to build the query, such as \
         filters, grouping and ordering. Use the REASON step as context. Do not write SQL.",
        "Respond only with the thinking sentence.",
        input,
        true,
    )
}

fn render_act(input: &PromptInput<'_>) -> String {
    let task = format!(
        "Write the SQLite query that answers the user request, following these rules:\n{ACT_RULES}"
    );
    let output_format = format!("Respond only with the SQL text, ending in {MANDATORY_LIMIT}.");
    compose("ACT", &task, &output_format, input, true)
}

fn render_answer(input: &PromptInput<'_>) -> String {
    compose(
        "ANSWER",
        "Answer the user request using only the data in the latest OBSERVATION. If no rows were \
         returned, say that nothing matched. If the query failed, say that it could not be \
         completed and explain why without inventing any data.",
        "Respond with a short natural-language answer.",
        input,
        true,
    )
}

fn non_empty(stage: Stage, raw: &str) -> Result<String, StageOutputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StageOutputError::Empty { stage });
    }
    Ok(trimmed.to_string())
}

fn validate_reason(raw: &str) -> Result<String, StageOutputError> {
    non_empty(Stage::Reason, raw)
}

fn validate_think(raw: &str) -> Result<String, StageOutputError> {
    non_empty(Stage::Think, raw)
}

fn validate_answer(raw: &str) -> Result<String, StageOutputError> {
    non_empty(Stage::Answer, raw)
}

/// Strip one surrounding Markdown code fence and one trailing `;`. Everything else is
/// left for the guard to judge.
pub fn normalize_candidate(raw: &str) -> Result<String, StageOutputError> {
    let text = strip_code_fence(raw.trim());
    let text = text.strip_suffix(';').map(str::trim_end).unwrap_or(text);
    Ok(text.to_string())
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```").and_then(|rest| rest.strip_suffix("```")) else {
        return text;
    };

    let body = match inner.split_once('\n') {
        Some((tag, body)) if !tag.trim().contains(char::is_whitespace) => body,
        _ => {
            let inner = inner.trim_start();
            match inner.get(..4) {
                Some(head) if head.eq_ignore_ascii_case("sql ") => &inner[4..],
                _ => inner,
            }
        }
    };
    body.trim()
}

#[cfg(test)]
mod tests {
    use sqlreact_core::domain::schema::{ColumnDescription, SchemaDescription};

    use super::{
        descriptor, normalize_candidate, PromptInput, Stage, StageOutputError, PLANNING_STAGES,
        STAGES,
    };
    use crate::context::StageContext;

    fn users_schema() -> SchemaDescription {
        SchemaDescription::new().with_table(
            "users",
            [ColumnDescription::new("id", "int"), ColumnDescription::new("name", "text")],
        )
    }

    #[test]
    fn stages_run_in_declared_order() {
        let names = STAGES.iter().map(|descriptor| descriptor.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["reason", "think", "act", "answer"]);
        assert_eq!(PLANNING_STAGES, [Stage::Reason, Stage::Think]);
        assert!(descriptor(Stage::Observe).is_none());
    }

    #[test]
    fn every_prompt_carries_schema_and_request() {
        let schema = users_schema();
        let context = StageContext::new();
        let input = PromptInput { request: "show me all users", schema: &schema, context: &context };

        for descriptor in &STAGES {
            let prompt = (descriptor.render_prompt)(&input);
            assert!(prompt.contains("Table **users**: (id (int), name (text))"), "{prompt}");
            assert!(prompt.ends_with("USER REQUEST: show me all users"), "{prompt}");
            assert!(prompt.contains(descriptor.stage.label()), "{prompt}");
        }
    }

    #[test]
    fn later_prompts_replay_prior_outputs() {
        let schema = users_schema();
        let mut context = StageContext::new();
        context.push(Stage::Reason, 0, "The users table has names.");
        let input = PromptInput { request: "names", schema: &schema, context: &context };

        let reason_prompt = descriptor(Stage::Reason).map(|d| (d.render_prompt)(&input));
        let think_prompt = descriptor(Stage::Think).map(|d| (d.render_prompt)(&input));

        assert!(reason_prompt.is_some_and(|prompt| !prompt.contains("PRIOR STEPS")));
        assert!(think_prompt.is_some_and(|prompt| prompt.contains("REASON: The users table has names.")));
    }

    #[test]
    fn act_prompt_states_the_mandatory_limit() {
        let schema = users_schema();
        let context = StageContext::new();
        let input = PromptInput { request: "names", schema: &schema, context: &context };
        let prompt = descriptor(Stage::Act).map(|d| (d.render_prompt)(&input)).unwrap_or_default();
        assert!(prompt.contains("LIMIT 100"));
        assert!(prompt.contains("at most one INNER JOIN"));
    }

    #[test]
    fn planning_and_answer_outputs_must_not_be_empty() {
        for descriptor in STAGES.iter().filter(|descriptor| descriptor.stage != Stage::Act) {
            assert_eq!(
                (descriptor.validate_output)("   \n"),
                Err(StageOutputError::Empty { stage: descriptor.stage })
            );
            assert_eq!((descriptor.validate_output)("  ok \n"), Ok("ok".to_string()));
        }
    }

    #[test]
    fn candidate_normalisation_strips_fence_and_semicolon_only() {
        let cases = [
            ("SELECT * FROM users LIMIT 100", "SELECT * FROM users LIMIT 100"),
            ("  SELECT * FROM users LIMIT 100; ", "SELECT * FROM users LIMIT 100"),
            ("```sql\nSELECT * FROM users LIMIT 100;\n```", "SELECT * FROM users LIMIT 100"),
            ("```\nSELECT id\nFROM users LIMIT 100\n```", "SELECT id\nFROM users LIMIT 100"),
            ("```SQL SELECT * FROM users LIMIT 100```", "SELECT * FROM users LIMIT 100"),
            ("SELECT 1;;", "SELECT 1;"),
            ("DELETE FROM users", "DELETE FROM users"),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_candidate(raw), Ok(expected.to_string()), "raw: {raw:?}");
        }
    }
}
