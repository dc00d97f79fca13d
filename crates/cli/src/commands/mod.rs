pub mod ask;
pub mod doctor;
pub mod seed;
pub mod session;
pub mod trace;

use serde::Serialize;
use serde_json::Value;
use sqlreact_core::config::{AppConfig, LoadOptions};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_details(command, message, None)
    }

    pub fn success_with_details(
        command: &str,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_details(command, error_class, message, exit_code, None)
    }

    pub fn failure_with_details(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        details: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Exit codes shared by every command.
pub mod exit {
    pub const CONFIG: u8 = 2;
    pub const RUNTIME: u8 = 3;
    pub const DATABASE: u8 = 4;
    pub const MIGRATION: u8 = 5;
    pub const VERIFICATION: u8 = 6;
    pub const HARD_STOP: u8 = 7;
}

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            exit::CONFIG,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            exit::RUNTIME,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\",\"details\":null}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::CommandResult;

    #[test]
    fn payload_always_carries_the_same_keys() {
        let ok = CommandResult::success("seed", "done");
        let payload: Value = serde_json::from_str(&ok.output).expect("valid json");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["error_class"], Value::Null);
        assert_eq!(payload["details"], Value::Null);

        let failed = CommandResult::failure_with_details(
            "ask",
            "hard_stop",
            "nothing was run",
            7,
            Some(json!({ "reason": "exceeded retry budget: non-read-only" })),
        );
        let payload: Value = serde_json::from_str(&failed.output).expect("valid json");
        assert_eq!(failed.exit_code, 7);
        assert_eq!(payload["error_class"], "hard_stop");
        assert_eq!(payload["details"]["reason"], "exceeded retry budget: non-read-only");
    }
}
