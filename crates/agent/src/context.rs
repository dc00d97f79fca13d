use serde::Serialize;

use crate::stages::Stage;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    pub stage: Stage,
    pub attempt: u32,
    pub output: String,
}

/// Outputs accumulated during one run, in the order they were produced.
///
/// Append-only: entries can be added and read, never edited or removed.
#[derive(Clone, Debug, Default)]
pub struct StageContext {
    entries: Vec<ContextEntry>,
}

impl StageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage, attempt: u32, output: impl Into<String>) {
        self.entries.push(ContextEntry { stage, attempt, output: output.into() });
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self, stage: Stage) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.stage == stage)
            .map(|entry| entry.output.as_str())
    }

    /// Prior outputs as prompt lines, e.g. `ACT (attempt 1): SELECT ...`.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "(none)".to_string();
        }

        self.entries
            .iter()
            .map(|entry| {
                let label = entry.stage.label();
                if entry.attempt > 0 {
                    format!("{label} (attempt {}): {}", entry.attempt, entry.output)
                } else {
                    format!("{label}: {}", entry.output)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::StageContext;
    use crate::stages::Stage;

    #[test]
    fn render_keeps_production_order_and_attempts() {
        let mut context = StageContext::new();
        context.push(Stage::Reason, 0, "Employees holds salaries.");
        context.push(Stage::Think, 0, "Order by salary descending.");
        context.push(Stage::Act, 1, "DELETE FROM Employees");
        context.push(Stage::Observe, 1, "candidate rejected by guard: non-read-only statement");

        assert_eq!(
            context.render(),
            "REASON: Employees holds salaries.\n\
             THINK: Order by salary descending.\n\
             ACT (attempt 1): DELETE FROM Employees\n\
             OBSERVATION (attempt 1): candidate rejected by guard: non-read-only statement"
        );
        assert_eq!(context.len(), 4);
    }

    #[test]
    fn latest_returns_most_recent_output_for_a_stage() {
        let mut context = StageContext::new();
        context.push(Stage::Act, 1, "first");
        context.push(Stage::Act, 2, "second");

        assert_eq!(context.latest(Stage::Act), Some("second"));
        assert_eq!(context.latest(Stage::Answer), None);
        assert_eq!(StageContext::new().render(), "(none)");
    }
}
