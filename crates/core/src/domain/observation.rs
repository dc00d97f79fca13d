use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ExecutionError;
use crate::guard::Rejection;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
            Self::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

/// Ordered rows returned by an approved query. Every row has one value per column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as ordered `column -> value` pairs.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &CellValue)>> + '_ {
        self.rows.iter().map(|row| {
            self.columns.iter().map(String::as_str).zip(row.iter()).collect::<Vec<_>>()
        })
    }

    pub fn column_values<'a>(&'a self, column: &str) -> Vec<&'a CellValue> {
        let Some(index) = self.columns.iter().position(|name| name.eq_ignore_ascii_case(column))
        else {
            return Vec::new();
        };
        self.rows.iter().filter_map(|row| row.get(index)).collect()
    }

    pub fn render_table(&self) -> String {
        if self.columns.is_empty() {
            return "(no columns)".to_string();
        }

        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(format!("| {} |", self.columns.join(" | ")));
        lines.push(format!("|{}|", vec!["---"; self.columns.len()].join("|")));
        for row in &self.rows {
            let cells = row.iter().map(ToString::to_string).collect::<Vec<_>>();
            lines.push(format!("| {} |", cells.join(" | ")));
        }
        lines.join("\n")
    }
}

/// What the controller learned from one guard or executor step.
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    Rows(ResultSet),
    ExecutionFailed(ExecutionError),
    Rejected(Rejection),
}

impl Observation {
    pub fn render_for_prompt(&self) -> String {
        match self {
            Self::Rows(result) if result.is_empty() => {
                "query succeeded: 0 rows returned (no matching records)".to_string()
            }
            Self::Rows(result) => format!(
                "query succeeded: {} rows returned\n{}",
                result.row_count(),
                result.render_table()
            ),
            Self::ExecutionFailed(error) => format!("query failed: {error}"),
            Self::Rejected(rejection) => format!("candidate rejected by guard: {rejection}"),
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Rows(_))
    }
}
