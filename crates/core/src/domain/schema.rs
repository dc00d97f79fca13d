use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: String,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: data_type.into() }
    }
}

/// Tables and their ordered columns, as exposed to the model for one run.
///
/// Lookups are ASCII case-insensitive because SQLite resolves identifiers that way.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    tables: BTreeMap<String, Vec<ColumnDescription>>,
}

impl SchemaDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table<I>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = ColumnDescription>,
    {
        self.insert_table(table, columns);
        self
    }

    pub fn insert_table<I>(&mut self, table: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = ColumnDescription>,
    {
        self.tables.insert(table.into(), columns.into_iter().collect());
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnDescription]> {
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, columns)| columns.as_slice())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.keys().any(|table| table.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.tables.values().flatten().any(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// True when `name` is a table or a column of any table.
    pub fn knows_identifier(&self, name: &str) -> bool {
        self.has_table(name) || self.has_column(name)
    }

    pub fn render_for_prompt(&self) -> String {
        self.tables
            .iter()
            .map(|(table, columns)| {
                let columns = columns
                    .iter()
                    .map(|column| format!("{} ({})", column.name, column.data_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Table **{table}**: ({columns})")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnDescription, SchemaDescription};

    fn employees() -> SchemaDescription {
        SchemaDescription::new().with_table(
            "Employees",
            [
                ColumnDescription::new("employee_id", "INTEGER"),
                ColumnDescription::new("name", "TEXT"),
            ],
        )
    }

    #[test]
    fn identifier_lookup_ignores_ascii_case() {
        let schema = employees();
        assert!(schema.has_table("employees"));
        assert!(schema.has_column("EMPLOYEE_ID"));
        assert!(!schema.knows_identifier("salary"));
    }

    #[test]
    fn prompt_rendering_lists_columns_in_declared_order() {
        assert_eq!(
            employees().render_for_prompt(),
            "Table **Employees**: (employee_id (INTEGER), name (TEXT))"
        );
    }
}
