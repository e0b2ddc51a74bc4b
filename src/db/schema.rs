//! Structural schema description rendered as text for SQL generation

use super::QueryOutput;
use crate::connection_url::Dialect;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub table: String,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// Example rows shown after the column listing.
    pub sample: Option<QueryOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub dialect: Dialect,
    pub tables: Vec<TableSchema>,
}

impl SchemaDescription {
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CREATE TABLE {} (", self.name)?;
        let defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("\t{} {}{}", c.name, c.data_type.to_uppercase(), null)
            })
            .collect();
        writeln!(f, "{}", defs.join(",\n"))?;
        write!(f, ")")?;

        if let Some(sample) = &self.sample {
            let header: Vec<&str> = if sample.columns.is_empty() {
                self.columns.iter().map(|c| c.name.as_str()).collect()
            } else {
                sample.columns.iter().map(String::as_str).collect()
            };
            write!(
                f,
                "\n\n/*\n{} rows from {} table:\n{}",
                sample.rows.len(),
                self.name,
                header.join("\t")
            )?;
            for row in &sample.rows {
                let cells: Vec<String> = row.values().map(render_cell).collect();
                write!(f, "\n{}", cells.join("\t"))?;
            }
            write!(f, "\n*/")?;
        }
        Ok(())
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blocks: Vec<String> = self.tables.iter().map(|t| t.to_string()).collect();
        f.write_str(&blocks.join("\n\n\n"))
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Row;
    use serde_json::json;

    fn column(name: &str, data_type: &str, nullable: bool) -> ColumnInfo {
        ColumnInfo {
            table: "students".into(),
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }

    #[test]
    fn renders_create_table_with_samples() {
        let mut row = Row::new();
        row.insert("id".into(), json!(1));
        row.insert("name".into(), json!("Ada"));
        row.insert("email".into(), Value::Null);

        let table = TableSchema {
            name: "students".into(),
            columns: vec![
                column("id", "integer", false),
                column("name", "text", false),
                column("email", "varchar(255)", true),
            ],
            sample: Some(QueryOutput::read(
                vec!["id".into(), "name".into(), "email".into()],
                vec![row],
            )),
        };

        let text = table.to_string();
        assert_eq!(
            text,
            "CREATE TABLE students (\n\tid INTEGER NOT NULL,\n\tname TEXT NOT NULL,\n\temail VARCHAR(255)\n)\n\n/*\n1 rows from students table:\nid\tname\temail\n1\tAda\tNULL\n*/"
        );
    }

    #[test]
    fn empty_sample_uses_column_names_for_header() {
        let table = TableSchema {
            name: "students".into(),
            columns: vec![column("id", "integer", false)],
            sample: Some(QueryOutput::default()),
        };
        assert!(table.to_string().ends_with("0 rows from students table:\nid\n*/"));
    }

    #[test]
    fn description_lists_tables_in_order() {
        let schema = SchemaDescription {
            dialect: Dialect::Postgres,
            tables: vec![
                TableSchema { name: "a".into(), columns: vec![], sample: None },
                TableSchema { name: "b".into(), columns: vec![], sample: None },
            ],
        };
        assert_eq!(schema.table_names(), vec!["a", "b"]);
        assert!(schema.to_string().starts_with("CREATE TABLE a ("));
        assert!(schema.table("b").is_some());
    }
}
