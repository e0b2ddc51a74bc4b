//! Prompts for SQL generation and result summarization
//!
//! The generation prompt pins the service to two kinds of output: a single
//! SQL statement, or one of three refusal sentences repeated verbatim.

use crate::connection_url::Dialect;
use crate::db::{Row, SchemaDescription};
use crate::llm::{Prompt, PromptPurpose};

pub const REFUSAL_NO_KNOWLEDGE: &str = "I don't have enough knowledge about that.";
pub const REFUSAL_NO_SCHEMA: &str = "I don't have enough data to generate SQL query.";
pub const REFUSAL_NO_TABLES: &str = "I don't have knowledge, please connect a proper database.";

pub const REFUSALS: [&str; 3] = [REFUSAL_NO_KNOWLEDGE, REFUSAL_NO_SCHEMA, REFUSAL_NO_TABLES];

/// Every summary starts with this phrase.
pub const SUMMARY_LEAD_IN: &str = "For your data,";

/// Rows beyond this are left out of the summary request.
pub const MAX_SUMMARY_ROWS: usize = 200;

const SQL_SYSTEM_PROMPT: &str = "You translate questions about a relational database into SQL. \
You answer with SQL only, never with prose, markdown or commentary.";

const SUMMARY_SYSTEM_PROMPT: &str = "You explain database query results to people who do not know SQL.";

pub fn is_refusal(text: &str) -> bool {
    REFUSALS.contains(&text.trim())
}

pub fn sql_generation_prompt(
    dialect: Dialect,
    tables: &[String],
    schema: &SchemaDescription,
    question: &str,
) -> Prompt {
    let table_list = if tables.is_empty() {
        "(none)".to_string()
    } else {
        tables.join(", ")
    };
    let schema_text = if schema.is_empty() {
        "(no schema available)".to_string()
    } else {
        schema.to_string()
    };

    let user = format!(
        r#"Write one syntactically correct {dialect} statement that answers the question below.

Rules:
1. Output only the SQL statement. No explanations, no markdown, no code fences.
2. Use only the tables and columns listed in the schema.
3. If the question cannot be answered from this schema, reply exactly: {no_knowledge}
4. If no schema is provided, reply exactly: {no_schema}
5. If there are no tables, reply exactly: {no_tables}
6. Reproduce those sentences verbatim, with no other text.

Tables: {table_list}

Schema:
{schema_text}

Question: {question}"#,
        dialect = dialect.name(),
        no_knowledge = REFUSAL_NO_KNOWLEDGE,
        no_schema = REFUSAL_NO_SCHEMA,
        no_tables = REFUSAL_NO_TABLES,
    );

    Prompt {
        purpose: PromptPurpose::SqlGeneration,
        system: SQL_SYSTEM_PROMPT.to_string(),
        user,
    }
}

pub fn summary_prompt(question: &str, sql: &str, rows: &[Row]) -> Prompt {
    let shown = &rows[..rows.len().min(MAX_SUMMARY_ROWS)];
    let rows_json = serde_json::to_string(shown).unwrap_or_else(|_| "[]".to_string());
    let truncated = if rows.len() > shown.len() {
        format!(
            "\n(Showing the first {} of {} rows.)",
            shown.len(),
            rows.len()
        )
    } else {
        String::new()
    };

    let user = format!(
        r#"A user asked: "{question}"

This SQL was executed:
{sql}

It returned these rows as JSON:
{rows_json}{truncated}

Explain the result in plain language.
- Begin your answer with "{lead_in}".
- If the rows contain counts, sums, averages or other numeric aggregates, state those numbers clearly.
- Do not mention SQL, tables, columns, joins or other database terms.
- If no rows came back, say what that means for the question."#,
        lead_in = SUMMARY_LEAD_IN,
    );

    Prompt {
        purpose: PromptPurpose::Summary,
        system: SUMMARY_SYSTEM_PROMPT.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_schema() -> SchemaDescription {
        SchemaDescription {
            dialect: Dialect::Postgres,
            tables: vec![],
        }
    }

    #[test]
    fn generation_prompt_carries_refusals_and_question() {
        let prompt = sql_generation_prompt(
            Dialect::MySql,
            &["students".to_string(), "courses".to_string()],
            &empty_schema(),
            "how many students are enrolled",
        );
        assert_eq!(prompt.purpose, PromptPurpose::SqlGeneration);
        for refusal in REFUSALS {
            assert!(prompt.user.contains(refusal));
        }
        assert!(prompt.user.contains("Tables: students, courses"));
        assert!(prompt.user.contains("MySQL"));
        assert!(prompt.user.ends_with("Question: how many students are enrolled"));
    }

    #[test]
    fn summary_prompt_includes_rows_and_lead_in() {
        let mut row = Row::new();
        row.insert("total".into(), json!(3));
        let prompt = summary_prompt("how many?", "SELECT COUNT(*) AS total FROM s", &[row]);
        assert!(prompt.user.contains(r#"[{"total":3}]"#));
        assert!(prompt.user.contains("Begin your answer with \"For your data,\""));
        assert!(!prompt.user.contains("Showing the first"));
    }

    #[test]
    fn summary_prompt_truncates_large_results() {
        let rows: Vec<Row> = (0..MAX_SUMMARY_ROWS + 5)
            .map(|i| {
                let mut row = Row::new();
                row.insert("n".into(), json!(i));
                row
            })
            .collect();
        let prompt = summary_prompt("q", "SELECT n FROM t", &rows);
        assert!(prompt.user.contains("Showing the first 200 of 205 rows."));
    }

    #[test]
    fn refusals_are_recognized() {
        assert!(is_refusal("I don't have enough knowledge about that."));
        assert!(!is_refusal("SELECT 1"));
    }
}
