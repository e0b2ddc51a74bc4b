#![allow(dead_code)]

use askdb::{GatewayError, Prompt, PromptPurpose, Result, TextGenerator};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

pub const SUMMARY: &str = "For your data, everything you asked about is listed above.";

/// Answers generation prompts from a queue of statements and every summary
/// prompt with `SUMMARY`.
pub struct ScriptedGenerator {
    statements: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new(statements: &[&str]) -> Self {
        Self {
            statements: Mutex::new(statements.iter().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _api_key: &str, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        match prompt.purpose {
            PromptPurpose::SqlGeneration => self
                .statements
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| GatewayError::Llm("script exhausted".into())),
            PromptPurpose::Summary => Ok(SUMMARY.to_string()),
        }
    }
}

/// A throwaway SQLite file seeded with `statements`. Removed on drop.
pub struct TempDatabase {
    path: PathBuf,
}

impl TempDatabase {
    pub async fn seeded(statements: &[&str]) -> Self {
        let path = std::env::temp_dir().join(format!("askdb-{}.db", uuid::Uuid::new_v4()));
        let db = Self { path };
        let pool = sqlx::SqlitePool::connect(&db.url()).await.unwrap();
        for statement in statements {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        pool.close().await;
        db
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub const SCHOOL: &[&str] = &[
    "CREATE TABLE students (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE courses (id INTEGER PRIMARY KEY, title TEXT NOT NULL)",
    "CREATE TABLE enrollments (student_id INTEGER, course_id INTEGER)",
    "INSERT INTO students (id, name) VALUES (1, 'Ada'), (2, 'Grace')",
    "INSERT INTO courses (id, title) VALUES (1, 'Compilers')",
    "INSERT INTO enrollments (student_id, course_id) VALUES (1, 1), (2, 1)",
];
