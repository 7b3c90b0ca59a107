#![allow(dead_code)]

use async_trait::async_trait;
use nlq_assistant::catalog::ColumnCatalog;
use nlq_assistant::config::{AppConfig, DatasetConfig};
use nlq_assistant::llm::TextGenerator;
use nlq_assistant::{DataAssistant, NlqError, Result};
use polars::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Text generator replaying canned completions and recording every prompt.
pub struct Scripted {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl Scripted {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([reply.to_string()])),
            prompts: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| NlqError::Llm("no scripted reply left".to_string()))
    }
}

/// Discharge log: every value is text, as loaded from the JSON export.
pub fn shots_frame() -> DataFrame {
    df! [
        "N_DESCARGA" => ["8621", "8622", "8623"],
        "fecha" => ["2004-05-11", "2004-05-11", "2004-06-02"],
        "fecha_registro" => ["2004-05-12", "2004-05-12", "2004-06-03"],
        "hora" => ["10:15", "11:40", "09:05"],
        "hora_fin" => ["10:16", "11:41", "09:06"],
        "comentarioDesc" => [Some("buena descarga"), None, Some("disrupción")]
    ]
    .unwrap()
}

pub fn assistant_over(frame: DataFrame, config: &AppConfig, generator: Arc<Scripted>) -> DataAssistant {
    let catalog = ColumnCatalog::from_frame(&frame);
    let dataset = DatasetConfig::new("shots", "shots.json");
    DataAssistant::from_parts(&dataset, frame, catalog, config, generator)
}

pub fn assistant(generator: Arc<Scripted>) -> DataAssistant {
    assistant_over(shots_frame(), &AppConfig::default(), generator)
}
