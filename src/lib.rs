pub mod catalog;
pub mod keywords;
pub mod fuzzy_matcher;
pub mod column_matcher;
pub mod ambiguity;
pub mod session;
pub mod llm;
pub mod sql_generator;
pub mod sql_engine;
pub mod dataset;
pub mod data_assistant;
pub mod config;
pub mod error;

pub use config::AppConfig;
pub use data_assistant::{AskOutcome, DataAssistant, KeywordReport};
pub use error::{NlqError, Result};
