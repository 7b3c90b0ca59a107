use thiserror::Error;

pub const NO_PARAMETERS_MESSAGE: &str = "No relevant parameters found. Please specify.";
pub const TOO_MANY_VALUES_MESSAGE: &str =
    "Too many values provided. Please match the number of clarifications requested.";

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("No keywords found in question")]
    NoKeywordsFound,

    #[error("Too many clarification values: got {given}, expected at most {expected}")]
    TooManyClarificationValues { given: usize, expected: usize },

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("No matching records found")]
    NotFound,

    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for NlqError {
    fn from(err: polars::error::PolarsError) -> Self {
        NlqError::Polars(err.to_string())
    }
}

impl NlqError {
    /// HTTP status the server answers with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            NlqError::NoKeywordsFound => 200,
            NlqError::TooManyClarificationValues { .. } => 400,
            NlqError::Execution(_) => 400,
            NlqError::NotFound => 404,
            NlqError::Synthesis(_) | NlqError::Llm(_) => 502,
            NlqError::UpstreamTimeout(_) => 504,
            _ => 500,
        }
    }

    /// Message shown to the person asking. Synthesis failures stay generic.
    pub fn user_message(&self) -> String {
        match self {
            NlqError::NoKeywordsFound => NO_PARAMETERS_MESSAGE.to_string(),
            NlqError::TooManyClarificationValues { .. } => TOO_MANY_VALUES_MESSAGE.to_string(),
            NlqError::Synthesis(_) => "Invalid SQL query generated.".to_string(),
            NlqError::Execution(msg) => format!("SQL Execution Error: {}", msg),
            NlqError::NotFound => "No matching records found.".to_string(),
            NlqError::UpstreamTimeout(_) => "The language model did not answer in time.".to_string(),
            other => format!("Error during processing: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, NlqError>;
