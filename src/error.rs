use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("no Slack token configured (set slack.xoxp_token, slack.xoxc_token or SLACK_TOKEN)")]
    MissingToken,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid date format: {0}")]
    InvalidDate(String),

    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialize(String),

    #[error("YAML parse error: {0}")]
    YamlParse(String),

    #[error("archive upload error: {0}")]
    Archive(String),

    #[error("CSV validation failed for {0}")]
    CsvValidation(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
