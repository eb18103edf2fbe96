use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

static ENV_PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").ok());

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub file_naming: FileNamingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend; only `b2` enables archive uploads
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub b2: B2Config,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct B2Config {
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub application_key_id: String,
    #[serde(default)]
    pub application_key: String,
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub xoxc_token: String,
    #[serde(default)]
    pub xoxd_token: String,
    #[serde(default)]
    pub xoxp_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub limit_per_channel: usize,
    #[serde(default)]
    pub output_format: String,
    #[serde(default)]
    pub channels_filter: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileNamingConfig {
    #[serde(default)]
    pub include_timestamp: bool,
    #[serde(default)]
    pub include_date_range: bool,
    #[serde(default)]
    pub include_channels: bool,
    #[serde(default)]
    pub prefix: String,
}

/// Credentials used to open a Slack session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackCredentials {
    pub token: String,
    /// Value of the `d` cookie, required alongside `xoxc` tokens
    pub cookie: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content, |name| std::env::var(name).ok());
        serde_yaml::from_str(&expanded).map_err(|e| AppError::YamlParse(e.to_string()))
    }

    pub fn archive_enabled(&self) -> bool {
        self.storage.kind == "b2"
    }

    /// Picks the Slack credentials: user token first, then browser token
    /// plus cookie, then `SLACK_TOKEN` from the environment.
    pub fn slack_credentials(&self, env_token: Option<String>) -> Result<SlackCredentials> {
        let slack = &self.slack;
        if is_set(&slack.xoxp_token) {
            return Ok(SlackCredentials {
                token: slack.xoxp_token.clone(),
                cookie: None,
            });
        }

        if is_set(&slack.xoxc_token) {
            let cookie = is_set(&slack.xoxd_token).then(|| slack.xoxd_token.clone());
            return Ok(SlackCredentials {
                token: slack.xoxc_token.clone(),
                cookie,
            });
        }

        match env_token {
            Some(token) if is_set(&token) => Ok(SlackCredentials {
                token,
                cookie: None,
            }),
            _ => Err(AppError::MissingToken),
        }
    }
}

/// Empty values and placeholders left unexpanded count as unset.
fn is_set(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !(value.starts_with("${") && value.ends_with('}'))
}

/// Replaces `${NAME}` placeholders using `lookup`. Placeholders whose
/// variable is unset or empty are left untouched.
pub fn expand_env_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let Some(re) = ENV_PLACEHOLDER.as_ref() else {
        return input.to_string();
    };

    re.replace_all(input, |caps: &Captures| {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let name = caps.get(1).map_or("", |m| m.as_str());
        match lookup(name) {
            Some(value) if !value.is_empty() => value,
            _ => whole.to_string(),
        }
    })
    .into_owned()
}
