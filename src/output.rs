//! Rendering of collected messages and the optional archive copy.
//!
//! JSON and CSV are encoded once; the console stream and the archive upload
//! receive the same bytes.

use std::io::Write;

use chrono::{DateTime, Local, Utc};

use crate::archive::ArchiveUploader;
use crate::history::MessageRecord;
use crate::{AppError, Result};

pub const CSV_HEADER: [&str; 6] = ["Channel", "ChannelID", "User", "Timestamp", "Date", "Text"];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Console,
    Json,
    Csv,
}

impl OutputFormat {
    /// Names are matched exactly; anything else, including `CSV`, falls
    /// back to console output.
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Console,
        }
    }

    pub fn extension(self) -> Option<&'static str> {
        match self {
            OutputFormat::Console => None,
            OutputFormat::Json => Some("json"),
            OutputFormat::Csv => Some("csv"),
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Console => "text/plain; charset=utf-8",
            OutputFormat::Json => "application/json",
            OutputFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

/// Where and under which name to archive the rendered bytes.
pub struct ArchiveTarget<'a> {
    pub uploader: &'a dyn ArchiveUploader,
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitOutcome {
    pub records: usize,
    /// Object key of a successful upload
    pub archived_key: Option<String>,
}

fn local_date(date: &DateTime<Utc>) -> String {
    date.with_timezone(&Local).format(DATE_FORMAT).to_string()
}

pub fn render_console(records: &[MessageRecord]) -> String {
    records
        .iter()
        .map(|r| {
            format!(
                "[{}] {} ({}): {}\n",
                local_date(&r.date),
                r.channel,
                r.user,
                r.text
            )
        })
        .collect()
}

pub fn render_json(records: &[MessageRecord]) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec_pretty(records).map_err(|e| AppError::JsonSerialize(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn csv_row<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut row = fields.into_iter().map(csv_field).collect::<Vec<_>>().join(",");
    row.push('\n');
    row
}

/// Every field is quoted and embedded quotes are doubled.
pub fn render_csv(records: &[MessageRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push('\n');

    for r in records {
        let date = local_date(&r.date);
        out.push_str(&csv_row([
            r.channel.as_str(),
            r.channel_id.as_str(),
            r.user.as_str(),
            r.timestamp.as_str(),
            date.as_str(),
            r.text.as_str(),
        ]));
    }

    out
}

pub fn render(records: &[MessageRecord], format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Console => Ok(render_console(records).into_bytes()),
        OutputFormat::Json => render_json(records),
        OutputFormat::Csv => Ok(render_csv(records).into_bytes()),
    }
}

/// Writes the rendering to `out`, then hands the same bytes to the archive
/// if one is configured. Upload failures are logged and do not fail the
/// call; console output never uploads.
pub async fn emit<W: Write>(
    records: &[MessageRecord],
    format: OutputFormat,
    archive: Option<ArchiveTarget<'_>>,
    out: &mut W,
) -> Result<EmitOutcome> {
    let bytes = render(records, format)?;
    out.write_all(&bytes)?;
    out.flush()?;

    let mut outcome = EmitOutcome {
        records: records.len(),
        archived_key: None,
    };

    let Some(target) = archive else {
        return Ok(outcome);
    };
    if format == OutputFormat::Console {
        return Ok(outcome);
    }

    match target
        .uploader
        .upload(&bytes, &target.filename, format.content_type())
        .await
    {
        Ok(key) => outcome.archived_key = Some(key),
        Err(e) => tracing::warn!("Failed to upload to B2: {}", e),
    }

    Ok(outcome)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Records uploads; optionally fails every call.
    #[derive(Default)]
    pub struct RecordingUploader {
        pub fail: bool,
        pub uploads: Mutex<Vec<(Vec<u8>, String, String)>>,
    }

    impl RecordingUploader {
        pub fn upload_count(&self) -> usize {
            self.uploads.lock().map(|u| u.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl ArchiveUploader for RecordingUploader {
        async fn upload(&self, data: &[u8], filename: &str, content_type: &str) -> Result<String> {
            if let Ok(mut uploads) = self.uploads.lock() {
                uploads.push((data.to_vec(), filename.to_string(), content_type.to_string()));
            }
            if self.fail {
                return Err(AppError::Archive("status 503".to_string()));
            }
            Ok(format!("prefix/{}", filename))
        }
    }
}
