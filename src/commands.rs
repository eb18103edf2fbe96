use std::io::{self, Write};
use std::path::Path;

use chrono::{Local, NaiveDate};

use crate::archive::{ArchiveUploader, B2Uploader, NamingContext, archive_filename};
use crate::cli::FetchArgs;
use crate::config::Config;
use crate::csv_fix::{FixOptions, fix_csv_file};
use crate::directory::ChatDirectory;
use crate::error::Result;
use crate::history::{FetchLimit, TimeWindow, collect_history};
use crate::output::{ArchiveTarget, OutputFormat, emit};
use crate::parse_optional_date;
use crate::selection::{ChannelSelection, resolve_channels};
use crate::slack::SlackDirectory;

/// CLI flags merged over the config defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub window: TimeWindow,
    pub limit: FetchLimit,
    pub format: OutputFormat,
    /// Channel filter as given, used for logging and file naming
    pub channels_filter: String,
    pub selection: ChannelSelection,
}

impl RunOptions {
    pub fn resolve(args: &FetchArgs, config: &Config) -> Result<Self> {
        let start = parse_optional_date(args.start.as_deref())?;
        let end = parse_optional_date(args.end.as_deref())?;

        let output = if args.output.is_empty() {
            &config.defaults.output_format
        } else {
            &args.output
        };
        let channels_filter = if args.channels.is_empty() {
            config.defaults.channels_filter.clone()
        } else {
            args.channels.clone()
        };

        Ok(Self {
            start,
            end,
            window: TimeWindow::from_dates(start, end),
            limit: FetchLimit::resolve(args.limit, config.defaults.limit_per_channel),
            format: OutputFormat::parse(output),
            selection: ChannelSelection::parse(&channels_filter),
            channels_filter,
        })
    }

    fn naming_context(&self) -> NamingContext {
        NamingContext {
            start: self.start,
            end: self.end,
            channels: self.channels_filter.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub records: usize,
    pub channels: usize,
    /// `(channel name, message count)` for every channel that was read
    pub channel_counts: Vec<(String, usize)>,
    pub skipped_channels: Vec<String>,
    pub archived_key: Option<String>,
}

/// Runs one export against `directory`, writing the rendering to `out`.
///
/// Directory refresh failures abort the export. Channels that cannot be
/// read and failed uploads only produce warnings.
pub async fn export<D, W>(
    directory: &mut D,
    config: &Config,
    options: &RunOptions,
    uploader: Option<&dyn ArchiveUploader>,
    out: &mut W,
) -> Result<ExportSummary>
where
    D: ChatDirectory + ?Sized,
    W: Write,
{
    let users = directory.refresh_users().await?;
    let channel_count = directory.refresh_channels().await?;
    tracing::info!("Loaded {} users and {} channels", users, channel_count);

    tracing::info!("Fetching conversation history...");
    tracing::info!(
        "Date range: {} to {}",
        options.start.map(|d| d.to_string()).unwrap_or_default(),
        options.end.map(|d| d.to_string()).unwrap_or_default()
    );
    tracing::info!("Limit per channel: {}", options.limit);
    tracing::info!("Channels filter: {}", options.channels_filter);

    let channels = resolve_channels(&options.selection, &*directory).await?;
    tracing::info!("Found {} channels", channels.len());

    let collected = collect_history(&*directory, &channels, options.limit, &options.window).await;
    let channel_counts = collected.aggregate.channel_counts().to_vec();
    let records = collected.aggregate.into_records();

    let archive = match (uploader, options.format.extension()) {
        (Some(uploader), Some(ext)) if config.archive_enabled() => Some(ArchiveTarget {
            uploader,
            filename: archive_filename(
                &config.file_naming,
                &options.naming_context(),
                ext,
                Local::now(),
            ),
        }),
        _ => None,
    };

    let outcome = emit(&records, options.format, archive, out).await?;

    Ok(ExportSummary {
        records: outcome.records,
        channels: channels.len(),
        channel_counts,
        skipped_channels: collected
            .skipped
            .into_iter()
            .map(|(channel, _)| channel.name)
            .collect(),
        archived_key: outcome.archived_key,
    })
}

pub async fn run_fetch(args: FetchArgs) -> Result<()> {
    let config = Config::load(Path::new(&args.config))?;
    let options = RunOptions::resolve(&args, &config)?;
    let credentials = config.slack_credentials(std::env::var("SLACK_TOKEN").ok())?;

    let mut directory = SlackDirectory::new(&credentials)?;
    let uploader = config
        .archive_enabled()
        .then(|| B2Uploader::new(config.storage.b2.clone()));

    let mut stdout = io::stdout();
    let summary = export(
        &mut directory,
        &config,
        &options,
        uploader.as_ref().map(|u| u as &dyn ArchiveUploader),
        &mut stdout,
    )
    .await?;

    for (channel, count) in &summary.channel_counts {
        tracing::debug!("{}: {} messages", channel, count);
    }
    if !summary.skipped_channels.is_empty() {
        tracing::warn!(
            "Skipped {} channel(s): {}",
            summary.skipped_channels.len(),
            summary.skipped_channels.join(", ")
        );
    }

    Ok(())
}

pub fn run_fix_csv(
    input: &str,
    output: Option<String>,
    validate: bool,
    backup: bool,
) -> Result<()> {
    let options = FixOptions {
        output: output.map(Into::into),
        backup,
        validate,
    };

    fix_csv_file(Path::new(input), &options)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppError;
    use crate::directory::ChannelKind;
    use crate::directory::testing::FakeDirectory;
    use crate::history::MessageRecord;
    use crate::output::testing::RecordingUploader;

    fn args(limit: usize, output: &str, channels: &str) -> FetchArgs {
        FetchArgs {
            limit,
            output: output.to_string(),
            channels: channels.to_string(),
            ..Default::default()
        }
    }

    fn b2_config() -> Config {
        let mut config = Config::default();
        config.storage.kind = "b2".to_string();
        config
    }

    fn workspace() -> FakeDirectory {
        FakeDirectory::default()
            .with_channel("C1", "general", ChannelKind::Public)
            .with_channel("G1", "team", ChannelKind::Private)
            .with_messages("C1", 3)
            .with_messages("G1", 2)
    }

    #[test]
    fn test_resolve_uses_config_defaults() {
        let mut config = Config::default();
        config.defaults.limit_per_channel = 50;
        config.defaults.output_format = "json".to_string();
        config.defaults.channels_filter = "public".to_string();

        let options = RunOptions::resolve(&args(0, "", ""), &config).unwrap();

        assert_eq!(options.limit, FetchLimit::Bounded(50));
        assert_eq!(options.format, OutputFormat::Json);
        assert_eq!(options.selection, ChannelSelection::Public);
        assert_eq!(options.channels_filter, "public");
    }

    #[test]
    fn test_resolve_cli_overrides_config() {
        let mut config = Config::default();
        config.defaults.limit_per_channel = 50;
        config.defaults.output_format = "json".to_string();
        config.defaults.channels_filter = "public".to_string();

        let options = RunOptions::resolve(&args(5, "csv", "general,random"), &config).unwrap();

        assert_eq!(options.limit, FetchLimit::Bounded(5));
        assert_eq!(options.format, OutputFormat::Csv);
        assert_eq!(
            options.selection,
            ChannelSelection::Names(vec!["general".to_string(), "random".to_string()])
        );
    }

    #[test]
    fn test_resolve_dates_build_window() {
        let mut a = args(0, "", "");
        a.start = Some("2024-01-01".to_string());
        a.end = Some("2024-01-01".to_string());

        let options = RunOptions::resolve(&a, &Config::default()).unwrap();

        assert_eq!(options.window.since.as_deref(), Some("1704067200.000000"));
        assert_eq!(options.window.until.as_deref(), Some("1704153600.000000"));
        assert_eq!(options.limit, FetchLimit::Unlimited);
        assert_eq!(options.format, OutputFormat::Console);
        assert_eq!(options.selection, ChannelSelection::All);
    }

    #[test]
    fn test_resolve_bad_date_is_fatal() {
        let mut a = args(0, "", "");
        a.end = Some("2024-31-01".to_string());
        assert!(matches!(
            RunOptions::resolve(&a, &Config::default()),
            Err(AppError::InvalidDate(_))
        ));
    }

    #[tokio::test]
    async fn test_export_explicit_names_json() {
        let mut dir = FakeDirectory::default()
            .with_messages("general", 8)
            .with_messages("random", 2);
        let options =
            RunOptions::resolve(&args(5, "json", "general,random"), &Config::default()).unwrap();
        let mut out = Vec::new();

        let summary = export(&mut dir, &Config::default(), &options, None, &mut out)
            .await
            .unwrap();

        assert_eq!(dir.list_call_count(), 0);
        assert_eq!(dir.recorded_history_calls().len(), 2);
        assert_eq!(summary.records, 7);

        let decoded: Vec<MessageRecord> = serde_json::from_slice(&out).unwrap();
        assert_eq!(decoded.len(), 7);
        assert!(decoded[..5].iter().all(|r| r.channel == "general"));
        assert!(decoded[5..].iter().all(|r| r.channel == "random"));
    }

    #[tokio::test]
    async fn test_export_partial_failure_succeeds() {
        let mut dir = workspace().failing_on("G1");
        let options = RunOptions::resolve(&args(0, "json", "all"), &Config::default()).unwrap();
        let mut out = Vec::new();

        let summary = export(&mut dir, &Config::default(), &options, None, &mut out)
            .await
            .unwrap();

        assert_eq!(summary.channels, 2);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.channel_counts, vec![("general".to_string(), 3)]);
        assert_eq!(summary.skipped_channels, vec!["team".to_string()]);

        let decoded: Vec<MessageRecord> = serde_json::from_slice(&out).unwrap();
        assert!(decoded.iter().all(|r| r.channel_id == "C1"));
    }

    #[tokio::test]
    async fn test_export_csv_without_b2_never_uploads() {
        let mut dir = workspace();
        let mut config = Config::default();
        config.storage.kind = "local".to_string();
        let options = RunOptions::resolve(&args(0, "csv", "all"), &config).unwrap();
        let uploader = RecordingUploader::default();
        let mut out = Vec::new();

        let summary = export(&mut dir, &config, &options, Some(&uploader), &mut out)
            .await
            .unwrap();

        assert_eq!(uploader.upload_count(), 0);
        assert!(summary.archived_key.is_none());
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 6);
    }

    #[tokio::test]
    async fn test_export_csv_with_b2_uploads_named_file() {
        let mut dir = workspace();
        let mut config = b2_config();
        config.file_naming.prefix = "slack".to_string();
        config.file_naming.include_channels = true;
        let options = RunOptions::resolve(&args(0, "csv", "public"), &config).unwrap();
        let uploader = RecordingUploader::default();
        let mut out = Vec::new();

        let summary = export(&mut dir, &config, &options, Some(&uploader), &mut out)
            .await
            .unwrap();

        let uploads = uploader.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "slack_public.csv");
        assert_eq!(uploads[0].0, out);
        assert_eq!(summary.archived_key.as_deref(), Some("prefix/slack_public.csv"));
    }

    #[tokio::test]
    async fn test_export_console_with_b2_never_uploads() {
        let mut dir = workspace();
        let config = b2_config();
        let options = RunOptions::resolve(&args(0, "console", "all"), &config).unwrap();
        let uploader = RecordingUploader::default();
        let mut out = Vec::new();

        export(&mut dir, &config, &options, Some(&uploader), &mut out)
            .await
            .unwrap();

        assert_eq!(uploader.upload_count(), 0);
    }

    #[test]
    fn test_run_fix_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "a,b\n\"1\n2\",3\n").unwrap();

        run_fix_csv(path.to_str().unwrap(), None, true, false).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n\"1\\n2\",3\n");
    }
}
