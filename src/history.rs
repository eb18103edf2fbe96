//! Paginated history retrieval and normalization into [`MessageRecord`]s.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::directory::{Channel, ChatDirectory, HistoryRequest, RawMessage};

/// Largest page requested from `conversations.history`.
pub const PAGE_SIZE: usize = 200;

const SECONDS_PER_DAY: i64 = 86_400;

/// Per-channel message cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLimit {
    Bounded(usize),
    Unlimited,
}

impl FetchLimit {
    /// CLI value first, config default second; zero in both means no cap.
    pub fn resolve(cli: usize, default: usize) -> Self {
        match (cli, default) {
            (0, 0) => FetchLimit::Unlimited,
            (0, n) | (n, _) => FetchLimit::Bounded(n),
        }
    }

    fn remaining(self, fetched: usize) -> Option<usize> {
        match self {
            FetchLimit::Bounded(n) => Some(n.saturating_sub(fetched)),
            FetchLimit::Unlimited => None,
        }
    }
}

impl std::fmt::Display for FetchLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchLimit::Bounded(n) => write!(f, "{}", n),
            FetchLimit::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// `oldest`/`latest` bounds in Slack's `seconds.micros` notation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: Option<String>,
    pub until: Option<String>,
}

impl TimeWindow {
    /// Builds the window for an inclusive date range: `until` is midnight
    /// UTC of the day after `end`.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let since = start.map(|d| format_slack_ts(start_of_day(d)));
        let until = end.map(|d| format_slack_ts(start_of_day(d) + SECONDS_PER_DAY));
        Self { since, until }
    }
}

fn start_of_day(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

fn format_slack_ts(seconds: i64) -> String {
    format!("{:.6}", seconds as f64)
}

/// Output-ready representation of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub channel: String,
    pub channel_id: String,
    pub user: String,
    pub text: String,
    pub timestamp: String,
    pub date: DateTime<Utc>,
}

impl MessageRecord {
    pub fn from_raw(channel: &Channel, raw: RawMessage) -> Self {
        let date = parse_slack_ts(&raw.ts);
        Self {
            channel: channel.name.clone(),
            channel_id: channel.id.clone(),
            user: raw.user,
            text: raw.text,
            timestamp: raw.ts,
            date,
        }
    }
}

/// Parses a Slack `ts` to whole seconds. Anything unparseable maps to the
/// epoch so the message is still exported.
pub fn parse_slack_ts(ts: &str) -> DateTime<Utc> {
    ts.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .and_then(|secs| DateTime::from_timestamp(secs.trunc() as i64, 0))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Reads up to `limit` messages of one channel, following cursors.
pub async fn fetch_history<D>(
    directory: &D,
    channel_id: &str,
    limit: FetchLimit,
    window: &TimeWindow,
) -> Result<Vec<RawMessage>>
where
    D: ChatDirectory + ?Sized,
{
    let mut messages = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page_size = match limit.remaining(messages.len()) {
            Some(0) => break,
            Some(remaining) => remaining.min(PAGE_SIZE),
            None => PAGE_SIZE,
        };

        let request = HistoryRequest {
            channel_id: channel_id.to_string(),
            limit: u16::try_from(page_size).unwrap_or(u16::MAX),
            oldest: window.since.clone(),
            latest: window.until.clone(),
            cursor: cursor.take(),
            inclusive: false,
        };

        let page = directory.history_page(&request).await?;
        if page.messages.is_empty() {
            break;
        }

        messages.extend(page.messages.into_iter().take(page_size));

        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    Ok(messages)
}

/// Ordered collection of records for one run.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: Vec<MessageRecord>,
    counts: Vec<(String, usize)>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, channel: &Channel, records: Vec<MessageRecord>) {
        self.counts.push((channel.name.clone(), records.len()));
        self.records.extend(records);
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// `(channel name, message count)` in fetch order
    pub fn channel_counts(&self) -> &[(String, usize)] {
        &self.counts
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MessageRecord> {
        self.records
    }
}

/// Result of walking every selected channel.
#[derive(Debug)]
pub struct CollectedHistory {
    pub aggregate: Aggregator,
    /// Channels whose history could not be read, with the reason
    pub skipped: Vec<(Channel, String)>,
}

/// Fetches each channel in order. A channel that fails is logged and
/// skipped; the remaining channels are still read.
pub async fn collect_history<D>(
    directory: &D,
    channels: &[Channel],
    limit: FetchLimit,
    window: &TimeWindow,
) -> CollectedHistory
where
    D: ChatDirectory + ?Sized,
{
    let mut aggregate = Aggregator::new();
    let mut skipped = Vec::new();
    let total = channels.len();

    for (idx, channel) in channels.iter().enumerate() {
        tracing::info!(
            "Fetching history for channel {}/{}: {} ({})",
            idx + 1,
            total,
            channel.name,
            channel.id
        );

        let messages = match fetch_history(directory, &channel.id, limit, window).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Failed to fetch history for channel {}: {}", channel.name, e);
                skipped.push((channel.clone(), e.to_string()));
                continue;
            }
        };

        tracing::info!("  Found {} messages in {}", messages.len(), channel.name);

        let records = messages
            .into_iter()
            .map(|raw| MessageRecord::from_raw(channel, raw))
            .collect();
        aggregate.append(channel, records);
    }

    tracing::info!("Total messages collected: {}", aggregate.total());

    CollectedHistory { aggregate, skipped }
}
