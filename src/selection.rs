use crate::Result;
use crate::directory::{Channel, ChannelKind, ChatDirectory};

/// Which channels a run should read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSelection {
    All,
    Public,
    Private,
    Names(Vec<String>),
}

impl ChannelSelection {
    /// Parses a `--channels` / `channels_filter` value. An empty value
    /// selects every channel kind.
    pub fn parse(filter: &str) -> Self {
        match filter.trim() {
            "" | "all" => ChannelSelection::All,
            "public" => ChannelSelection::Public,
            "private" => ChannelSelection::Private,
            names => ChannelSelection::Names(
                names
                    .split(',')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }

    /// Kinds to ask the directory for, or `None` for explicit names.
    pub fn kinds(&self) -> Option<&'static [ChannelKind]> {
        match self {
            ChannelSelection::All => Some(&ChannelKind::ALL),
            ChannelSelection::Public => Some(&[ChannelKind::Public]),
            ChannelSelection::Private => Some(&[ChannelKind::Private]),
            ChannelSelection::Names(_) => None,
        }
    }
}

/// Turns a selection into concrete channels.
///
/// Explicit names skip the directory entirely: every name doubles as the
/// channel id and is not checked for existence, so a wrong name only shows
/// up later as a failed history fetch.
pub async fn resolve_channels<D>(
    selection: &ChannelSelection,
    directory: &D,
) -> Result<Vec<Channel>>
where
    D: ChatDirectory + ?Sized,
{
    if let ChannelSelection::Names(names) = selection {
        return Ok(names
            .iter()
            .map(|name| Channel {
                id: name.clone(),
                name: name.clone(),
                kind: ChannelKind::Public,
            })
            .collect());
    }

    let kinds = selection.kinds().unwrap_or(&ChannelKind::ALL);
    tracing::info!("Fetching channels of types: {:?}", kinds);
    directory.list_channels(kinds).await
}
