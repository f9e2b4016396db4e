#![forbid(unsafe_code)]

//! One collection pass over the configured channels.
//!
//! Each channel is fetched and written on its own; a failure is recorded as
//! that channel's outcome and the pass moves on. There is no retry: the next
//! run picks up whatever was missed, and the URL constraint keeps it
//! idempotent.

use std::fmt;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::ChannelConfig;
use crate::store::{ContentStore, InsertOutcome};
use crate::youtube::{VideoPlatform, fetch_channel_videos};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelCounts {
    pub new: usize,
    pub duplicates: usize,
}

#[derive(Debug)]
pub enum ChannelOutcome {
    Succeeded {
        channel: ChannelConfig,
        counts: ChannelCounts,
    },
    Failed {
        channel: ChannelConfig,
        error: anyhow::Error,
    },
}

impl ChannelOutcome {
    pub fn channel(&self) -> &ChannelConfig {
        match self {
            ChannelOutcome::Succeeded { channel, .. } | ChannelOutcome::Failed { channel, .. } => {
                channel
            }
        }
    }

    pub fn counts(&self) -> Option<ChannelCounts> {
        match self {
            ChannelOutcome::Succeeded { counts, .. } => Some(*counts),
            ChannelOutcome::Failed { .. } => None,
        }
    }
}

impl fmt::Display for ChannelOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOutcome::Succeeded { channel, counts } => write!(
                f,
                "{}: added {} new videos, skipped {} duplicates",
                channel.name, counts.new, counts.duplicates
            ),
            ChannelOutcome::Failed { channel, error } => {
                write!(f, "{}: failed: {error:#}", channel.name)
            }
        }
    }
}

/// Per-channel outcomes in processing order. Totals only count channels that
/// succeeded.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<ChannelOutcome>,
}

impl RunSummary {
    pub fn total_new(&self) -> usize {
        self.succeeded_counts().map(|counts| counts.new).sum()
    }

    pub fn total_duplicates(&self) -> usize {
        self.succeeded_counts().map(|counts| counts.duplicates).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ChannelOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ChannelOutcome::Failed { .. }))
    }

    fn succeeded_counts(&self) -> impl Iterator<Item = ChannelCounts> + '_ {
        self.outcomes.iter().filter_map(ChannelOutcome::counts)
    }
}

/// Fetches one channel and writes every returned item.
pub async fn collect_channel<P: VideoPlatform + ?Sized>(
    api: &P,
    store: &ContentStore,
    channel: &ChannelConfig,
    max_results: u32,
) -> Result<ChannelCounts> {
    let items = fetch_channel_videos(api, channel, max_results)?;
    let mut counts = ChannelCounts::default();
    for item in &items {
        match store.insert_content(item).await? {
            InsertOutcome::Inserted => counts.new += 1,
            InsertOutcome::Duplicate => counts.duplicates += 1,
        }
    }
    Ok(counts)
}

/// Processes `channels` strictly in order, isolating failures per channel.
pub async fn collect_channels<P: VideoPlatform + ?Sized>(
    api: &P,
    store: &ContentStore,
    channels: &[ChannelConfig],
    max_results: u32,
) -> RunSummary {
    let mut summary = RunSummary::default();
    for channel in channels {
        info!(channel = %channel.name, id = %channel.id, "processing channel");
        let outcome = match collect_channel(api, store, channel, max_results).await {
            Ok(counts) => {
                info!(
                    channel = %channel.name,
                    new = counts.new,
                    duplicates = counts.duplicates,
                    "channel done"
                );
                ChannelOutcome::Succeeded {
                    channel: channel.clone(),
                    counts,
                }
            }
            Err(error) => {
                warn!(channel = %channel.name, error = %format!("{error:#}"), "channel failed");
                ChannelOutcome::Failed {
                    channel: channel.clone(),
                    error,
                }
            }
        };
        summary.outcomes.push(outcome);
    }
    summary
}
