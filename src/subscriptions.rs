//! Subscription manager: validates channel names against the directory and
//! applies subscription changes to the member store.
//!
//! Every command that identifies a user with an email registers that user
//! on first contact, including `remove`, `list` and notification lookups.
//! A profile without an email is an unknown user: reads come back empty and
//! changes are refused.

use std::sync::Arc;

use tracing::{debug, info};

use crate::directory::{ChannelDirectory, DirectoryCache, normalize_channel_name};
use crate::error::SubscriptionError;
use crate::members::{MemberStore, register};
use crate::slack::UserProfile;

/// Split comma-separated channel text into normalized, de-duplicated names.
///
/// Blank entries are dropped, so `""`, `" , "` and `"a,,b"` yield nothing,
/// nothing and `["a", "b"]` respectively.
pub fn parse_channel_list(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(normalize_channel_name) {
        // Slack users often type the leading '#'.
        let name = name.trim_start_matches('#').trim().to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Requested names split by whether the directory knows them.
#[derive(Debug, Default, PartialEq, Eq)]
struct Partition {
    valid: Vec<String>,
    invalid: Vec<String>,
}

fn partition(requested: Vec<String>, directory: &ChannelDirectory) -> Partition {
    let (valid, invalid): (Vec<String>, Vec<String>) = requested
        .into_iter()
        .partition(|name| directory.contains(name));
    Partition { valid, invalid }
}

/// Orchestrates the directory cache and member store.
pub struct SubscriptionManager {
    directory: Arc<DirectoryCache>,
    members: Arc<MemberStore>,
}

impl SubscriptionManager {
    pub fn new(directory: Arc<DirectoryCache>, members: Arc<MemberStore>) -> Self {
        Self { directory, members }
    }

    pub fn directory(&self) -> &Arc<DirectoryCache> {
        &self.directory
    }

    /// Subscribe the member to every valid channel in `raw_text`.
    ///
    /// Valid names are applied even when some names are invalid; the invalid
    /// ones are then reported as an error.
    pub async fn add_channels(
        &self,
        profile: &UserProfile,
        raw_text: &str,
    ) -> Result<(), SubscriptionError> {
        let requested = parse_channel_list(raw_text);
        if requested.is_empty() {
            return Err(SubscriptionError::Usage);
        }
        let email = profile.email().ok_or(SubscriptionError::UnknownUser)?;

        let Partition { valid, invalid } = partition(requested, &*self.directory.snapshot().await);

        let added = self
            .members
            .update(|records| {
                let (i, created) = register(records, email, profile, Vec::new());
                let record = &mut records[i];
                let added: Vec<String> = valid
                    .iter()
                    .filter(|name| record.subscribe(name))
                    .cloned()
                    .collect();
                let changed = created || !added.is_empty();
                (added, changed)
            })
            .await?;

        if !added.is_empty() {
            info!(email = %email, channels = ?added, "Channels added");
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            debug!(email = %email, invalid = ?invalid, "Unknown channels requested");
            Err(SubscriptionError::InvalidChannels(invalid))
        }
    }

    /// Unsubscribe the member from every valid channel in `raw_text`.
    pub async fn remove_channels(
        &self,
        profile: &UserProfile,
        raw_text: &str,
    ) -> Result<(), SubscriptionError> {
        let requested = parse_channel_list(raw_text);
        if requested.is_empty() {
            return Err(SubscriptionError::Usage);
        }
        let email = profile.email().ok_or(SubscriptionError::UnknownUser)?;

        let Partition { valid, invalid } = partition(requested, &*self.directory.snapshot().await);

        let removed = self
            .members
            .update(|records| {
                let (i, created) = register(records, email, profile, Vec::new());
                let record = &mut records[i];
                let removed: Vec<String> = valid
                    .iter()
                    .filter(|name| record.unsubscribe(name))
                    .cloned()
                    .collect();
                let changed = created || !removed.is_empty();
                (removed, changed)
            })
            .await?;

        if !removed.is_empty() {
            info!(email = %email, channels = ?removed, "Channels removed");
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(SubscriptionError::InvalidChannels(invalid))
        }
    }

    /// The member's stored channel names, unresolved.
    pub async fn list_channels(
        &self,
        profile: &UserProfile,
    ) -> Result<Vec<String>, SubscriptionError> {
        Ok(self.member_channels(profile).await?)
    }

    /// The member's channels resolved to ids. Names the directory no longer
    /// knows are dropped.
    pub async fn resolve_for_notification(
        &self,
        profile: &UserProfile,
    ) -> Result<Vec<String>, SubscriptionError> {
        let names = self.member_channels(profile).await?;
        let directory = self.directory.snapshot().await;

        Ok(names
            .iter()
            .filter_map(|name| {
                let id = directory.resolve(name);
                if id.is_none() {
                    debug!(channel = %name, "Subscribed channel missing from directory");
                }
                id.map(str::to_string)
            })
            .collect())
    }

    /// Stored channels for the profile, registering an unseen email.
    async fn member_channels(
        &self,
        profile: &UserProfile,
    ) -> Result<Vec<String>, crate::error::StoreError> {
        let Some(email) = profile.email() else {
            return Ok(Vec::new());
        };

        self.members
            .update(|records| {
                let (i, created) = register(records, email, profile, Vec::new());
                (records[i].channels.clone(), created)
            })
            .await
    }
}
