//! Seams between the subscription core and the Slack platform.
//!
//! The core only needs three things from the outside world: a paginated
//! channel listing, a user-id → profile lookup, and a way to post a message
//! to a channel. `SlackApiClient` implements all three; tests use fakes.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SlackError;

/// One channel returned by the listing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub name: String,
    pub id: String,
}

impl ChannelEntry {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// One page of a cursor-paginated channel listing.
#[derive(Debug, Clone, Default)]
pub struct ChannelPage {
    pub entries: Vec<ChannelEntry>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Paginated channel listing (public and private channels).
#[async_trait]
pub trait ChannelLister: Send + Sync {
    /// Fetch one page of at most `limit` channels starting at `cursor`.
    async fn list_channels(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ChannelPage, SlackError>;
}

/// A resolved user identity.
///
/// A failed lookup yields `UserProfile::default()`: no email, which the
/// subscription core treats as "unknown user, no channels".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub email: Option<String>,
    pub display_name: String,
    pub real_name: String,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// The email, if present and non-blank.
    pub fn email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Best human-readable name for messages.
    pub fn name(&self) -> &str {
        if !self.display_name.trim().is_empty() {
            &self.display_name
        } else if !self.real_name.trim().is_empty() {
            &self.real_name
        } else {
            "Someone"
        }
    }
}

/// Maps a platform user id to a profile.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_user(&self, user_id: &str) -> UserProfile;
}

/// Posts messages to channels by id.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        blocks: Option<serde_json::Value>,
    ) -> Result<(), SlackError>;
}
