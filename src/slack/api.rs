//! Slack Web API client.
//!
//! Covers the three methods the bot needs: `conversations.list` for the
//! channel directory, `users.info` for identity, and `chat.postMessage` for
//! leave notices. The base URL can be overridden to point at a fake server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::traits::{ChannelEntry, ChannelLister, ChannelPage, IdentityResolver, Notifier, UserProfile};
use crate::error::SlackError;

/// Base URL for the Slack Web API.
pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Channel kinds included in the directory.
const CHANNEL_TYPES: &str = "public_channel,private_channel";

// ── Response shapes ─────────────────────────────────────────────────────

/// Fields every Web API response carries.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsListBody {
    #[serde(default)]
    channels: Vec<ConversationInfo>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ConversationInfo {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct UsersInfoBody {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: SlackUserProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackUserProfile {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    image_72: Option<String>,
}

impl From<SlackUser> for UserProfile {
    fn from(user: SlackUser) -> Self {
        let p = user.profile;
        UserProfile {
            email: p.email,
            display_name: p.display_name.unwrap_or_default(),
            real_name: p.real_name.or(user.real_name).unwrap_or_default(),
            avatar_url: p.image_72,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────

/// HTTP client for the Slack Web API.
pub struct SlackApiClient {
    http: Client,
    bot_token: SecretString,
    base_url: String,
}

impl SlackApiClient {
    /// Create a client against the public Slack API.
    pub fn new(bot_token: SecretString, timeout: Duration) -> Result<Self, SlackError> {
        Self::with_base_url(bot_token, SLACK_API_BASE.to_string(), timeout)
    }

    /// Create a client pointing at a custom base URL. Every request is
    /// bounded by `timeout`.
    pub fn with_base_url(
        bot_token: SecretString,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, SlackError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SlackError::Client(e.to_string()))?;
        Ok(Self {
            http,
            bot_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.bot_token.expose_secret())
    }

    /// GET a Web API method with query parameters and unwrap the envelope.
    async fn get<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SlackError> {
        let resp = self
            .http
            .get(self.api_url(method))
            .header("Authorization", self.bearer())
            .query(query)
            .send()
            .await
            .map_err(|e| SlackError::Http {
                method: method.to_string(),
                reason: e.to_string(),
            })?;
        unwrap_envelope(method, resp).await
    }

    /// POST a JSON body to a Web API method and unwrap the envelope.
    async fn post_json<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, SlackError> {
        let resp = self
            .http
            .post(self.api_url(method))
            .header("Authorization", self.bearer())
            .header("Content-Type", "application/json; charset=utf-8")
            .json(body)
            .send()
            .await
            .map_err(|e| SlackError::Http {
                method: method.to_string(),
                reason: e.to_string(),
            })?;
        unwrap_envelope(method, resp).await
    }

    /// `conversations.list`: one page of public and private channels.
    pub async fn conversations_list(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ChannelPage, SlackError> {
        let limit = limit.to_string();
        let mut query = vec![
            ("limit", limit.as_str()),
            ("types", CHANNEL_TYPES),
            ("exclude_archived", "true"),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let body: ConversationsListBody = self.get("conversations.list", &query).await?;
        let next_cursor = body
            .response_metadata
            .map(|m| m.next_cursor)
            .filter(|c| !c.is_empty());

        debug!(
            channels = body.channels.len(),
            has_more = next_cursor.is_some(),
            "conversations.list page"
        );

        Ok(ChannelPage {
            entries: body
                .channels
                .into_iter()
                .map(|c| ChannelEntry::new(c.name, c.id))
                .collect(),
            next_cursor,
        })
    }

    /// `users.info`: the user's profile.
    pub async fn users_info(&self, user_id: &str) -> Result<UserProfile, SlackError> {
        let body: UsersInfoBody = self.get("users.info", &[("user", user_id)]).await?;
        Ok(body.user.into())
    }

    /// `chat.postMessage`: post `text` (and optional blocks) to a channel.
    pub async fn chat_post_message(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<serde_json::Value>,
    ) -> Result<(), SlackError> {
        let mut body = serde_json::json!({
            "channel": channel,
            "text": text,
        });
        if let Some(blocks) = blocks {
            body["blocks"] = blocks;
        }

        debug!(channel = %channel, "posting message");
        let _: serde_json::Value = self.post_json("chat.postMessage", &body).await?;
        Ok(())
    }
}

/// Decode a response and turn `ok: false` into `SlackError::Api`.
async fn unwrap_envelope<T: DeserializeOwned>(
    method: &str,
    resp: reqwest::Response,
) -> Result<T, SlackError> {
    let status = resp.status();
    let text = resp.text().await.map_err(|e| SlackError::Http {
        method: method.to_string(),
        reason: e.to_string(),
    })?;
    parse_envelope(method, &text).map_err(|e| match e {
        SlackError::InvalidResponse { method, reason } if !status.is_success() => SlackError::Http {
            method,
            reason: format!("{status}: {reason}"),
        },
        other => other,
    })
}

fn parse_envelope<T: DeserializeOwned>(method: &str, text: &str) -> Result<T, SlackError> {
    let invalid = |e: serde_json::Error| SlackError::InvalidResponse {
        method: method.to_string(),
        reason: e.to_string(),
    };

    let value: serde_json::Value = serde_json::from_str(text).map_err(invalid)?;
    let envelope = Envelope::deserialize(&value).map_err(invalid)?;

    if !envelope.ok {
        return Err(SlackError::Api {
            method: method.to_string(),
            error: envelope.error.unwrap_or_else(|| "unknown error".into()),
        });
    }

    T::deserialize(value).map_err(invalid)
}

#[async_trait]
impl ChannelLister for SlackApiClient {
    async fn list_channels(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ChannelPage, SlackError> {
        self.conversations_list(cursor, limit).await
    }
}

#[async_trait]
impl IdentityResolver for SlackApiClient {
    async fn resolve_user(&self, user_id: &str) -> UserProfile {
        match self.users_info(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "users.info failed, treating as unknown user");
                UserProfile::default()
            }
        }
    }
}

#[async_trait]
impl Notifier for SlackApiClient {
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        blocks: Option<serde_json::Value>,
    ) -> Result<(), SlackError> {
        self.chat_post_message(channel_id, text, blocks).await
    }
}
