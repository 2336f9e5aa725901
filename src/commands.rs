//! Command service: the operations behind the slash commands.
//!
//! Each command starts from a Slack user id: the identity resolver turns it
//! into a profile, the subscription manager does the work, and the result is
//! returned as a [`CommandOutcome`] that renders to the reply text.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::{self, SubscriptionError};
use crate::slack::{ChannelLister, IdentityResolver, Notifier, UserProfile};
use crate::subscriptions::SubscriptionManager;

/// Phrase in a channel message that triggers a leave notice.
pub const LEAVE_TRIGGER: &str = "on leave today";

/// Operation selected by a slash command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Remove,
    List,
    Notify,
}

impl Operation {
    /// Parse `/leave-add` style commands given the configured prefix.
    /// Bare names (`add`, `/add`) are accepted as well.
    pub fn from_command(command: &str, prefix: &str) -> Option<Self> {
        let command = command.trim();
        let name = command
            .strip_prefix(prefix)
            .unwrap_or(command)
            .trim_start_matches('/');
        match name.to_ascii_lowercase().as_str() {
            "add" => Some(Operation::Add),
            "remove" => Some(Operation::Remove),
            "list" => Some(Operation::List),
            "notify" => Some(Operation::Notify),
            _ => None,
        }
    }
}

/// Result of a command, rendered into the slash command reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Added,
    Removed,
    Listed(Vec<String>),
    Notified { delivered: usize, failed: Vec<String> },
    NoChannels,
    Usage,
    InvalidChannels(Vec<String>),
    UnknownUser,
    StorageFailure,
    Help { prefix: String },
}

impl CommandOutcome {
    /// Whether the command did what was asked.
    pub fn is_success(&self) -> bool {
        match self {
            CommandOutcome::Added | CommandOutcome::Removed | CommandOutcome::Listed(_) => true,
            CommandOutcome::Notified { failed, .. } => failed.is_empty(),
            _ => false,
        }
    }

    /// Reply text shown to the user.
    pub fn text(&self) -> String {
        match self {
            CommandOutcome::Added => "Done! Your channels have been added.".to_string(),
            CommandOutcome::Removed => "Done! Your channels have been removed.".to_string(),
            CommandOutcome::Listed(channels) if channels.is_empty() => {
                "You haven't registered any channels yet.".to_string()
            }
            CommandOutcome::Listed(channels) => format!(
                "Your leave notices go to: {}",
                channels
                    .iter()
                    .map(|c| format!("#{c}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            CommandOutcome::Notified { delivered, failed } if failed.is_empty() => {
                format!("Sure! I've posted your leave notice to {delivered} channel(s).")
            }
            CommandOutcome::Notified { delivered, failed } => format!(
                "Posted your leave notice to {delivered} channel(s), but couldn't post to {} of them.",
                failed.len()
            ),
            CommandOutcome::NoChannels => {
                "You haven't registered any channels, so there is nobody to notify. Add some first."
                    .to_string()
            }
            CommandOutcome::Usage => SubscriptionError::Usage.to_string(),
            CommandOutcome::InvalidChannels(names) => {
                SubscriptionError::InvalidChannels(names.clone()).to_string()
            }
            CommandOutcome::UnknownUser => SubscriptionError::UnknownUser.to_string(),
            CommandOutcome::StorageFailure => {
                "Something went wrong saving your channels. Please try again later.".to_string()
            }
            CommandOutcome::Help { prefix } => format!(
                "Usage: {prefix}add <channel, ...> | {prefix}remove <channel, ...> | {prefix}list | {prefix}notify [message]"
            ),
        }
    }

    fn from_error(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Usage => CommandOutcome::Usage,
            SubscriptionError::InvalidChannels(names) => CommandOutcome::InvalidChannels(names),
            SubscriptionError::UnknownUser => CommandOutcome::UnknownUser,
            SubscriptionError::Store(e) => {
                warn!(error = %e, "Member store unavailable");
                CommandOutcome::StorageFailure
            }
        }
    }
}

/// Text of the notice broadcast to a member's channels.
pub fn leave_notice_text(profile: &UserProfile, message: &str) -> String {
    let message = message.trim();
    if message.is_empty() {
        format!("{} is on leave today.", profile.name())
    } else {
        format!("{} is on leave: {message}", profile.name())
    }
}

/// Block posted in reply to a leave message.
pub fn acknowledgement_blocks() -> serde_json::Value {
    serde_json::json!([{
        "type": "section",
        "text": {
            "type": "mrkdwn",
            "text": "Sure! I'll update your leave status....\n\n",
        },
    }])
}

/// Composes identity lookup, subscriptions and delivery.
pub struct CommandService {
    subscriptions: Arc<SubscriptionManager>,
    identity: Arc<dyn IdentityResolver>,
    notifier: Arc<dyn Notifier>,
    lister: Arc<dyn ChannelLister>,
}

impl CommandService {
    pub fn new(
        subscriptions: Arc<SubscriptionManager>,
        identity: Arc<dyn IdentityResolver>,
        notifier: Arc<dyn Notifier>,
        lister: Arc<dyn ChannelLister>,
    ) -> Self {
        Self {
            subscriptions,
            identity,
            notifier,
            lister,
        }
    }

    /// Run the operation selected by `command`.
    pub async fn dispatch(
        &self,
        command: &str,
        prefix: &str,
        user_id: &str,
        text: &str,
    ) -> CommandOutcome {
        match Operation::from_command(command, prefix) {
            Some(Operation::Add) => self.add(user_id, text).await,
            Some(Operation::Remove) => self.remove(user_id, text).await,
            Some(Operation::List) => CommandOutcome::Listed(self.list(user_id).await),
            Some(Operation::Notify) => self.notify(user_id, text).await,
            None => CommandOutcome::Help {
                prefix: prefix.to_string(),
            },
        }
    }

    pub async fn add(&self, user_id: &str, text: &str) -> CommandOutcome {
        let profile = self.identity.resolve_user(user_id).await;
        match self.subscriptions.add_channels(&profile, text).await {
            Ok(()) => CommandOutcome::Added,
            Err(e) => CommandOutcome::from_error(e),
        }
    }

    pub async fn remove(&self, user_id: &str, text: &str) -> CommandOutcome {
        let profile = self.identity.resolve_user(user_id).await;
        match self.subscriptions.remove_channels(&profile, text).await {
            Ok(()) => CommandOutcome::Removed,
            Err(e) => CommandOutcome::from_error(e),
        }
    }

    /// The user's channel names. Storage failures degrade to an empty list.
    pub async fn list(&self, user_id: &str) -> Vec<String> {
        let profile = self.identity.resolve_user(user_id).await;
        self.subscriptions
            .list_channels(&profile)
            .await
            .unwrap_or_else(|e| {
                warn!(user_id = %user_id, error = %e, "Listing channels failed");
                Vec::new()
            })
    }

    /// Post a leave notice to every channel the user subscribed to.
    pub async fn notify(&self, user_id: &str, text: &str) -> CommandOutcome {
        let profile = self.identity.resolve_user(user_id).await;
        let channel_ids = match self.subscriptions.resolve_for_notification(&profile).await {
            Ok(ids) => ids,
            Err(e) => return CommandOutcome::from_error(e),
        };
        if channel_ids.is_empty() {
            return CommandOutcome::NoChannels;
        }

        let notice = leave_notice_text(&profile, text);
        let results = join_all(
            channel_ids
                .iter()
                .map(|id| self.notifier.post_message(id, &notice, None)),
        )
        .await;

        let mut failed = Vec::new();
        for (id, result) in channel_ids.iter().zip(results) {
            if let Err(e) = result {
                warn!(channel = %id, error = %e, "Failed to post leave notice");
                failed.push(id.clone());
            }
        }
        let delivered = channel_ids.len() - failed.len();
        info!(user_id = %user_id, delivered, failed = failed.len(), "Leave notice sent");

        CommandOutcome::Notified { delivered, failed }
    }

    /// Handle a channel message. When it contains [`LEAVE_TRIGGER`], reply in
    /// the channel and broadcast the notice. Returns whether it triggered.
    pub async fn leave_message(&self, user_id: &str, channel_id: &str, text: &str) -> bool {
        if !text.to_lowercase().contains(LEAVE_TRIGGER) {
            return false;
        }

        if let Err(e) = self
            .notifier
            .post_message(
                channel_id,
                "Sure! I'll update your leave status....",
                Some(acknowledgement_blocks()),
            )
            .await
        {
            warn!(channel = %channel_id, error = %e, "Failed to acknowledge leave message");
        }

        let outcome = self.notify(user_id, text).await;
        info!(user_id = %user_id, outcome = ?outcome, "Leave message handled");
        true
    }

    /// Refresh the channel directory now.
    pub async fn refresh_directory(&self) -> error::Result<usize> {
        self.subscriptions
            .directory()
            .refresh(self.lister.as_ref())
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the command and route tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::SlackError;
    use crate::slack::{ChannelEntry, ChannelPage};

    use super::*;

    /// In-memory Slack: fixed channels, fixed users, recorded posts.
    #[derive(Default)]
    pub struct FakeSlack {
        pub channels: Vec<ChannelEntry>,
        pub users: HashMap<String, UserProfile>,
        pub failing_channels: Vec<String>,
        pub posts: Mutex<Vec<(String, String, bool)>>,
    }

    impl FakeSlack {
        pub fn with_user(mut self, user_id: &str, name: &str) -> Self {
            self.users.insert(
                user_id.to_string(),
                UserProfile {
                    email: Some(format!("{name}@example.com")),
                    display_name: name.to_string(),
                    real_name: String::new(),
                    avatar_url: None,
                },
            );
            self
        }

        pub fn with_channel(mut self, name: &str, id: &str) -> Self {
            self.channels.push(ChannelEntry::new(name, id));
            self
        }

        pub fn posts(&self) -> Vec<(String, String, bool)> {
            self.posts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelLister for FakeSlack {
        async fn list_channels(
            &self,
            _cursor: Option<&str>,
            _limit: u32,
        ) -> Result<ChannelPage, SlackError> {
            Ok(ChannelPage {
                entries: self.channels.clone(),
                next_cursor: None,
            })
        }
    }

    #[async_trait]
    impl IdentityResolver for FakeSlack {
        async fn resolve_user(&self, user_id: &str) -> UserProfile {
            self.users.get(user_id).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Notifier for FakeSlack {
        async fn post_message(
            &self,
            channel_id: &str,
            text: &str,
            blocks: Option<serde_json::Value>,
        ) -> Result<(), SlackError> {
            if self.failing_channels.iter().any(|c| c == channel_id) {
                return Err(SlackError::Api {
                    method: "chat.postMessage".into(),
                    error: "not_in_channel".into(),
                });
            }
            self.posts
                .lock()
                .unwrap()
                .push((channel_id.to_string(), text.to_string(), blocks.is_some()));
            Ok(())
        }
    }
}
