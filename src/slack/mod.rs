//! Slack platform integration: Web API client, request signing, and the
//! traits the subscription core depends on.

pub mod api;
pub mod signature;
pub mod traits;

pub use api::SlackApiClient;
pub use traits::{ChannelEntry, ChannelLister, ChannelPage, IdentityResolver, Notifier, UserProfile};
