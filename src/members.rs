//! Member store: who is subscribed to which channels.
//!
//! All records live in one JSON array that is always read and written as a
//! whole. Every read-modify-write goes through [`MemberStore::update`], which
//! holds the store's writer lock for the full cycle so concurrent commands
//! cannot lose each other's changes.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::slack::UserProfile;
use crate::store::JsonFile;

/// One member's subscription state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemberRecord {
    pub email: String,
    pub display_name: String,
    pub real_name: String,
    /// Normalized channel names, in insertion order, no duplicates.
    pub channels: Vec<String>,
    pub team: String,
    pub project: String,
    pub mailing_list: String,
}

impl MemberRecord {
    pub fn new(email: &str, profile: &UserProfile, channels: Vec<String>) -> Self {
        Self {
            email: email.to_string(),
            display_name: profile.display_name.clone(),
            real_name: profile.real_name.clone(),
            channels,
            ..Default::default()
        }
    }

    /// Append `channel` unless already present. Returns whether it was added.
    pub fn subscribe(&mut self, channel: &str) -> bool {
        if self.channels.iter().any(|c| c == channel) {
            return false;
        }
        self.channels.push(channel.to_string());
        true
    }

    /// Remove `channel` if present. Returns whether it was removed.
    pub fn unsubscribe(&mut self, channel: &str) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| c != channel);
        self.channels.len() != before
    }
}

/// Index of the first record whose email matches, ignoring case.
pub fn position_by_email(records: &[MemberRecord], email: &str) -> Option<usize> {
    let email = email.trim().to_lowercase();
    records
        .iter()
        .position(|r| r.email.trim().to_lowercase() == email)
}

/// First record whose email matches, ignoring case.
pub fn find_by_email<'a>(records: &'a [MemberRecord], email: &str) -> Option<&'a MemberRecord> {
    position_by_email(records, email).map(|i| &records[i])
}

/// Index of the record for `email`, appending one built from `profile` with
/// `initial_channels` when the email is unseen. The flag is true when a
/// record was created.
pub fn register(
    records: &mut Vec<MemberRecord>,
    email: &str,
    profile: &UserProfile,
    initial_channels: Vec<String>,
) -> (usize, bool) {
    if let Some(i) = position_by_email(records, email) {
        return (i, false);
    }
    let record = MemberRecord::new(email, profile, initial_channels);
    info!(
        email = %record.email,
        channels = record.channels.len(),
        "Registered new member"
    );
    records.push(record);
    (records.len() - 1, true)
}

/// File-backed collection of member records with a single writer.
pub struct MemberStore {
    file: JsonFile<Vec<MemberRecord>>,
    writer: Mutex<()>,
}

impl MemberStore {
    pub fn new(file: JsonFile<Vec<MemberRecord>>) -> Self {
        Self {
            file,
            writer: Mutex::new(()),
        }
    }

    /// Read every record. A missing file is an empty store; a corrupt or
    /// unreadable one is an error so it is never silently overwritten.
    pub async fn load_all(&self) -> Result<Vec<MemberRecord>, StoreError> {
        Ok(self.file.load().await?.unwrap_or_default())
    }

    /// Register a member with `initial_channels`, unless one with the same
    /// email already exists. Returns the stored record.
    pub async fn create(
        &self,
        email: &str,
        profile: &UserProfile,
        initial_channels: Vec<String>,
    ) -> Result<MemberRecord, StoreError> {
        self.update(|records| {
            let (i, created) = register(records, email, profile, initial_channels);
            (records[i].clone(), created)
        })
        .await
    }

    /// Load, apply `f`, and persist when `f` reports a change, all while
    /// holding the writer lock.
    pub async fn update<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<MemberRecord>) -> (R, bool),
    {
        let _guard = self.writer.lock().await;
        let mut records = self.load_all().await?;
        let (result, changed) = f(&mut records);
        if changed {
            self.persist(&records).await?;
            debug!(members = records.len(), "Member store persisted");
        }
        Ok(result)
    }

    /// Write the full collection. Callers hold the writer lock.
    async fn persist(&self, records: &Vec<MemberRecord>) -> Result<(), StoreError> {
        self.file.save(records).await
    }
}
