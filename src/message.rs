//! Message and client identity entities

use serde::{Deserialize, Serialize};

/// An incoming chat message, as handed over by the host platform.
///
/// The platform connection itself is out of scope; whatever adapter feeds
/// the registries is expected to have already resolved the permission sets
/// of the author and of the bot in the message's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub author_permissions: Vec<String>,
    #[serde(default)]
    pub bot_permissions: Vec<String>,
}

impl Message {
    pub fn new(
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            author_id: author_id.into(),
            content: content.into(),
            author_permissions: Vec::new(),
            bot_permissions: Vec::new(),
        }
    }

    pub fn with_author_permissions(mut self, permissions: Vec<String>) -> Self {
        self.author_permissions = permissions;
        self
    }

    pub fn with_bot_permissions(mut self, permissions: Vec<String>) -> Self {
        self.bot_permissions = permissions;
        self
    }
}

/// Identity of the bot account the registries act on behalf of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub owners: Vec<String>,
}

impl ClientInfo {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            owners: Vec::new(),
        }
    }

    pub fn with_owners(mut self, owners: Vec<String>) -> Self {
        self.owners = owners;
        self
    }

    /// The token a user types to address the bot directly.
    pub fn mention(&self) -> String {
        format!("@{}", self.username)
    }

    /// Whether the given user id belongs to a bot owner.
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owners.iter().any(|owner| owner == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_uses_the_username() {
        let client = ClientInfo::new("42", "floe");
        assert_eq!(client.mention(), "@floe");
    }

    #[test]
    fn owner_check() {
        let client = ClientInfo::new("42", "floe").with_owners(vec!["7".into()]);
        assert!(client.is_owner("7"));
        assert!(!client.is_owner("8"));
    }
}
