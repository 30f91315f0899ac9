//! Protocol addresses (JIDs).
//!
//! A JID is the protocol's stable identifier for a user or group, written
//! `user@server`.  Group chats live on the `g.us` server; individual
//! accounts on `s.whatsapp.net`.  The user part of a multi-device account
//! may carry `:device` or `.agent` suffixes that must be stripped before
//! comparing identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server suffix used by group chats.
pub const GROUP_SERVER: &str = "g.us";

/// Server suffix used by individual user accounts.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Server suffix used by broadcast lists (including status updates).
pub const BROADCAST_SERVER: &str = "broadcast";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JidError {
    #[error("invalid JID {0:?}: missing '@' separator")]
    MissingSeparator(String),
    #[error("invalid JID {0:?}: empty user or server part")]
    EmptyPart(String),
}

/// A protocol address, `user@server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Jid {
    pub user: String,
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
        }
    }

    /// Address of an individual user account.
    pub fn user_jid(user: impl Into<String>) -> Self {
        Self::new(user, USER_SERVER)
    }

    /// Address of a group chat.
    pub fn group_jid(user: impl Into<String>) -> Self {
        Self::new(user, GROUP_SERVER)
    }

    /// Whether this address names a group chat.
    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    /// Whether this address names a broadcast list.
    pub fn is_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER
    }

    /// The same address with device and agent suffixes stripped from the
    /// user part, e.g. `1234:17@s.whatsapp.net` -> `1234@s.whatsapp.net`.
    pub fn bare(&self) -> Jid {
        let user = self
            .user
            .split([':', '.'])
            .next()
            .unwrap_or(&self.user)
            .to_string();
        Jid {
            user,
            server: self.server.clone(),
        }
    }

    /// Identity comparison ignoring device/agent suffixes.
    pub fn same_account(&self, other: &Jid) -> bool {
        self.bare() == other.bare()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, server) = s
            .split_once('@')
            .ok_or_else(|| JidError::MissingSeparator(s.to_string()))?;
        if user.is_empty() || server.is_empty() {
            return Err(JidError::EmptyPart(s.to_string()));
        }
        Ok(Jid::new(user, server))
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let jid: Jid = "1234567@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567");
        assert_eq!(jid.server, USER_SERVER);
        assert!(!jid.is_group());
        assert_eq!(jid.to_string(), "1234567@s.whatsapp.net");
    }

    #[test]
    fn group_detection() {
        let jid: Jid = "120363041234567890@g.us".parse().unwrap();
        assert!(jid.is_group());
    }

    #[test]
    fn bare_strips_device_suffix() {
        let jid: Jid = "1234:17@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.bare().to_string(), "1234@s.whatsapp.net");

        let agent: Jid = "1234.2@s.whatsapp.net".parse().unwrap();
        assert!(agent.same_account(&jid));
    }

    #[test]
    fn rejects_malformed() {
        assert!("no-separator".parse::<Jid>().is_err());
        assert!("@g.us".parse::<Jid>().is_err());
    }

    #[test]
    fn serde_as_string() {
        let jid = Jid::user_jid("555");
        let json = serde_json::to_string(&jid).unwrap();
        assert_eq!(json, "\"555@s.whatsapp.net\"");
        let back: Jid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, jid);
    }
}
