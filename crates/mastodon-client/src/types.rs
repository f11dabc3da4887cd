//! Wire types for the parts of the Mastodon REST API the bot touches.
//!
//! Only the fields the bot reads are declared; serde ignores the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopbot_core::social::{
    AccountInfo, EventKind, InboundEvent, InboundStatus, PostedStatus, Visibility,
};

use crate::html;

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
}

impl From<Account> for AccountInfo {
    fn from(a: Account) -> Self {
        let display_name = if a.display_name.trim().is_empty() {
            a.username.clone()
        } else {
            a.display_name
        };
        AccountInfo {
            id: a.id,
            acct: a.acct,
            username: a.username,
            display_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mention {
    pub id: String,
    pub acct: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    /// HTML.
    #[serde(default)]
    pub content: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

impl From<Status> for InboundStatus {
    fn from(s: Status) -> Self {
        InboundStatus {
            text: html::to_plain_text(&s.content),
            id: s.id,
            visibility: s.visibility,
            mentions: s.mentions.into_iter().map(|m| m.acct).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Mention,
    Status,
    Reblog,
    Follow,
    FollowRequest,
    Favourite,
    Poll,
    Update,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub created_at: Option<DateTime<Utc>>,
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

impl From<Notification> for InboundEvent {
    fn from(n: Notification) -> Self {
        let kind = match n.kind {
            NotificationType::Mention => EventKind::Mention,
            other => EventKind::Other(format!("{other:?}").to_lowercase()),
        };
        InboundEvent {
            id: n.id,
            kind,
            account: n.account.into(),
            status: n.status.map(Into::into),
        }
    }
}

/// Body of `POST /api/v1/statuses`.
#[derive(Debug, Serialize)]
pub struct NewStatus<'a> {
    pub status: &'a str,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<&'a str>,
}

impl From<Status> for PostedStatus {
    fn from(s: Status) -> Self {
        PostedStatus { id: s.id, url: s.url }
    }
}
