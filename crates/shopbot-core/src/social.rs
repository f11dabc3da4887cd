//! The social-platform capability the bot consumes, and an in-process fake.
//!
//! `mastodon-client` implements [`SocialClient`] over HTTP; [`RecordingClient`]
//! implements it in memory for `shopbot exec` and for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("social platform unavailable: {0}")]
    Unavailable(String),

    #[error("social platform rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("social platform request timed out")]
    Timeout,
}

impl SocialError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout => true,
            Self::Rejected { status, .. } => *status == 429,
        }
    }
}

pub type Result<T> = std::result::Result<T, SocialError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub text: String,
    pub visibility: Visibility,
    pub in_reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostedStatus {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub id: String,
    /// `user` for local accounts, `user@host` for remote ones.
    pub acct: String,
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Mention,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundStatus {
    pub id: String,
    /// Plain text with markup removed.
    pub text: String,
    pub visibility: Visibility,
    /// `acct` of every account mentioned in the status.
    pub mentions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub id: String,
    pub kind: EventKind,
    pub account: AccountInfo,
    pub status: Option<InboundStatus>,
}

#[async_trait]
pub trait SocialClient: Send + Sync {
    async fn post_message(&self, req: &PostRequest) -> Result<PostedStatus>;

    async fn account_info(&self) -> Result<AccountInfo>;

    /// Most recent notifications, newest first, at most `limit`. With
    /// `since_id`, only notifications newer than that id.
    async fn poll_notifications(
        &self,
        limit: u32,
        since_id: Option<&str>,
    ) -> Result<Vec<InboundEvent>>;
}

// ---------------------------------------------------------------------------
// RecordingClient
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Recorded {
    /// Oldest first; served newest first like the real API.
    events: Vec<InboundEvent>,
    posts: Vec<PostRequest>,
    failures: VecDeque<bool>,
    poll_failures: usize,
    next_id: u64,
}

/// In-memory [`SocialClient`]: serves scripted notifications and records
/// every post.
#[derive(Debug)]
pub struct RecordingClient {
    me: AccountInfo,
    state: Mutex<Recorded>,
}

impl RecordingClient {
    pub fn new(me: AccountInfo) -> Self {
        Self {
            me,
            state: Mutex::new(Recorded::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a notification. It stays visible to every later poll, the way
    /// the real notifications endpoint keeps returning recent items.
    pub fn push_event(&self, event: InboundEvent) {
        self.state().events.push(event);
    }

    /// Convenience for a mention notification from `from` with `text`.
    pub fn push_mention(&self, event_id: &str, from: &str, text: &str, visibility: Visibility) {
        let event = InboundEvent {
            id: event_id.to_string(),
            kind: EventKind::Mention,
            account: AccountInfo {
                id: format!("id-{from}"),
                acct: from.to_string(),
                username: from.split('@').next().unwrap_or(from).to_string(),
                display_name: from.to_string(),
            },
            status: Some(InboundStatus {
                id: format!("status-{event_id}"),
                text: text.to_string(),
                visibility,
                mentions: vec![self.me.acct.clone()],
            }),
        };
        self.push_event(event);
    }

    /// The next `n` posts fail with [`SocialError::Unavailable`].
    pub fn fail_next_posts(&self, n: usize) {
        self.state().failures.extend(std::iter::repeat(true).take(n));
    }

    /// The next `n` polls fail with [`SocialError::Unavailable`].
    pub fn fail_next_polls(&self, n: usize) {
        self.state().poll_failures += n;
    }

    pub fn posts(&self) -> Vec<PostRequest> {
        self.state().posts.clone()
    }
}

#[async_trait]
impl SocialClient for RecordingClient {
    async fn post_message(&self, req: &PostRequest) -> Result<PostedStatus> {
        let mut state = self.state();
        if state.failures.pop_front().unwrap_or(false) {
            return Err(SocialError::Unavailable("injected post failure".into()));
        }
        state.next_id += 1;
        let id = format!("posted-{}", state.next_id);
        state.posts.push(req.clone());
        Ok(PostedStatus {
            url: Some(format!("memory://{id}")),
            id,
        })
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        Ok(self.me.clone())
    }

    async fn poll_notifications(
        &self,
        limit: u32,
        since_id: Option<&str>,
    ) -> Result<Vec<InboundEvent>> {
        let mut state = self.state();
        if state.poll_failures > 0 {
            state.poll_failures -= 1;
            return Err(SocialError::Unavailable("injected poll failure".into()));
        }
        let start = since_id
            .and_then(|id| state.events.iter().position(|e| e.id == id))
            .map_or(0, |i| i + 1);
        Ok(state.events[start..]
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
