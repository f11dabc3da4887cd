use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use shopbot_core::social::{
    self, AccountInfo, InboundEvent, PostRequest, PostedStatus, SocialClient,
};
use tracing::debug;

use crate::types::{Account, NewStatus, Notification, Status};
use crate::{MastodonError, Result};

/// Longest error body kept in [`MastodonError::Status`].
const BODY_PREVIEW_CHARS: usize = 160;

/// Authenticated client for one Mastodon account.
pub struct MastodonClient {
    http: Client,
    base: Url,
    token: String,
}

impl MastodonClient {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|_| MastodonError::InvalidUrl(base_url.into()))?;
        if base.cannot_be_a_base() {
            return Err(MastodonError::InvalidUrl(base_url.into()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shopbot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            token: token.into(),
        })
    }

    /// `{base}/api/v1/{segments...}`
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| MastodonError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body: String = body
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(BODY_PREVIEW_CHARS)
            .collect();
        Err(MastodonError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        Ok(self.send(req).await?.json().await?)
    }

    pub async fn verify_credentials(&self) -> Result<Account> {
        let url = self.url(&["accounts", "verify_credentials"])?;
        self.json(self.http.get(url)).await
    }

    pub async fn post_status(&self, req: &PostRequest) -> Result<Status> {
        let url = self.url(&["statuses"])?;
        let body = NewStatus {
            status: &req.text,
            visibility: req.visibility,
            in_reply_to_id: req.in_reply_to.as_deref(),
        };
        let status: Status = self.json(self.http.post(url).json(&body)).await?;
        debug!(id = %status.id, "posted status");
        Ok(status)
    }

    /// Newest-first mention notifications, only those newer than `since_id`
    /// when it is given.
    pub async fn mentions(&self, limit: u32, since_id: Option<&str>) -> Result<Vec<Notification>> {
        let url = self.url(&["notifications"])?;
        let mut req = self
            .http
            .get(url)
            .query(&[("limit", limit.to_string())])
            .query(&[("types[]", "mention")]);
        if let Some(id) = since_id {
            req = req.query(&[("since_id", id)]);
        }
        self.json(req).await
    }
}

#[async_trait]
impl SocialClient for MastodonClient {
    async fn post_message(&self, req: &PostRequest) -> social::Result<PostedStatus> {
        Ok(self.post_status(req).await?.into())
    }

    async fn account_info(&self) -> social::Result<AccountInfo> {
        Ok(self.verify_credentials().await?.into())
    }

    async fn poll_notifications(
        &self,
        limit: u32,
        since_id: Option<&str>,
    ) -> social::Result<Vec<InboundEvent>> {
        let notifications = self.mentions(limit, since_id).await?;
        Ok(notifications.into_iter().map(Into::into).collect())
    }
}
