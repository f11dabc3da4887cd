use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::NotifyConfig;
use crate::retry::RetryPolicy;
use crate::social::{PostRequest, SocialClient, Visibility};

/// Direct-message delivery to accounts other than the command's author.
///
/// A failed notification never undoes the mutation that triggered it; it is
/// logged and counted.
pub struct Notifier {
    client: Arc<dyn SocialClient>,
    policy: RetryPolicy,
    queue: Mutex<VecDeque<Pending>>,
    sent: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone)]
struct Pending {
    target: String,
    message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifyStats {
    pub sent: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub pending: usize,
}

impl Notifier {
    pub fn new(client: Arc<dyn SocialClient>, config: &NotifyConfig) -> Self {
        Self {
            client,
            policy: config.retry_policy(),
            queue: Mutex::new(VecDeque::new()),
            sent: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Pending>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request(target: &str, message: &str) -> PostRequest {
        PostRequest {
            text: format!("@{target} {message}"),
            visibility: Visibility::Direct,
            in_reply_to: None,
        }
    }

    /// Send now, one attempt.
    pub async fn send(&self, target: &str, message: &str) -> bool {
        self.sent.fetch_add(1, Ordering::Relaxed);
        match self.client.post_message(&Self::request(target, message)).await {
            Ok(_) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(target_user = target, error = %e, "notification failed");
                false
            }
        }
    }

    /// Queue for delivery on the next [`Notifier::process_pending`].
    pub fn enqueue(&self, target: &str, message: &str) {
        self.queue().push_back(Pending {
            target: target.to_string(),
            message: message.to_string(),
        });
    }

    pub fn pending_count(&self) -> usize {
        self.queue().len()
    }

    /// Deliver everything queued so far, each with bounded retry. Returns
    /// the number delivered.
    pub async fn process_pending(&self) -> usize {
        let batch: Vec<Pending> = self.queue().drain(..).collect();
        let mut delivered = 0;
        for item in batch {
            self.sent.fetch_add(1, Ordering::Relaxed);
            let req = Self::request(&item.target, &item.message);
            let mut attempts = 0u64;
            let result = self
                .policy
                .run("notify", || {
                    attempts += 1;
                    self.client.post_message(&req)
                })
                .await;
            self.retries
                .fetch_add(attempts.saturating_sub(1), Ordering::Relaxed);
            match result {
                Ok(_) => {
                    self.succeeded.fetch_add(1, Ordering::Relaxed);
                    delivered += 1;
                    info!(target_user = %item.target, "notification delivered");
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(target_user = %item.target, attempts, error = %e, "notification dropped");
                }
            }
        }
        delivered
    }

    pub fn stats(&self) -> NotifyStats {
        NotifyStats {
            sent: self.sent.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            pending: self.pending_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::{AccountInfo, RecordingClient};

    fn client() -> Arc<RecordingClient> {
        Arc::new(RecordingClient::new(AccountInfo {
            id: "1".into(),
            acct: "shop".into(),
            username: "shop".into(),
            display_name: "상점".into(),
        }))
    }

    fn config(max_attempts: u32) -> NotifyConfig {
        NotifyConfig {
            max_attempts,
            retry_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn queued_messages_are_direct_mentions() {
        let c = client();
        let n = Notifier::new(c.clone(), &config(3));
        n.enqueue("u2", "누군가가 당신에게 사과를 양도했습니다.");
        assert_eq!(n.pending_count(), 1);
        assert_eq!(n.process_pending().await, 1);
        assert_eq!(n.pending_count(), 0);

        let posts = c.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].visibility, Visibility::Direct);
        assert!(posts[0].text.starts_with("@u2 "));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_and_counted() {
        let c = client();
        c.fail_next_posts(2);
        let n = Notifier::new(c.clone(), &config(3));
        n.enqueue("u2", "hi");
        assert_eq!(n.process_pending().await, 1);
        let stats = n.stats();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn exhausted_attempts_count_as_failed() {
        let c = client();
        c.fail_next_posts(5);
        let n = Notifier::new(c.clone(), &config(2));
        n.enqueue("u2", "hi");
        assert_eq!(n.process_pending().await, 0);
        let stats = n.stats();
        assert_eq!((stats.sent, stats.failed, stats.retries), (1, 1, 1));
        assert!(c.posts().is_empty());
    }

    #[tokio::test]
    async fn immediate_send_is_single_attempt() {
        let c = client();
        c.fail_next_posts(1);
        let n = Notifier::new(c.clone(), &config(3));
        assert!(!n.send("u2", "hi").await);
        assert!(n.send("u2", "hi").await);
        assert_eq!(n.stats().failed, 1);
    }
}
