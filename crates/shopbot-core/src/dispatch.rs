//! The polling loop: fetch mentions, run each command once, reply.
//!
//! Processing is sequential. Each poll's new events are handled oldest
//! first, so commands from one account run in the order they were posted.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bot::{Bot, Outcome};
use crate::config::DispatchConfig;
use crate::notify::Notifier;
use crate::retry::RetryPolicy;
use crate::social::{AccountInfo, EventKind, InboundEvent, PostRequest, SocialClient, SocialError};

/// Most accounts mentioned in one reply.
const MAX_MENTIONS: usize = 5;
/// Longest mention prefix, in characters, before the rest is summarized.
const MAX_MENTION_CHARS: usize = 100;

// ---------------------------------------------------------------------------
// SeenSet
// ---------------------------------------------------------------------------

/// Recently handled event ids. When it grows past `capacity` the oldest half
/// is forgotten.
#[derive(Debug)]
pub struct SeenSet {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(2),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id`; `false` if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > self.capacity {
            let drop = self.order.len() / 2;
            for old in self.order.drain(..drop) {
                self.ids.remove(&old);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Reply formatting
// ---------------------------------------------------------------------------

/// `@author @other ...` for a reply. The author always comes first; the bot
/// itself is never mentioned. Accounts beyond the count or length limit are
/// summarized as `외 N명`.
pub fn mention_prefix(author: &str, mentioned: &[String], me: &str) -> String {
    let mut accounts: Vec<&str> = vec![author];
    for acct in mentioned {
        let acct = acct.as_str();
        if acct != me && !accounts.contains(&acct) {
            accounts.push(acct);
        }
    }

    let mut out = format!("@{author}");
    let mut included = 1;
    for acct in &accounts[1..] {
        let next = format!(" @{acct}");
        if included >= MAX_MENTIONS
            || out.chars().count() + next.chars().count() > MAX_MENTION_CHARS
        {
            break;
        }
        out.push_str(&next);
        included += 1;
    }
    let rest = accounts.len() - included;
    if rest > 0 {
        out.push_str(&format!(" 외 {rest}명"));
    }
    out
}

/// Split `text` into parts of at most `limit` characters, breaking on line
/// boundaries where possible.
pub fn split_reply(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String| {
        if !current.is_empty() {
            parts.push(std::mem::take(current));
        }
    };

    for line in text.lines() {
        let mut line = line;
        loop {
            let len = line.chars().count();
            let sep = usize::from(!current.is_empty());
            if current.chars().count() + sep + len <= limit {
                if sep == 1 {
                    current.push('\n');
                }
                current.push_str(line);
                break;
            }
            if !current.is_empty() {
                flush(&mut current);
                continue;
            }
            // A single line longer than the limit.
            let cut = line
                .char_indices()
                .nth(limit)
                .map(|(i, _)| i)
                .unwrap_or(line.len());
            current.push_str(&line[..cut]);
            flush(&mut current);
            line = &line[cut..];
            if line.is_empty() {
                break;
            }
        }
    }
    flush(&mut current);
    if parts.is_empty() {
        parts.push(String::new());
    }
    parts
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub fetched: usize,
    pub handled: usize,
    pub skipped: usize,
    pub reply_failures: usize,
    pub notifications_delivered: usize,
    pub poll_failed: bool,
}

pub struct Dispatcher {
    bot: Arc<Bot>,
    client: Arc<dyn SocialClient>,
    notifier: Option<Arc<Notifier>>,
    config: DispatchConfig,
    post_retry: RetryPolicy,
    me: AccountInfo,
    seen: SeenSet,
    /// Newest notification id seen so far; later polls ask only for newer.
    newest: Option<String>,
}

impl Dispatcher {
    /// Look up the bot's own account and build a dispatcher.
    pub async fn connect(
        bot: Arc<Bot>,
        client: Arc<dyn SocialClient>,
        notifier: Option<Arc<Notifier>>,
        config: DispatchConfig,
        post_retry: RetryPolicy,
    ) -> Result<Self, SocialError> {
        let me = client.account_info().await?;
        info!(acct = %me.acct, "connected");
        let seen = SeenSet::new(config.seen_capacity);
        Ok(Self {
            bot,
            client,
            notifier,
            config,
            post_retry,
            me,
            seen,
            newest: None,
        })
    }

    pub fn me(&self) -> &AccountInfo {
        &self.me
    }

    /// Mark everything currently returned by the notifications endpoint as
    /// handled, so a restart does not replay old commands. Transient poll
    /// errors are retried; the loop must not start if this fails.
    pub async fn skip_backlog(&mut self) -> Result<usize, SocialError> {
        let client = self.client.clone();
        let limit = self.config.notification_limit;
        let since = self.newest.clone();
        let events = self
            .post_retry
            .run("backlog", || client.poll_notifications(limit, since.as_deref()))
            .await?;
        self.advance(&events);
        let n = events.iter().filter(|e| self.seen.insert(&e.id)).count();
        info!(skipped = n, "skipped notification backlog");
        Ok(n)
    }

    /// `events` is newest first.
    fn advance(&mut self, events: &[InboundEvent]) {
        if let Some(first) = events.first() {
            self.newest = Some(first.id.clone());
        }
    }

    /// One poll: handle every new mention, then drain queued notifications.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let polled = self
            .client
            .poll_notifications(self.config.notification_limit, self.newest.as_deref())
            .await;
        match polled {
            Ok(mut events) => {
                report.fetched = events.len();
                self.advance(&events);
                events.reverse();
                for event in events {
                    if !self.seen.insert(&event.id) {
                        continue;
                    }
                    if self.handle_event(&event, &mut report).await {
                        report.handled += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "polling notifications failed");
                report.poll_failed = true;
            }
        }

        if let Some(notifier) = &self.notifier {
            if notifier.pending_count() > 0 {
                report.notifications_delivered = notifier.process_pending().await;
            }
        }
        report
    }

    /// Returns `false` when the event is not a command for this bot.
    async fn handle_event(&self, event: &InboundEvent, report: &mut TickReport) -> bool {
        if event.kind != EventKind::Mention || event.account.acct == self.me.acct {
            return false;
        }
        let Some(status) = &event.status else {
            return false;
        };
        if !self.config.accepted_visibilities.contains(&status.visibility) {
            debug!(event_id = %event.id, visibility = ?status.visibility, "visibility not accepted");
            return false;
        }

        let author = &event.account;
        let reply = self
            .bot
            .handle_text(&status.text, &author.acct, &author.display_name, &status.id)
            .await;
        info!(
            event_id = %event.id,
            user = %author.acct,
            outcome = ?reply.outcome,
            "handled mention"
        );
        if reply.outcome == Outcome::PartialMutation {
            warn!(event_id = %event.id, status_id = %status.id, "reply sent for partially applied command");
        }

        let body = format!("{}{}", self.config.response_prefix, reply.text);
        let mentions = mention_prefix(&author.acct, &status.mentions, &self.me.acct);
        let author_only = format!("@{}", author.acct);

        // Room for the longer prefix plus its separating space.
        let room = self
            .config
            .reply_max_chars
            .saturating_sub(mentions.chars().count() + 1)
            .max(1);
        let mut in_reply_to = Some(status.id.clone());
        for (i, part) in split_reply(&body, room).into_iter().enumerate() {
            let prefix = if i == 0 { &mentions } else { &author_only };
            let req = PostRequest {
                text: format!("{prefix} {part}"),
                visibility: status.visibility,
                in_reply_to: in_reply_to.clone(),
            };
            match self
                .post_retry
                .run("reply", || self.client.post_message(&req))
                .await
            {
                Ok(posted) => in_reply_to = Some(posted.id),
                Err(e) => {
                    warn!(event_id = %event.id, part = i, error = %e, "reply failed");
                    report.reply_failures += 1;
                    break;
                }
            }
        }
        true
    }

    /// Poll every `poll_interval_secs` until `shutdown` resolves, then
    /// deliver any notifications still queued.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = period.as_secs(), "dispatch loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report.handled > 0 || report.poll_failed {
                        debug!(?report, "tick");
                    }
                }
            }
        }

        if let Some(notifier) = &self.notifier {
            notifier.process_pending().await;
            let stats = notifier.stats();
            info!(
                sent = stats.sent,
                succeeded = stats.succeeded,
                failed = stats.failed,
                "notifier drained"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiceConfig, EconomyConfig};
    use crate::economy::testkit::kit;
    use crate::registry::Registry;
    use crate::social::{RecordingClient, Visibility};

    #[test]
    fn seen_set_drops_oldest_half() {
        let mut seen = SeenSet::new(4);
        for id in ["1", "2", "3", "4"] {
            assert!(seen.insert(id));
        }
        assert!(!seen.insert("4"));
        assert!(seen.insert("5"));
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains("1"));
        assert!(!seen.contains("2"));
        assert!(seen.contains("3"));
        assert!(seen.contains("5"));
    }

    #[test]
    fn mentions_skip_bot_and_duplicates() {
        let others = vec!["shop".to_string(), "u2".to_string(), "u1".to_string()];
        assert_eq!(mention_prefix("u1", &others, "shop"), "@u1 @u2");
    }

    #[test]
    fn mentions_are_capped() {
        let others: Vec<String> = (0..8).map(|i| format!("user{i}")).collect();
        let prefix = mention_prefix("author", &others, "shop");
        assert!(prefix.starts_with("@author @user0"));
        assert!(prefix.ends_with("외 4명"), "{prefix}");

        let long: Vec<String> = (0..3).map(|i| format!("{}{i}", "x".repeat(40))).collect();
        let prefix = mention_prefix("a", &long, "shop");
        assert!(prefix.chars().count() <= MAX_MENTION_CHARS + " 외 9명".len());
        assert!(prefix.contains("외 1명"), "{prefix}");
    }

    #[test]
    fn split_reply_breaks_on_lines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_reply(text, 9), vec!["aaaa\nbbbb", "cccc"]);
        assert_eq!(split_reply(text, 100), vec![text]);
        assert_eq!(split_reply("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(split_reply("", 10), vec![""]);
    }

    fn me() -> AccountInfo {
        AccountInfo {
            id: "0".into(),
            acct: "shop".into(),
            username: "shop".into(),
            display_name: "상점".into(),
        }
    }

    async fn dispatcher(config: DispatchConfig) -> (Dispatcher, Arc<RecordingClient>) {
        dispatcher_with(config, RetryPolicy::none()).await
    }

    async fn dispatcher_with(
        config: DispatchConfig,
        retry: RetryPolicy,
    ) -> (Dispatcher, Arc<RecordingClient>) {
        let k = kit(&[("u1", "하나", 500, "{}"), ("u2", "두리", 0, "{}")]);
        let registry = Registry::standard(&EconomyConfig::default()).unwrap();
        let notifier = k.notifier.clone();
        let social = k.social.clone();
        let bot = Arc::new(Bot::new(registry, k.economy, DiceConfig::default()));
        let d = Dispatcher::connect(
            bot,
            social.clone(),
            Some(notifier),
            config,
            retry,
        )
        .await
        .unwrap();
        (d, social)
    }

    #[tokio::test]
    async fn replies_once_per_event() {
        let (mut d, social) = dispatcher(DispatchConfig::default()).await;
        social.push_mention("10", "u1", "@shop [구매 사과 3개]", Visibility::Public);

        let report = d.tick().await;
        assert_eq!(report.handled, 1);
        let report = d.tick().await;
        assert_eq!(report.handled, 0);

        let posts = social.posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].text.starts_with("@u1 사과 3개 구매에 성공했습니다."));
        assert_eq!(posts[0].in_reply_to.as_deref(), Some("status-10"));
        assert_eq!(posts[0].visibility, Visibility::Public);
    }

    #[tokio::test]
    async fn events_run_oldest_first() {
        let (mut d, social) = dispatcher(DispatchConfig::default()).await;
        social.push_mention("1", "u1", "[구매 사과 5개]", Visibility::Public);
        social.push_mention("2", "u1", "[구매 사과 1개]", Visibility::Public);
        d.tick().await;

        let posts = social.posts();
        assert!(posts[0].text.contains("사과 5개 구매에 성공"));
        assert!(posts[0].text.contains("잔여 갈레온은 0갈레온"));
        assert!(posts[1].text.contains("소지금이 부족합니다"), "{}", posts[1].text);
    }

    #[tokio::test]
    async fn unaccepted_visibility_and_non_mentions_are_skipped() {
        let config = DispatchConfig {
            accepted_visibilities: vec![Visibility::Direct],
            ..DispatchConfig::default()
        };
        let (mut d, social) = dispatcher(config).await;
        social.push_mention("1", "u1", "[소지금]", Visibility::Public);
        social.push_event(InboundEvent {
            id: "2".into(),
            kind: EventKind::Other("favourite".into()),
            account: me(),
            status: None,
        });
        let report = d.tick().await;
        assert_eq!((report.handled, report.skipped), (0, 2));
        assert!(social.posts().is_empty());
    }

    #[tokio::test]
    async fn transfer_queues_dm_and_tick_delivers_it() {
        let (mut d, social) = dispatcher(DispatchConfig::default()).await;
        social.push_mention("1", "u1", "[양도/100갈레온/두리]", Visibility::Unlisted);
        let report = d.tick().await;
        assert_eq!(report.notifications_delivered, 1);

        let posts = social.posts();
        assert_eq!(posts.len(), 2);
        assert!(posts[0].text.contains("두리에게 100갈레온을 성공적으로 양도했습니다."));
        assert_eq!(posts[1].visibility, Visibility::Direct);
        assert!(posts[1].text.starts_with("@u2 누군가가"));
    }

    #[tokio::test]
    async fn long_reply_becomes_thread() {
        let config = DispatchConfig {
            reply_max_chars: 60,
            ..DispatchConfig::default()
        };
        let (mut d, social) = dispatcher(config).await;
        social.push_mention("1", "u1", "[도움말]", Visibility::Public);
        d.tick().await;

        let posts = social.posts();
        assert!(posts.len() > 1);
        assert!(posts.iter().all(|p| p.text.chars().count() <= 60));
        assert_eq!(posts[1].in_reply_to.as_deref(), Some("posted-1"));
    }

    #[tokio::test]
    async fn backlog_is_not_replayed() {
        let (mut d, social) = dispatcher(DispatchConfig::default()).await;
        social.push_mention("1", "u1", "[구매 사과 1개]", Visibility::Public);
        assert_eq!(d.skip_backlog().await.unwrap(), 1);
        let report = d.tick().await;
        assert_eq!(report.handled, 0);
        assert!(social.posts().is_empty());
    }

    #[tokio::test]
    async fn failed_reply_does_not_rerun_command() {
        let (mut d, social) = dispatcher(DispatchConfig::default()).await;
        social.push_mention("1", "u1", "[구매 사과 1개]", Visibility::Public);
        social.fail_next_posts(1);
        let report = d.tick().await;
        assert_eq!(report.reply_failures, 1);
        d.tick().await;
        assert!(social.posts().is_empty());
        let user = d.bot.economy().store().find_user("u1").await.unwrap();
        assert_eq!(user.balance, 400);
    }

    #[tokio::test]
    async fn small_seen_set_never_reruns_commands() {
        let config = DispatchConfig {
            seen_capacity: 4,
            ..DispatchConfig::default()
        };
        let (mut d, social) = dispatcher(config).await;
        for i in 1..=5 {
            social.push_mention(&i.to_string(), "u1", "[구매 사과 1개]", Visibility::Public);
        }
        assert_eq!(d.tick().await.handled, 5);
        let report = d.tick().await;
        assert_eq!((report.fetched, report.handled), (0, 0));

        let user = d.bot.economy().store().find_user("u1").await.unwrap();
        assert_eq!(user.balance, 0);
        assert_eq!(social.posts().len(), 5);

        social.push_mention("6", "u1", "[소지금]", Visibility::Public);
        assert_eq!(d.tick().await.handled, 1);
    }

    #[tokio::test]
    async fn backlog_poll_is_retried() {
        let retry = RetryPolicy {
            max_attempts: 2,
            delay_ms: 0,
        };
        let (mut d, social) = dispatcher_with(DispatchConfig::default(), retry).await;
        social.push_mention("1", "u1", "[구매 사과 1개]", Visibility::Public);
        social.fail_next_polls(1);
        assert_eq!(d.skip_backlog().await.unwrap(), 1);
        assert_eq!(d.tick().await.handled, 0);
    }

    #[tokio::test]
    async fn backlog_failure_is_reported() {
        let (mut d, social) = dispatcher(DispatchConfig::default()).await;
        social.fail_next_polls(1);
        assert!(d.skip_backlog().await.is_err());
    }
}
