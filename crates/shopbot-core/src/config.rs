use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::social::Visibility;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default config file name, looked up from the working directory upward.
pub const CONFIG_FILE: &str = "shopbot.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// MastodonConfig / SheetsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MastodonConfig {
    #[serde(default)]
    pub base_url: String,
    /// Name of the environment variable that holds the access token.
    #[serde(default = "default_mastodon_token_env")]
    pub access_token_env: String,
}

fn default_mastodon_token_env() -> String {
    "MASTODON_ACCESS_TOKEN".to_string()
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token_env: default_mastodon_token_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetsConfig {
    #[serde(default)]
    pub spreadsheet_id: String,
    /// Name of the environment variable that holds the OAuth bearer token.
    #[serde(default = "default_sheets_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_sheets_api")]
    pub api_base_url: String,
}

fn default_sheets_token_env() -> String {
    "SHEETS_ACCESS_TOKEN".to_string()
}

fn default_sheets_api() -> String {
    "https://sheets.googleapis.com".to_string()
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            access_token_env: default_sheets_token_env(),
            api_base_url: default_sheets_api(),
        }
    }
}

// ---------------------------------------------------------------------------
// SheetLayout
// ---------------------------------------------------------------------------

/// Sheet and column names in the workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    #[serde(default = "default_roster_sheet")]
    pub roster_sheet: String,
    #[serde(default = "default_ledger_sheet")]
    pub ledger_sheet: String,
    #[serde(default = "default_items_sheet")]
    pub items_sheet: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_name_column")]
    pub name_column: String,
    #[serde(default = "default_balance_column")]
    pub balance_column: String,
    #[serde(default = "default_inventory_column")]
    pub inventory_column: String,
    #[serde(default = "default_item_name_column")]
    pub item_name_column: String,
    #[serde(default = "default_price_column")]
    pub price_column: String,
    #[serde(default = "default_description_column")]
    pub description_column: String,
}

fn default_roster_sheet() -> String {
    "명단".to_string()
}
fn default_ledger_sheet() -> String {
    "관리".to_string()
}
fn default_items_sheet() -> String {
    "상점".to_string()
}
fn default_id_column() -> String {
    "아이디".to_string()
}
fn default_name_column() -> String {
    "이름".to_string()
}
fn default_balance_column() -> String {
    "소지금".to_string()
}
fn default_inventory_column() -> String {
    "소지품".to_string()
}
fn default_item_name_column() -> String {
    "아이템명".to_string()
}
fn default_price_column() -> String {
    "가격".to_string()
}
fn default_description_column() -> String {
    "설명".to_string()
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            roster_sheet: default_roster_sheet(),
            ledger_sheet: default_ledger_sheet(),
            items_sheet: default_items_sheet(),
            id_column: default_id_column(),
            name_column: default_name_column(),
            balance_column: default_balance_column(),
            inventory_column: default_inventory_column(),
            item_name_column: default_item_name_column(),
            price_column: default_price_column(),
            description_column: default_description_column(),
        }
    }
}

// ---------------------------------------------------------------------------
// EconomyConfig / DiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Currency unit, also accepted as the suffix of transfer amounts.
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_min_quantity")]
    pub min_quantity: i64,
    #[serde(default = "default_max_quantity")]
    pub max_quantity: i64,
    #[serde(default = "default_true")]
    pub transfers_enabled: bool,
}

fn default_currency() -> String {
    "갈레온".to_string()
}
fn default_min_quantity() -> i64 {
    1
}
fn default_max_quantity() -> i64 {
    100
}
fn default_true() -> bool {
    true
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            min_quantity: default_min_quantity(),
            max_quantity: default_max_quantity(),
            transfers_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceConfig {
    #[serde(default = "default_max_count")]
    pub max_count: u32,
    #[serde(default = "default_max_sides")]
    pub max_sides: u32,
}

fn default_max_count() -> u32 {
    20
}
fn default_max_sides() -> u32 {
    1000
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
            max_sides: default_max_sides(),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig / NotifyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_notification_limit")]
    pub notification_limit: u32,
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,
    #[serde(default = "default_reply_max_chars")]
    pub reply_max_chars: usize,
    /// Prepended to every reply body.
    #[serde(default)]
    pub response_prefix: String,
    #[serde(default = "default_accepted_visibilities")]
    pub accepted_visibilities: Vec<Visibility>,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_notification_limit() -> u32 {
    20
}
fn default_seen_capacity() -> usize {
    1000
}
fn default_reply_max_chars() -> usize {
    490
}
fn default_accepted_visibilities() -> Vec<Visibility> {
    vec![
        Visibility::Public,
        Visibility::Unlisted,
        Visibility::Private,
        Visibility::Direct,
    ]
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            notification_limit: default_notification_limit(),
            seen_capacity: default_seen_capacity(),
            reply_max_chars: default_reply_max_chars(),
            response_prefix: String::new(),
            accepted_visibilities: default_accepted_visibilities(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_notify_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_notify_attempts() -> u32 {
    3
}
fn default_notify_delay_ms() -> u64 {
    1000
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_notify_attempts(),
            retry_delay_ms: default_notify_delay_ms(),
        }
    }
}

impl NotifyConfig {
    /// Policy for outbound posts: DMs and replies.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay_ms: self.retry_delay_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// BotConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub layout: SheetLayout,
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub dice: DiceConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Retry policy for store reads. Writes are never retried.
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_items_cache_ttl")]
    pub items_cache_ttl_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}
fn default_items_cache_ttl() -> u64 {
    300
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            mastodon: MastodonConfig::default(),
            sheets: SheetsConfig::default(),
            layout: SheetLayout::default(),
            economy: EconomyConfig::default(),
            dice: DiceConfig::default(),
            dispatch: DispatchConfig::default(),
            notify: NotifyConfig::default(),
            retry: RetryPolicy::default(),
            request_timeout_secs: default_request_timeout(),
            items_cache_ttl_secs: default_items_cache_ttl(),
        }
    }
}

impl BotConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: BotConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.economy.currency.trim().is_empty() {
            push(WarnLevel::Error, "economy.currency is empty".to_string());
        }
        if self.economy.min_quantity < 1 || self.economy.min_quantity > self.economy.max_quantity {
            push(
                WarnLevel::Error,
                format!(
                    "economy quantity range {}..={} is invalid",
                    self.economy.min_quantity, self.economy.max_quantity
                ),
            );
        }
        if self.economy.max_quantity > 1000 {
            push(
                WarnLevel::Warning,
                format!(
                    "economy.max_quantity={} (>1000 is unusual)",
                    self.economy.max_quantity
                ),
            );
        }

        if self.dice.max_count == 0 || self.dice.max_sides < 2 {
            push(
                WarnLevel::Error,
                format!(
                    "dice limits max_count={} max_sides={} allow no valid roll",
                    self.dice.max_count, self.dice.max_sides
                ),
            );
        }

        if self.dispatch.poll_interval_secs == 0 {
            push(WarnLevel::Error, "dispatch.poll_interval_secs must be > 0".to_string());
        }
        // The set drops half its ids when full; it must still cover a full poll.
        let min_seen = (self.dispatch.notification_limit as usize).saturating_mul(2).max(2);
        if self.dispatch.seen_capacity < min_seen {
            push(
                WarnLevel::Error,
                format!(
                    "dispatch.seen_capacity={} (must be >= {min_seen}, twice notification_limit)",
                    self.dispatch.seen_capacity
                ),
            );
        }
        if self.dispatch.reply_max_chars < 100 {
            push(
                WarnLevel::Warning,
                format!(
                    "dispatch.reply_max_chars={} leaves little room after mentions",
                    self.dispatch.reply_max_chars
                ),
            );
        }
        if self.dispatch.accepted_visibilities.is_empty() {
            push(
                WarnLevel::Warning,
                "dispatch.accepted_visibilities is empty; no mention will be handled".to_string(),
            );
        }

        if self.notify.max_attempts == 0 {
            push(WarnLevel::Error, "notify.max_attempts must be >= 1".to_string());
        }
        if self.retry.max_attempts > 10 {
            push(
                WarnLevel::Warning,
                format!("retry.max_attempts={} (>10 is unusual)", self.retry.max_attempts),
            );
        }

        let layout = &self.layout;
        let sheets = [
            &layout.roster_sheet,
            &layout.ledger_sheet,
            &layout.items_sheet,
        ];
        let unique: HashSet<&String> = sheets.iter().copied().collect();
        if unique.len() != sheets.len() {
            push(
                WarnLevel::Error,
                "layout: roster, ledger and items sheets must be distinct".to_string(),
            );
        }

        warnings
    }

    pub fn has_errors(&self) -> bool {
        self.validate().iter().any(|w| w.level == WarnLevel::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: BotConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, BotConfig::default());
        assert_eq!(cfg.request_timeout_secs, 30);
        assert_eq!(cfg.dispatch.seen_capacity, 1000);
        assert_eq!(cfg.layout.ledger_sheet, "관리");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn example_file_parses_to_defaults() {
        let cfg: BotConfig =
            serde_yaml::from_str(include_str!("../../../shopbot.example.yaml")).unwrap();
        assert!(!cfg.has_errors());
        assert_eq!(cfg.layout, SheetLayout::default());
        assert_eq!(cfg.dispatch, DispatchConfig::default());
        assert_eq!(cfg.mastodon.base_url, "https://mastodon.example");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let yaml = r#"
economy:
  currency: 포인트
dispatch:
  accepted_visibilities: [public, direct]
"#;
        let cfg: BotConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.economy.currency, "포인트");
        assert_eq!(cfg.economy.max_quantity, 100);
        assert_eq!(
            cfg.dispatch.accepted_visibilities,
            vec![Visibility::Public, Visibility::Direct]
        );
        assert_eq!(cfg.dispatch.poll_interval_secs, 5);
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = BotConfig::default();
        cfg.economy.currency = " ".into();
        cfg.dispatch.poll_interval_secs = 0;
        cfg.dispatch.seen_capacity = 1;
        cfg.layout.items_sheet = cfg.layout.ledger_sheet.clone();
        cfg.retry.max_attempts = 11;

        let warnings = cfg.validate();
        let errors = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .count();
        assert_eq!(errors, 4);
        assert!(warnings.iter().any(|w| w.message.contains("retry.max_attempts")));
        assert!(cfg.has_errors());
    }

    #[test]
    fn seen_capacity_must_cover_two_polls() {
        let mut cfg = BotConfig::default();
        cfg.dispatch.notification_limit = 20;
        cfg.dispatch.seen_capacity = 4;
        assert!(cfg.has_errors());
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("dispatch.seen_capacity=4")));

        cfg.dispatch.seen_capacity = 40;
        assert!(!cfg.has_errors());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut cfg = BotConfig::default();
        cfg.sheets.spreadsheet_id = "abc123".into();
        cfg.save(&path).unwrap();
        assert_eq!(BotConfig::load(&path).unwrap(), cfg);
    }
}
