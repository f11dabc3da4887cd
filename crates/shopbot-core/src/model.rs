use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A roster member joined with their balance row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Platform account id (`acct`), the key in every sheet.
    pub id: String,
    pub display_name: String,
    pub balance: i64,
    pub inventory: Inventory,
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Item name → count. A count of zero is never stored: removing the last unit
/// removes the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory(BTreeMap<String, u32>);

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, item: &str) -> u32 {
        self.0.get(item).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total_units(&self) -> u64 {
        self.0.values().map(|v| u64::from(*v)).sum()
    }

    pub fn add(&mut self, item: &str, qty: u32) {
        if qty == 0 {
            return;
        }
        let entry = self.0.entry(item.to_string()).or_insert(0);
        *entry = entry.saturating_add(qty);
    }

    /// Remove `qty` units of `item`. On shortage returns `Err(available)` and
    /// leaves the inventory untouched.
    pub fn remove(&mut self, item: &str, qty: u32) -> std::result::Result<(), u32> {
        let have = self.count(item);
        if have < qty {
            return Err(have);
        }
        if have == qty {
            self.0.remove(item);
        } else {
            self.0.insert(item.to_string(), have - qty);
        }
        Ok(())
    }

    /// Look up an owned item: case-insensitive exact name first, then the
    /// first entry whose name contains `query`.
    pub fn find(&self, query: &str) -> Option<(&str, u32)> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return None;
        }
        self.iter()
            .find(|(name, _)| name.to_lowercase() == q)
            .or_else(|| self.iter().find(|(name, _)| name.to_lowercase().contains(&q)))
    }

    /// Parse an inventory cell. Accepts a JSON object, or a single-quoted
    /// object as written by older tooling. Counts may be numbers or digit
    /// strings; empty names and zero or invalid counts are dropped.
    pub fn parse_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Self::new();
        }
        let parsed = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(trimmed)
            .or_else(|_| serde_json::from_str(&trimmed.replace('\'', "\"")));
        let Ok(map) = parsed else {
            return Self::new();
        };

        let mut inv = Self::new();
        for (name, value) in map {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let count = match &value {
                serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
                _ => None,
            };
            if let Some(count) = count {
                inv.add(name, count);
            }
        }
        inv
    }

    /// Serialize for writing back to the sheet (`{}` when empty).
    pub fn to_cell(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromIterator<(String, u32)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        let mut inv = Self::new();
        for (name, qty) in iter {
            inv.add(&name, qty);
        }
        inv
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub price: Price,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Price {
    Amount(i64),
    /// Explicitly marked as not for sale in the item sheet.
    NotPurchasable,
    /// No usable price in the sheet.
    Unlisted,
}

const NOT_PURCHASABLE_MARKERS: &[&str] = &["구매 불가", "구매불가", "불가"];

impl Price {
    pub fn parse(cell: &str) -> Self {
        let trimmed = cell.trim();
        if NOT_PURCHASABLE_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
            return Self::NotPurchasable;
        }
        // Signed or fractional prices are data errors, not amounts.
        if trimmed.starts_with(['-', '+']) || trimmed.contains('.') {
            return Self::Unlisted;
        }
        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
        match digits.parse::<i64>() {
            Ok(n) if n > 0 => Self::Amount(n),
            _ => Self::Unlisted,
        }
    }

    pub fn unit_price(self) -> Option<i64> {
        match self {
            Self::Amount(n) => Some(n),
            _ => None,
        }
    }
}

/// Parse a balance cell, ignoring separators and unit suffixes
/// (`"1,200갈레온"` → 1200). Unparseable cells read as zero.
pub fn parse_money(cell: &str) -> i64 {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    cleaned.parse().unwrap_or(0)
}

/// `1234567` → `"1,234,567"`.
pub fn format_amount(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPayload {
    /// One unit of the named item.
    Item(String),
    Currency(i64),
}

impl TransferPayload {
    pub fn describe(&self, currency: &str) -> String {
        match self {
            Self::Item(name) => name.clone(),
            Self::Currency(amount) => format!("{}{currency}", format_amount(*amount)),
        }
    }
}

/// Drives one two-sided mutation; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub sender: String,
    pub receiver: String,
    pub payload: TransferPayload,
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One parsed invocation, tied to the account and toot it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    pub origin_user: String,
    pub origin_name: String,
    pub origin_message: String,
}
