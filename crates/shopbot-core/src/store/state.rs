use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{RowStore, Table};
use crate::config::SheetLayout;
use crate::error::{BotError, Result};
use crate::fuzzy;
use crate::model::{parse_money, Inventory, Item, Price, User};
use crate::retry::RetryPolicy;

/// Fields of a ledger row to overwrite. `None` leaves the cell alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub balance: Option<i64>,
    pub inventory: Option<Inventory>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.balance.is_none() && self.inventory.is_none()
    }
}

type ItemCache = Option<(Instant, Arc<Vec<Item>>)>;

/// Typed access to bot state over a [`RowStore`].
///
/// Reads go through the retry policy. Writes are issued exactly once: a
/// write whose outcome is unknown is reported, never repeated.
pub struct StateStore {
    rows: Arc<dyn RowStore>,
    layout: SheetLayout,
    retry: RetryPolicy,
    items_ttl: Duration,
    items: Mutex<ItemCache>,
}

impl StateStore {
    pub fn new(
        rows: Arc<dyn RowStore>,
        layout: SheetLayout,
        retry: RetryPolicy,
        items_ttl: Duration,
    ) -> Self {
        Self {
            rows,
            layout,
            retry,
            items_ttl,
            items: Mutex::new(None),
        }
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    async fn read(&self, sheet: &str) -> Result<Table> {
        let table = self
            .retry
            .run(&format!("read {sheet}"), || self.rows.read_all_rows(sheet))
            .await?;
        Ok(table)
    }

    /// Check that every sheet exists and carries the configured columns.
    pub async fn verify_layout(&self) -> Result<()> {
        let l = &self.layout;
        let expected = [
            (&l.roster_sheet, vec![&l.id_column, &l.name_column]),
            (
                &l.ledger_sheet,
                vec![&l.id_column, &l.balance_column, &l.inventory_column],
            ),
            (
                &l.items_sheet,
                vec![&l.item_name_column, &l.price_column, &l.description_column],
            ),
        ];
        for (sheet, columns) in expected {
            let table = self.read(sheet).await?;
            for column in columns {
                table.require_column(sheet, column)?;
            }
            info!(sheet = %sheet, rows = table.rows.len(), "sheet ok");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Display name of a roster member, or `None` when `id` is not on the roster.
    async fn roster_name(&self, id: &str) -> Result<Option<String>> {
        let l = &self.layout;
        let roster = self.read(&l.roster_sheet).await?;
        let id_col = roster.require_column(&l.roster_sheet, &l.id_column)?;
        let name_col = roster.require_column(&l.roster_sheet, &l.name_column)?;
        Ok(roster
            .find(id_col, id)
            .map(|row| roster.cell(row, name_col).trim().to_string()))
    }

    pub async fn user_exists(&self, id: &str) -> Result<bool> {
        Ok(self.roster_name(id).await?.is_some())
    }

    pub async fn find_user(&self, id: &str) -> Result<User> {
        let l = &self.layout;
        let display_name = self
            .roster_name(id)
            .await?
            .ok_or_else(|| BotError::not_found("등록되지 않은 사용자입니다."))?;

        let ledger = self.read(&l.ledger_sheet).await?;
        let id_col = ledger.require_column(&l.ledger_sheet, &l.id_column)?;
        let balance_col = ledger.require_column(&l.ledger_sheet, &l.balance_column)?;
        let inventory_col = ledger.require_column(&l.ledger_sheet, &l.inventory_column)?;
        let row = ledger
            .find(id_col, id)
            .ok_or_else(|| BotError::not_found("사용자 정보를 조회할 수 없습니다."))?;

        Ok(User {
            id: id.trim().to_string(),
            display_name: if display_name.is_empty() {
                id.trim().to_string()
            } else {
                display_name
            },
            balance: parse_money(ledger.cell(row, balance_col)),
            inventory: Inventory::parse_cell(ledger.cell(row, inventory_col)),
        })
    }

    /// Resolve a display name on the roster to `(id, name)`.
    pub async fn find_user_by_name(&self, name: &str) -> Result<(String, String)> {
        let l = &self.layout;
        let roster = self.read(&l.roster_sheet).await?;
        let id_col = roster.require_column(&l.roster_sheet, &l.id_column)?;
        let name_col = roster.require_column(&l.roster_sheet, &l.name_column)?;
        let wanted = name.trim();
        let row = roster
            .find(name_col, wanted)
            .or_else(|| {
                let norm = fuzzy::normalize(wanted);
                (0..roster.rows.len())
                    .find(|r| fuzzy::normalize(roster.cell(*r, name_col)) == norm)
            })
            .ok_or_else(|| BotError::not_found(format!("'{wanted}' 캐릭터를 찾을 수 없습니다.")))?;
        Ok((
            roster.cell(row, id_col).trim().to_string(),
            roster.cell(row, name_col).trim().to_string(),
        ))
    }

    /// Overwrite the given ledger fields of `id` in one remote operation.
    /// Returns `false` when the ledger has no row for `id`.
    pub async fn update_user_fields(&self, id: &str, update: &UserUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(true);
        }
        let l = &self.layout;
        let mut fields = Vec::with_capacity(2);
        if let Some(balance) = update.balance {
            fields.push((l.balance_column.clone(), balance.to_string()));
        }
        if let Some(inventory) = &update.inventory {
            fields.push((l.inventory_column.clone(), inventory.to_cell()));
        }
        debug!(user = id, fields = fields.len(), "updating ledger row");
        let written = self
            .rows
            .write_row_fields(&l.ledger_sheet, &l.id_column, id, &fields)
            .await?;
        Ok(written)
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    fn cached_items(&self) -> Option<Arc<Vec<Item>>> {
        let guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.items_ttl)
            .map(|(_, items)| items.clone())
    }

    pub fn invalidate_items(&self) {
        *self.items.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Every item on the item sheet, in sheet order. Cached for the
    /// configured TTL.
    pub async fn items(&self) -> Result<Arc<Vec<Item>>> {
        if let Some(items) = self.cached_items() {
            return Ok(items);
        }
        let l = &self.layout;
        let table = self.read(&l.items_sheet).await?;
        let name_col = table.require_column(&l.items_sheet, &l.item_name_column)?;
        let price_col = table.require_column(&l.items_sheet, &l.price_column)?;
        let desc_col = table.require_column(&l.items_sheet, &l.description_column)?;

        let items: Vec<Item> = (0..table.rows.len())
            .filter_map(|r| {
                let name = table.cell(r, name_col).trim();
                (!name.is_empty()).then(|| Item {
                    name: name.to_string(),
                    price: Price::parse(table.cell(r, price_col)),
                    description: table.cell(r, desc_col).trim().to_string(),
                })
            })
            .collect();
        let items = Arc::new(items);
        if !self.items_ttl.is_zero() {
            *self.items.lock().unwrap_or_else(|e| e.into_inner()) =
                Some((Instant::now(), items.clone()));
        }
        Ok(items)
    }

    /// Look up an item by name. With `fuzzy_match`, falls back to substring and
    /// similarity matching; otherwise only a case- and whitespace-insensitive
    /// exact match counts.
    pub async fn find_item(&self, name: &str, fuzzy_match: bool) -> Result<Item> {
        let items = self.items().await?;
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        let hit = if fuzzy_match {
            fuzzy::resolve(name, &names).map(|m| m.index)
        } else {
            let wanted = fuzzy::normalize(name);
            names.iter().position(|n| fuzzy::normalize(n) == wanted)
        };
        hit.map(|i| items[i].clone())
            .ok_or_else(|| BotError::not_found(format!("'{}' 아이템을 찾을 수 없습니다.", name.trim())))
    }
}
