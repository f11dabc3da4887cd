use tracing::info;

use super::Economy;
use crate::error::{BotError, Result};
use crate::korean::Particle;
use crate::model::Price;
use crate::store::UserUpdate;

impl Economy {
    /// Buy `quantity` units of the item closest to `item_name`. Balance and
    /// inventory are written together in one row update.
    pub async fn purchase(&self, user_id: &str, item_name: &str, quantity: u32) -> Result<String> {
        let (min, max) = (self.config.min_quantity, self.config.max_quantity);
        if !(min..=max).contains(&i64::from(quantity)) {
            return Err(BotError::validation(format!(
                "구매 수량은 {min}개에서 {max}개 사이여야 합니다."
            )));
        }

        let _guard = self.locks.lock(user_id).await;

        let item = match self.store.find_item(item_name, true).await {
            Ok(item) => item,
            Err(BotError::NotFound(_)) => {
                let name = item_name.trim();
                return Err(BotError::not_found(format!(
                    "'{name}'{} 존재하지 않는 아이템입니다.",
                    Particle::EunNeun.after(name)
                )));
            }
            Err(e) => return Err(e),
        };
        let unit_price = match item.price {
            Price::Amount(p) => p,
            Price::NotPurchasable | Price::Unlisted => {
                return Err(BotError::validation(format!(
                    "'{}'{} 상점에서 구매할 수 없습니다.",
                    item.name,
                    Particle::EunNeun.after(&item.name)
                )));
            }
        };

        let mut user = self.store.find_user(user_id).await?;
        let total = unit_price
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| BotError::validation("구매 금액이 너무 큽니다."))?;
        if user.balance < total {
            return Err(BotError::validation(format!(
                "소지금이 부족합니다. 필요: {}, 현재: {}",
                self.money(total),
                self.money(user.balance)
            )));
        }

        let new_balance = user.balance - total;
        user.inventory.add(&item.name, quantity);
        let update = UserUpdate {
            balance: Some(new_balance),
            inventory: Some(user.inventory),
        };
        if !self.store.update_user_fields(user_id, &update).await? {
            return Err(BotError::not_found("사용자 정보를 조회할 수 없습니다."));
        }

        info!(user = user_id, item = %item.name, quantity, total, "purchase");
        let currency = &self.config.currency;
        Ok(format!(
            "{} {quantity}개 구매에 성공했습니다.\n잔여 {currency}{} {}입니다.",
            item.name,
            Particle::EunNeun.after(currency),
            self.money(new_balance)
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::economy::testkit::kit;
    use crate::error::BotError;
    use std::time::Duration;

    #[tokio::test]
    async fn purchase_debits_and_credits_together() {
        let k = kit(&[("u1", "하나", 500, "{}")]);
        let msg = k.economy.purchase("u1", "사과", 3).await.unwrap();
        assert!(msg.contains("사과 3개 구매에 성공했습니다."), "{msg}");
        assert!(msg.contains("200갈레온"), "{msg}");

        let user = k.economy.store().find_user("u1").await.unwrap();
        assert_eq!(user.balance, 200);
        assert_eq!(user.inventory.count("사과"), 3);
        assert_eq!(k.mem.write_count(), 1);
    }

    #[tokio::test]
    async fn purchase_adds_to_existing_stack() {
        let k = kit(&[("u1", "하나", 1000, r#"{"사과": 2}"#)]);
        k.economy.purchase("u1", "사과", 1).await.unwrap();
        let user = k.economy.store().find_user("u1").await.unwrap();
        assert_eq!(user.inventory.count("사과"), 3);
        assert_eq!(user.balance, 900);
    }

    #[tokio::test]
    async fn exact_name_wins_over_longer_item() {
        let k = kit(&[("u1", "하나", 1000, "{}")]);
        k.economy.purchase("u1", "가챠", 1).await.unwrap();
        let user = k.economy.store().find_user("u1").await.unwrap();
        assert_eq!(user.inventory.count("가챠"), 1);
        assert_eq!(user.inventory.count("가챠권"), 0);
        assert_eq!(user.balance, 950);
    }

    #[tokio::test]
    async fn insufficient_funds_changes_nothing() {
        let k = kit(&[("u1", "하나", 250, "{}")]);
        let err = k.economy.purchase("u1", "사과", 3).await.unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
        assert!(err.user_message().contains("필요: 300갈레온"));
        assert_eq!(k.mem.write_count(), 0);
    }

    #[tokio::test]
    async fn quantity_bounds() {
        let k = kit(&[("u1", "하나", 1_000_000, "{}")]);
        for bad in [0, 101] {
            let err = k.economy.purchase("u1", "사과", bad).await.unwrap_err();
            assert!(matches!(err, BotError::Validation(_)), "{bad}");
        }
        k.economy.purchase("u1", "사과", 100).await.unwrap();
        k.economy.purchase("u1", "사과", 1).await.unwrap();
        let user = k.economy.store().find_user("u1").await.unwrap();
        assert_eq!(user.inventory.count("사과"), 101);
        assert_eq!(user.balance, 1_000_000 - 101 * 100);
    }

    #[tokio::test]
    async fn unpurchasable_and_unknown_items() {
        let k = kit(&[("u1", "하나", 1000, "{}")]);
        let err = k.economy.purchase("u1", "송충이", 1).await.unwrap_err();
        assert!(err.user_message().contains("구매할 수 없습니다"));
        let err = k.economy.purchase("u1", "비매품", 1).await.unwrap_err();
        assert!(matches!(err, BotError::Validation(_)));
        let err = k.economy.purchase("u1", "용의 비늘", 1).await.unwrap_err();
        assert!(matches!(err, BotError::NotFound(_)));
        assert!(err.user_message().contains("존재하지 않는 아이템"));
    }

    #[tokio::test]
    async fn failed_write_reports_storage_error() {
        let k = kit(&[("u1", "하나", 500, "{}")]);
        k.mem.fail_write(0);
        let err = k.economy.purchase("u1", "사과", 1).await.unwrap_err();
        assert!(matches!(err, BotError::StorageUnavailable(_)));
        let user = k.economy.store().find_user("u1").await.unwrap();
        assert_eq!(user.balance, 500);
        assert!(user.inventory.is_empty());
    }

    #[tokio::test]
    async fn concurrent_purchases_by_one_user_serialize() {
        let k = kit(&[("u1", "하나", 500, "{}")]);
        k.mem.set_read_delay(Duration::from_millis(5));

        let (a, b) = tokio::join!(
            k.economy.purchase("u1", "사과", 3),
            k.economy.purchase("u1", "사과", 3),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, BotError::Validation(_)), "{err}");

        let user = k.economy.store().find_user("u1").await.unwrap();
        assert_eq!(user.balance, 200);
        assert_eq!(user.inventory.count("사과"), 3);
        assert_eq!(k.mem.write_count(), 1);
    }
}
