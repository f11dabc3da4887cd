use tracing::info;

use super::Economy;
use crate::error::{BotError, Result};
use crate::korean::{attach, Particle};
use crate::store::UserUpdate;

impl Economy {
    /// Consume one unit of an owned item (exact name first, then substring).
    pub async fn use_item(&self, user_id: &str, item_name: &str) -> Result<String> {
        let _guard = self.locks.lock(user_id).await;

        let mut user = self.store.find_user(user_id).await?;
        let name = match user.inventory.find(item_name) {
            Some((name, count)) if count > 0 => name.to_string(),
            _ => {
                return Err(BotError::not_found(format!(
                    "'{}' 아이템을 소지하고 있지 않습니다.",
                    item_name.trim()
                )))
            }
        };
        if let Err(have) = user.inventory.remove(&name, 1) {
            return Err(BotError::validation(format!(
                "'{name}' 아이템이 부족합니다. (보유: {have}개)"
            )));
        }
        let remaining = user.inventory.count(&name);

        let update = UserUpdate {
            balance: None,
            inventory: Some(user.inventory),
        };
        if !self.store.update_user_fields(user_id, &update).await? {
            return Err(BotError::not_found("사용자 정보를 조회할 수 없습니다."));
        }

        info!(user = user_id, item = %name, remaining, "use");
        Ok(format!("{} 사용했습니다.", attach(&name, Particle::EulReul)))
    }
}

#[cfg(test)]
mod tests {
    use crate::economy::testkit::kit;
    use crate::error::BotError;

    #[tokio::test]
    async fn using_down_to_zero_removes_the_key() {
        let k = kit(&[("u1", "하나", 0, r#"{"사과": 3}"#)]);
        let msg = k.economy.use_item("u1", "사과").await.unwrap();
        assert_eq!(msg, "사과를 사용했습니다.");
        let user = k.economy.store().find_user("u1").await.unwrap();
        assert_eq!(user.inventory.count("사과"), 2);

        k.economy.use_item("u1", "사과").await.unwrap();
        k.economy.use_item("u1", "사과").await.unwrap();
        let table = k.mem.snapshot().sheets["관리"].clone();
        assert_eq!(table.cell(0, 2), "{}");
    }

    #[tokio::test]
    async fn replaying_last_unit_is_not_found_not_negative() {
        let k = kit(&[("u1", "하나", 0, r#"{"가챠권": 1}"#)]);
        k.economy.use_item("u1", "가챠권").await.unwrap();
        let err = k.economy.use_item("u1", "가챠권").await.unwrap_err();
        assert!(matches!(err, BotError::NotFound(_)));
        let user = k.economy.store().find_user("u1").await.unwrap();
        assert!(user.inventory.is_empty());
    }

    #[tokio::test]
    async fn substring_fallback_uses_owned_item() {
        let k = kit(&[("u1", "하나", 0, r#"{"별빛 사탕": 2}"#)]);
        let msg = k.economy.use_item("u1", "사탕").await.unwrap();
        assert_eq!(msg, "별빛 사탕을 사용했습니다.");
    }

    #[tokio::test]
    async fn zero_count_cell_is_treated_as_missing() {
        let k = kit(&[("u1", "하나", 0, r#"{"사과": 0}"#)]);
        let err = k.economy.use_item("u1", "사과").await.unwrap_err();
        assert!(matches!(err, BotError::NotFound(_)));
        assert_eq!(k.mem.write_count(), 0);
    }
}
