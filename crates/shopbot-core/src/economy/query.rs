use super::Economy;
use crate::error::{BotError, Result};
use crate::korean::Particle;
use crate::model::Price;

impl Economy {
    pub async fn inventory(&self, user_id: &str) -> Result<String> {
        let user = self.store.find_user(user_id).await?;
        let mut lines = vec![format!("{}의 현재 소지품은 다음과 같습니다.", user.display_name)];
        if user.inventory.is_empty() {
            lines.push("- 소지품이 없습니다.".to_string());
        } else {
            lines.extend(
                user.inventory
                    .iter()
                    .map(|(name, count)| format!("- {name} {count}개")),
            );
        }
        lines.push(String::new());
        lines.push(format!(
            "현재 {}: {}",
            self.config.currency,
            self.money(user.balance)
        ));
        Ok(lines.join("\n"))
    }

    pub async fn balance(&self, user_id: &str) -> Result<String> {
        let user = self.store.find_user(user_id).await?;
        let currency = &self.config.currency;
        Ok(format!(
            "{}의 현재 {currency}{} {}입니다.",
            user.display_name,
            Particle::EunNeun.after(currency),
            self.money(user.balance)
        ))
    }

    /// Price and description of the item closest to `item_name`.
    pub async fn describe(&self, item_name: &str) -> Result<String> {
        if item_name.trim().is_empty() {
            return Err(BotError::validation("설명을 볼 아이템 이름을 입력해 주세요."));
        }
        let item = self.store.find_item(item_name, true).await?;
        Ok(match item.price {
            Price::Amount(p) => format!("{}({}) : {}", item.name, self.money(p), item.description),
            Price::NotPurchasable | Price::Unlisted => {
                format!("{} : {}", item.name, item.description)
            }
        })
    }

    /// Every purchasable item, one per line.
    pub async fn shop(&self) -> Result<String> {
        let items = self.store.items().await?;
        let lines: Vec<String> = items
            .iter()
            .filter_map(|item| {
                let price = item.price.unit_price()?;
                Some(if item.description.is_empty() {
                    format!("{} ({})", item.name, self.money(price))
                } else {
                    format!("{} ({}) : {}", item.name, self.money(price), item.description)
                })
            })
            .collect();
        if lines.is_empty() {
            return Ok("현재 구매 가능한 아이템이 없습니다.".to_string());
        }
        Ok(format!("[상점 목록]\n{}", lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use crate::economy::testkit::kit;
    use crate::error::BotError;

    #[tokio::test]
    async fn inventory_lists_items_and_balance() {
        let k = kit(&[("u1", "하나", 1500, r#"{"사과": 2, "가챠권": 1}"#)]);
        let msg = k.economy.inventory("u1").await.unwrap();
        assert!(msg.starts_with("하나의 현재 소지품은"));
        assert!(msg.contains("- 사과 2개"));
        assert!(msg.contains("- 가챠권 1개"));
        assert!(msg.ends_with("현재 갈레온: 1,500갈레온"));
    }

    #[tokio::test]
    async fn empty_inventory() {
        let k = kit(&[("u1", "하나", 0, "")]);
        let msg = k.economy.inventory("u1").await.unwrap();
        assert!(msg.contains("- 소지품이 없습니다."));
    }

    #[tokio::test]
    async fn balance_uses_particle() {
        let k = kit(&[("u1", "하나", 1234, "{}")]);
        assert_eq!(
            k.economy.balance("u1").await.unwrap(),
            "하나의 현재 갈레온은 1,234갈레온입니다."
        );
    }

    #[tokio::test]
    async fn describe_formats_price_when_present() {
        let k = kit(&[]);
        assert_eq!(
            k.economy.describe("사과").await.unwrap(),
            "사과(100갈레온) : 빨갛고 둥글다"
        );
        assert_eq!(k.economy.describe("송충이").await.unwrap(), "송충이 : 꿈틀");
        assert!(matches!(
            k.economy.describe("없는것").await.unwrap_err(),
            BotError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn shop_hides_unpurchasable_items() {
        let k = kit(&[]);
        let msg = k.economy.shop().await.unwrap();
        assert!(msg.contains("사과 (100갈레온) : 빨갛고 둥글다"));
        assert!(!msg.contains("송충이"));
        assert!(!msg.contains("비매품"));
    }

    #[tokio::test]
    async fn unregistered_user() {
        let k = kit(&[]);
        let err = k.economy.inventory("ghost").await.unwrap_err();
        assert_eq!(err.user_message(), "등록되지 않은 사용자입니다.");
    }
}
