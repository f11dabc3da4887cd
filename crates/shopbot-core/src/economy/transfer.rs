use tracing::{error, info, warn};

use super::Economy;
use crate::error::{BotError, PartialMutation, Result};
use crate::korean::{attach, Particle};
use crate::model::{TransferPayload, TransferRecord, User};
use crate::parser::TransferArg;
use crate::store::UserUpdate;

impl Economy {
    /// Move one unit of an item, or an amount of currency, to the roster
    /// member named `target_name`.
    ///
    /// The debit and the credit are separate row writes. If the credit fails
    /// the sender's previous values are written back; if that also fails the
    /// result is [`BotError::PartialMutation`].
    pub async fn transfer(
        &self,
        sender_id: &str,
        arg: TransferArg,
        target_name: &str,
    ) -> Result<String> {
        if !self.config.transfers_enabled {
            return Err(BotError::validation("양도 기능이 비활성화되어 있습니다."));
        }
        if let TransferArg::Currency(amount) = arg {
            if amount <= 0 {
                return Err(BotError::validation("0보다 큰 금액을 입력해주세요."));
            }
        }

        let (receiver_id, receiver_name) = self.store.find_user_by_name(target_name).await?;
        if receiver_id == sender_id.trim() {
            return Err(BotError::validation("자신에게는 양도할 수 없습니다."));
        }

        let _guard = self.locks.lock_pair(sender_id, &receiver_id).await;

        let sender = self.store.find_user(sender_id).await?;
        let receiver = match self.store.find_user(&receiver_id).await {
            Ok(user) => user,
            Err(BotError::NotFound(_)) => {
                return Err(BotError::not_found("수신자 정보를 조회할 수 없습니다."))
            }
            Err(e) => return Err(e),
        };

        let payload = match arg {
            TransferArg::Currency(amount) => {
                if sender.balance < amount {
                    return Err(BotError::validation(format!(
                        "소지금이 부족합니다. (보유: {})",
                        self.money(sender.balance)
                    )));
                }
                TransferPayload::Currency(amount)
            }
            TransferArg::Item(name) => match sender.inventory.find(&name) {
                Some((owned, count)) if count >= 1 => TransferPayload::Item(owned.to_string()),
                _ => {
                    return Err(BotError::not_found(format!(
                        "'{}' 아이템을 보유하고 있지 않습니다.",
                        name.trim()
                    )))
                }
            },
        };

        let record = TransferRecord {
            sender: sender.id.clone(),
            receiver: receiver.id.clone(),
            payload,
        };
        self.apply_transfer(&record, sender, receiver).await?;

        let what = record.payload.describe(&self.config.currency);
        info!(sender = %record.sender, receiver = %record.receiver, payload = %what, "transfer");

        if let Some(notifier) = &self.notifier {
            notifier.enqueue(
                &record.receiver,
                &format!("누군가가 당신에게 {} 양도했습니다.", attach(&what, Particle::EulReul)),
            );
        }

        Ok(format!(
            "{receiver_name}에게 {} 성공적으로 양도했습니다.",
            attach(&what, Particle::EulReul)
        ))
    }

    async fn apply_transfer(&self, record: &TransferRecord, sender: User, receiver: User) -> Result<()> {
        let (debit, credit, rollback) = match &record.payload {
            TransferPayload::Currency(amount) => {
                let credited = receiver
                    .balance
                    .checked_add(*amount)
                    .ok_or_else(|| BotError::validation("받는 사람의 소지금이 한도를 넘습니다."))?;
                (
                    UserUpdate {
                        balance: Some(sender.balance - amount),
                        inventory: None,
                    },
                    UserUpdate {
                        balance: Some(credited),
                        inventory: None,
                    },
                    UserUpdate {
                        balance: Some(sender.balance),
                        inventory: None,
                    },
                )
            }
            TransferPayload::Item(name) => {
                let mut sender_inv = sender.inventory.clone();
                sender_inv
                    .remove(name, 1)
                    .map_err(|_| BotError::not_found(format!("'{name}' 아이템을 보유하고 있지 않습니다.")))?;
                let mut receiver_inv = receiver.inventory;
                receiver_inv.add(name, 1);
                (
                    UserUpdate {
                        balance: None,
                        inventory: Some(sender_inv),
                    },
                    UserUpdate {
                        balance: None,
                        inventory: Some(receiver_inv),
                    },
                    UserUpdate {
                        balance: None,
                        inventory: Some(sender.inventory),
                    },
                )
            }
        };

        if !self.store.update_user_fields(&record.sender, &debit).await? {
            return Err(BotError::not_found("양도자 정보를 조회할 수 없습니다."));
        }

        let credit_error = match self.store.update_user_fields(&record.receiver, &credit).await {
            Ok(true) => return Ok(()),
            Ok(false) => "receiver row disappeared".to_string(),
            Err(e) => e.to_string(),
        };

        warn!(
            sender = %record.sender,
            receiver = %record.receiver,
            error = %credit_error,
            "credit failed, rolling back debit"
        );
        let rollback_error = match self.store.update_user_fields(&record.sender, &rollback).await {
            Ok(true) => {
                return Err(BotError::StorageUnavailable(format!(
                    "credit failed and was rolled back: {credit_error}"
                )))
            }
            Ok(false) => "sender row disappeared".to_string(),
            Err(e) => e.to_string(),
        };

        let partial = PartialMutation {
            sender: record.sender.clone(),
            receiver: record.receiver.clone(),
            payload: record.payload.clone(),
            credit_error,
            rollback_error,
        };
        error!(operator_alert = true, detail = %partial, "transfer left partially applied");
        Err(BotError::PartialMutation(Box::new(partial)))
    }
}
