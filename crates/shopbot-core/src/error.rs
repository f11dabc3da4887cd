use thiserror::Error;

use crate::model::TransferPayload;
use crate::parser::ParseError;
use crate::registry::Capability;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Validation(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("partial mutation: {0}")]
    PartialMutation(Box<PartialMutation>),

    #[error("sheet layout: {0}")]
    SheetLayout(String),

    #[error("command '{command}' requires {capability}, which is not configured")]
    MissingCapability {
        command: String,
        capability: Capability,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// `true` for rejections caused by the user's input or state, as opposed
    /// to infrastructure or operator problems.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Parse(_) | Self::NotFound(_) | Self::Validation(_)
        )
    }

    /// The single reply text shown to the user who issued the command.
    pub fn user_message(&self) -> String {
        match self {
            Self::Parse(e) => e.user_message(),
            Self::NotFound(msg) | Self::Validation(msg) => msg.clone(),
            Self::StorageUnavailable(_) => {
                "일시적인 오류가 발생했습니다. 잠시 후 다시 시도해 주세요.".to_string()
            }
            Self::PartialMutation(_) => "처리 도중 문제가 발생해 관리자에게 알렸습니다. \
                 확인이 끝날 때까지 같은 명령어를 반복하지 말아 주세요."
                .to_string(),
            _ => "명령어 처리 중 오류가 발생했습니다. 관리자에게 문의해 주세요.".to_string(),
        }
    }
}

impl From<StoreError> for BotError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SheetNotFound(_) | StoreError::MissingColumn { .. } => {
                Self::SheetLayout(e.to_string())
            }
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// PartialMutation
// ---------------------------------------------------------------------------

/// A two-sided mutation whose debit committed but whose credit did not, and
/// whose compensating write also failed. The store is left inconsistent until
/// an operator repairs it by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialMutation {
    pub sender: String,
    pub receiver: String,
    pub payload: TransferPayload,
    pub credit_error: String,
    pub rollback_error: String,
}

impl std::fmt::Display for PartialMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} debited for {:?} but {} was not credited (credit: {}; rollback: {})",
            self.sender, self.payload, self.receiver, self.credit_error, self.rollback_error
        )
    }
}
