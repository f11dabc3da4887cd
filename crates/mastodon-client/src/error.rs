use shopbot_core::social::SocialError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MastodonError {
    #[error("HTTP transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<reqwest::Error> for MastodonError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e)
        } else {
            Self::Transport(e)
        }
    }
}

impl From<MastodonError> for SocialError {
    fn from(e: MastodonError) -> Self {
        match e {
            MastodonError::Timeout => SocialError::Timeout,
            MastodonError::Status { status, body } if status == 408 || status == 504 => {
                SocialError::Unavailable(format!("status {status}: {body}"))
            }
            MastodonError::Status { status, body } if status < 500 => SocialError::Rejected {
                status,
                message: body,
            },
            MastodonError::Status { status, body } => {
                SocialError::Unavailable(format!("status {status}: {body}"))
            }
            MastodonError::InvalidUrl(url) => SocialError::Rejected {
                status: 0,
                message: format!("invalid base url: {url}"),
            },
            e @ (MastodonError::Transport(_) | MastodonError::Decode(_)) => {
                SocialError::Unavailable(e.to_string())
            }
        }
    }
}
