//! `mastodon-client` — the Mastodon REST endpoints shopbot needs, exposed as
//! a [`shopbot_core::social::SocialClient`].
//!
//! - `GET  /api/v1/accounts/verify_credentials`
//! - `GET  /api/v1/notifications?types[]=mention`
//! - `POST /api/v1/statuses`

pub mod client;
pub mod error;
pub mod html;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::MastodonClient;
pub use error::MastodonError;

pub type Result<T> = std::result::Result<T, MastodonError>;
