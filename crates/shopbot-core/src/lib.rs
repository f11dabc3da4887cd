pub mod bot;
pub mod config;
pub mod dice;
pub mod dispatch;
pub mod economy;
pub mod error;
pub mod fuzzy;
pub mod io;
pub mod korean;
pub mod locks;
pub mod model;
pub mod notify;
pub mod parser;
pub mod registry;
pub mod retry;
pub mod social;
pub mod store;

pub use error::{BotError, Result};
