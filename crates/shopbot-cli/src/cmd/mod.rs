pub mod check;
pub mod commands;
pub mod exec;
pub mod run;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shopbot_core::bot::Bot;
use shopbot_core::config::BotConfig;
use shopbot_core::economy::Economy;
use shopbot_core::locks::UserLocks;
use shopbot_core::notify::Notifier;
use shopbot_core::registry::{Capability, Registry};
use shopbot_core::social::SocialClient;
use shopbot_core::store::{RowStore, StateStore};

/// Load the config at `path`. When `required` is false a missing file
/// yields the defaults.
pub fn load_config(path: &Path, required: bool) -> anyhow::Result<BotConfig> {
    if !required && !path.exists() {
        return Ok(BotConfig::default());
    }
    BotConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

pub struct Wiring {
    pub bot: Arc<Bot>,
    pub store: Arc<StateStore>,
    pub notifier: Arc<Notifier>,
}

/// Assemble store, notifier, registry and handlers. Fails when a registered
/// command needs a capability that is not wired.
pub fn wire(
    config: &BotConfig,
    rows: Arc<dyn RowStore>,
    social: Arc<dyn SocialClient>,
) -> anyhow::Result<Wiring> {
    let store = Arc::new(StateStore::new(
        rows,
        config.layout.clone(),
        config.retry,
        Duration::from_secs(config.items_cache_ttl_secs),
    ));
    let notifier = Arc::new(Notifier::new(social, &config.notify));

    let registry = Registry::standard(&config.economy)?;
    registry.check_capabilities(&[Capability::StateStore, Capability::Notifier])?;

    let economy = Economy::new(
        store.clone(),
        Arc::new(UserLocks::new()),
        Some(notifier.clone()),
        config.economy.clone(),
    );
    let bot = Arc::new(Bot::new(registry, economy, config.dice.clone()));
    Ok(Wiring {
        bot,
        store,
        notifier,
    })
}
