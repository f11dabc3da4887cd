use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use mastodon_client::MastodonClient;
use shopbot_core::config::WarnLevel;
use shopbot_core::dispatch::Dispatcher;
use shopbot_core::social::SocialClient;
use shopbot_core::store::SheetsRowStore;
use tracing::{info, warn};

use super::{load_config, wire};

fn env_token(var: &str) -> anyhow::Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => bail!("environment variable {var} is not set"),
    }
}

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path, true)?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => warn!("config: {}", w.message),
            WarnLevel::Error => bail!("config: {}", w.message),
        }
    }

    let mastodon_token = env_token(&config.mastodon.access_token_env)?;
    let sheets_token = env_token(&config.sheets.access_token_env)?;
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let social: Arc<dyn SocialClient> = Arc::new(
            MastodonClient::new(&config.mastodon.base_url, mastodon_token, timeout)
                .context("failed to build Mastodon client")?,
        );
        let rows = Arc::new(
            SheetsRowStore::from_config(&config.sheets, sheets_token, timeout)
                .context("failed to build Sheets client")?,
        );
        let wiring = wire(&config, rows, social.clone())?;
        wiring
            .store
            .verify_layout()
            .await
            .context("spreadsheet layout check failed")?;

        let mut dispatcher = Dispatcher::connect(
            wiring.bot,
            social,
            Some(wiring.notifier),
            config.dispatch.clone(),
            config.notify.retry_policy(),
        )
        .await
        .context("failed to verify Mastodon credentials")?;

        // Without the backlog marked as seen, the first poll would rerun
        // commands that already committed before this start.
        dispatcher
            .skip_backlog()
            .await
            .context("could not read notification backlog; refusing to start")?;

        info!(account = %dispatcher.me().acct, "shopbot running; Ctrl-C to stop");
        dispatcher
            .run_until(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;
        Ok(())
    })
}
