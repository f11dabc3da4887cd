use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use shopbot_core::bot::Outcome;
use shopbot_core::social::{AccountInfo, RecordingClient};
use shopbot_core::store::{Fixture, MemoryRowStore};

use super::{load_config, wire};
use crate::output::print_json;

#[derive(Args)]
pub struct ExecArgs {
    /// YAML workbook fixture (sheets → headers + rows)
    #[arg(long)]
    pub fixture: PathBuf,

    /// Account id of the sender
    #[arg(long)]
    pub user: String,

    /// Display name of the sender (default: the account id)
    #[arg(long)]
    pub name: Option<String>,

    /// Write the mutated sheets back to the fixture
    #[arg(long)]
    pub save: bool,

    /// Command text, e.g. "[구매/사과/2개]"
    pub text: String,
}

pub fn run(config_path: &Path, args: ExecArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path, false)?;
    let fixture = Fixture::load(&args.fixture)
        .with_context(|| format!("failed to load fixture {}", args.fixture.display()))?;

    let rows = Arc::new(MemoryRowStore::new(fixture));
    let social = Arc::new(RecordingClient::new(AccountInfo {
        id: "0".into(),
        acct: "shopbot".into(),
        username: "shopbot".into(),
        display_name: "shopbot".into(),
    }));
    let wiring = wire(&config, rows.clone(), social.clone())?;

    let name = args.name.as_deref().unwrap_or(&args.user);
    let rt = tokio::runtime::Runtime::new()?;
    let reply = rt.block_on(async {
        wiring
            .store
            .verify_layout()
            .await
            .context("fixture does not match the configured sheet layout")?;
        let reply = wiring.bot.handle_text(&args.text, &args.user, name, "exec").await;
        wiring.notifier.process_pending().await;
        anyhow::Ok(reply)
    })?;

    let notifications: Vec<String> = social.posts().into_iter().map(|p| p.text).collect();

    if args.save {
        rows.snapshot()
            .save(&args.fixture)
            .with_context(|| format!("failed to save fixture {}", args.fixture.display()))?;
    }

    if json {
        print_json(&serde_json::json!({
            "reply": reply.text,
            "outcome": reply.outcome,
            "notifications": notifications,
        }))?;
    } else {
        println!("{}", reply.text);
        for n in &notifications {
            println!("→ {n}");
        }
    }

    match reply.outcome {
        Outcome::Success | Outcome::Rejected => Ok(()),
        Outcome::Failed => anyhow::bail!("command failed"),
        Outcome::PartialMutation => anyhow::bail!("command left the sheets partially updated"),
    }
}
