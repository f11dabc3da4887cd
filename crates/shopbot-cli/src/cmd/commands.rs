use std::path::Path;

use shopbot_core::registry::Registry;

use super::load_config;
use crate::output::{print_json, print_table};

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path, false)?;
    let registry = Registry::standard(&config.economy)?;

    if json {
        let list: Vec<serde_json::Value> = registry
            .commands()
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "aliases": c.aliases,
                    "usage": c.usage,
                    "description": c.description,
                    "requires": c.requires.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
                })
            })
            .collect();
        return print_json(&list);
    }

    let rows = registry
        .commands()
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.aliases.join(", "),
                c.usage.clone(),
                c.requires
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ]
        })
        .collect();
    print_table(&["COMMAND", "ALIASES", "USAGE", "REQUIRES"], rows);
    Ok(())
}
