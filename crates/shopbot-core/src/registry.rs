use std::collections::HashMap;
use std::fmt;

use crate::config::EconomyConfig;
use crate::error::{BotError, Result};
use crate::parser::ParseError;

/// The closed set of commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Purchase,
    Use,
    Transfer,
    Inventory,
    Balance,
    Describe,
    Shop,
    Dice,
    Help,
}

/// A runtime dependency a command needs in order to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    StateStore,
    Notifier,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateStore => write!(f, "state store"),
            Self::Notifier => write!(f, "notification sender"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub kind: CommandKind,
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub usage: String,
    pub requires: Vec<Capability>,
}

impl CommandSpec {
    fn new(kind: CommandKind, name: &str, description: &str, usage: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            aliases: Vec::new(),
            description: description.to_string(),
            usage: usage.to_string(),
            requires: Vec::new(),
        }
    }

    fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases.extend(aliases.iter().map(|a| a.to_string()));
        self
    }

    fn requires(mut self, caps: &[Capability]) -> Self {
        self.requires.extend_from_slice(caps);
        self
    }

    fn keywords(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Keyword → command lookup table.
#[derive(Debug, Default)]
pub struct Registry {
    specs: Vec<CommandSpec>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its name and aliases. A keyword that is
    /// already taken is a configuration error.
    pub fn register(&mut self, spec: CommandSpec) -> Result<()> {
        let slot = self.specs.len();
        let mut keys = Vec::new();
        for keyword in spec.keywords() {
            let key = keyword.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            if self.index.contains_key(&key) || keys.contains(&key) {
                return Err(BotError::Config(format!(
                    "command keyword '{keyword}' is registered twice"
                )));
            }
            keys.push(key);
        }
        for key in keys {
            self.index.insert(key, slot);
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Case-insensitive lookup by name or alias.
    pub fn resolve(&self, token: &str) -> std::result::Result<&CommandSpec, ParseError> {
        let key = token.trim().to_lowercase();
        self.index
            .get(&key)
            .map(|i| &self.specs[*i])
            .ok_or(ParseError::UnknownCommand(token.trim().to_string()))
    }

    pub fn get(&self, kind: CommandKind) -> Option<&CommandSpec> {
        self.specs.iter().find(|s| s.kind == kind)
    }

    pub fn commands(&self) -> &[CommandSpec] {
        &self.specs
    }

    /// Fail if any registered command needs a capability that is not in
    /// `available`. Run once at startup.
    pub fn check_capabilities(&self, available: &[Capability]) -> Result<()> {
        for spec in &self.specs {
            if let Some(missing) = spec.requires.iter().find(|c| !available.contains(c)) {
                return Err(BotError::MissingCapability {
                    command: spec.name.clone(),
                    capability: *missing,
                });
            }
        }
        Ok(())
    }

    /// The full command set. The currency name doubles as an alias for the
    /// balance query; transfers are left out when disabled.
    pub fn standard(economy: &EconomyConfig) -> Result<Self> {
        use Capability::*;
        use CommandKind::*;

        let currency = economy.currency.trim();
        let (min, max) = (economy.min_quantity, economy.max_quantity);
        let mut reg = Self::new();

        reg.register(
            CommandSpec::new(
                Purchase,
                "구매",
                &format!("상점 아이템을 구매합니다. (수량 {min}~{max})"),
                "[구매/아이템명/3개]",
            )
            .aliases(&["buy", "구입", "사기"])
            .requires(&[StateStore]),
        )?;
        reg.register(
            CommandSpec::new(Use, "사용", "소지품의 아이템을 1개 사용합니다.", "[사용/아이템명]")
                .aliases(&["use", "사용하기", "먹기", "소모"])
                .requires(&[StateStore]),
        )?;
        if economy.transfers_enabled {
            reg.register(
                CommandSpec::new(
                    Transfer,
                    "양도",
                    "아이템 1개 또는 화폐를 다른 사람에게 넘겨줍니다.",
                    &format!("[양도/아이템명/대상] 또는 [양도/100{currency}/대상]"),
                )
                .requires(&[StateStore, Notifier]),
            )?;
        }
        reg.register(
            CommandSpec::new(Inventory, "소지품", "소지품 목록을 확인합니다.", "[소지품]")
                .aliases(&["inventory", "inv", "인벤토리"])
                .requires(&[StateStore]),
        )?;

        let mut balance_aliases = vec!["currency"];
        if !currency.is_empty() && currency != "소지금" {
            balance_aliases.push(currency);
        }
        reg.register(
            CommandSpec::new(Balance, "소지금", "현재 소지금을 확인합니다.", "[소지금]")
                .aliases(&balance_aliases)
                .requires(&[StateStore]),
        )?;
        reg.register(
            CommandSpec::new(Describe, "설명", "아이템의 가격과 설명을 확인합니다.", "[설명/아이템명]")
                .aliases(&["desc", "description", "item"])
                .requires(&[StateStore]),
        )?;
        reg.register(
            CommandSpec::new(Shop, "상점", "구매 가능한 아이템 목록을 확인합니다.", "[상점]")
                .aliases(&["shop", "store"])
                .requires(&[StateStore]),
        )?;
        reg.register(
            CommandSpec::new(Dice, "다이스", "주사위를 굴립니다.", "[1d100], [다이스/2d6<4]")
                .aliases(&["dice"]),
        )?;
        reg.register(
            CommandSpec::new(Help, "도움말", "사용 가능한 명령어를 보여줍니다.", "[도움말]")
                .aliases(&["help"]),
        )?;
        Ok(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> Registry {
        Registry::standard(&EconomyConfig::default()).unwrap()
    }

    #[test]
    fn resolves_names_and_aliases_case_insensitively() {
        let reg = standard();
        assert_eq!(reg.resolve("구매").unwrap().kind, CommandKind::Purchase);
        assert_eq!(reg.resolve("BUY").unwrap().kind, CommandKind::Purchase);
        assert_eq!(reg.resolve(" Inv ").unwrap().kind, CommandKind::Inventory);
        assert_eq!(reg.resolve("dice").unwrap().kind, CommandKind::Dice);
    }

    #[test]
    fn currency_name_is_a_balance_alias() {
        let economy = EconomyConfig {
            currency: "갈레온".into(),
            ..EconomyConfig::default()
        };
        let reg = Registry::standard(&economy).unwrap();
        assert_eq!(reg.resolve("갈레온").unwrap().kind, CommandKind::Balance);
    }

    #[test]
    fn unknown_command_is_parse_error() {
        assert_eq!(
            standard().resolve("춤추기").unwrap_err(),
            ParseError::UnknownCommand("춤추기".into())
        );
    }

    #[test]
    fn duplicate_keyword_is_rejected() {
        let mut reg = Registry::new();
        reg.register(CommandSpec::new(CommandKind::Help, "도움말", "", "").aliases(&["help"]))
            .unwrap();
        let err = reg
            .register(CommandSpec::new(CommandKind::Dice, "HELP", "", ""))
            .unwrap_err();
        assert!(matches!(err, BotError::Config(_)));
    }

    #[test]
    fn transfers_can_be_disabled() {
        let economy = EconomyConfig {
            transfers_enabled: false,
            ..EconomyConfig::default()
        };
        let reg = Registry::standard(&economy).unwrap();
        assert!(reg.resolve("양도").is_err());
        assert!(reg.get(CommandKind::Transfer).is_none());
    }

    #[test]
    fn capability_check_fails_fast() {
        let reg = standard();
        assert!(reg
            .check_capabilities(&[Capability::StateStore, Capability::Notifier])
            .is_ok());
        let err = reg.check_capabilities(&[Capability::StateStore]).unwrap_err();
        assert!(matches!(
            err,
            BotError::MissingCapability {
                capability: Capability::Notifier,
                ..
            }
        ));
    }
}
