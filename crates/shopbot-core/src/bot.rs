use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::DiceConfig;
use crate::dice::DiceSpec;
use crate::economy::Economy;
use crate::error::{BotError, Result};
use crate::model::Command;
use crate::parser::{self, ParseError, TransferArg};
use crate::registry::{CommandKind, CommandSpec, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// The user's input or state did not allow the command.
    Rejected,
    /// Infrastructure failure; nothing was changed.
    Failed,
    /// Debit committed without its credit; an operator has to repair it.
    PartialMutation,
}

/// The single reply to one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    pub outcome: Outcome,
}

impl Reply {
    fn ok(text: String) -> Self {
        Self {
            text,
            outcome: Outcome::Success,
        }
    }

    fn from_error(e: &BotError) -> Self {
        let outcome = match e {
            BotError::PartialMutation(_) => Outcome::PartialMutation,
            e if e.is_user_error() => Outcome::Rejected,
            _ => Outcome::Failed,
        };
        Self {
            text: e.user_message(),
            outcome,
        }
    }
}

/// Parses command text, resolves it against the registry and runs the
/// matching handler.
pub struct Bot {
    registry: Registry,
    economy: Economy,
    dice: DiceConfig,
}

impl Bot {
    pub fn new(registry: Registry, economy: Economy, dice: DiceConfig) -> Self {
        Self {
            registry,
            economy,
            dice,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn economy(&self) -> &Economy {
        &self.economy
    }

    /// Build a [`Command`] from the first bracketed token in `text`. The
    /// command name is the registered name, whatever alias was used.
    pub fn parse(
        &self,
        text: &str,
        origin_user: &str,
        origin_name: &str,
        origin_message: &str,
    ) -> std::result::Result<Command, ParseError> {
        let inv = parser::parse_invocation(text)?;
        let spec = self.registry.resolve(&inv.name)?;
        Ok(Command {
            name: spec.name.clone(),
            args: inv.args,
            origin_user: origin_user.to_string(),
            origin_name: origin_name.to_string(),
            origin_message: origin_message.to_string(),
        })
    }

    /// Parse and execute. Never fails: every outcome becomes one reply.
    pub async fn handle_text(
        &self,
        text: &str,
        origin_user: &str,
        origin_name: &str,
        origin_message: &str,
    ) -> Reply {
        match self.parse(text, origin_user, origin_name, origin_message) {
            Ok(cmd) => self.execute(&cmd).await,
            Err(e) => {
                debug!(user = origin_user, error = %e, "unparseable command");
                Reply::from_error(&BotError::Parse(e))
            }
        }
    }

    pub async fn execute(&self, cmd: &Command) -> Reply {
        let spec = match self.registry.resolve(&cmd.name) {
            Ok(spec) => spec,
            Err(e) => return Reply::from_error(&BotError::Parse(e)),
        };
        match self.run(spec, cmd).await {
            Ok(text) => Reply::ok(text),
            Err(e) => {
                match &e {
                    BotError::PartialMutation(p) => {
                        error!(operator_alert = true, command = %cmd.name, user = %cmd.origin_user, detail = %p, "command left state inconsistent")
                    }
                    e if e.is_user_error() => {
                        debug!(command = %cmd.name, user = %cmd.origin_user, error = %e, "command rejected")
                    }
                    e => warn!(command = %cmd.name, user = %cmd.origin_user, error = %e, "command failed"),
                }
                Reply::from_error(&e)
            }
        }
    }

    async fn run(&self, spec: &CommandSpec, cmd: &Command) -> Result<String> {
        let user = cmd.origin_user.as_str();
        let economy = self.economy.config();
        let missing = || ParseError::MissingArguments {
            command: spec.name.clone(),
            usage: spec.usage.clone(),
        };

        match spec.kind {
            CommandKind::Purchase => {
                let (item, qty) = parser::parse_item_and_quantity(
                    &spec.name,
                    &cmd.args,
                    economy.min_quantity..=economy.max_quantity,
                    &spec.usage,
                )?;
                self.economy.purchase(user, &item, qty).await
            }
            CommandKind::Use => {
                let item = cmd.args.join(" ");
                if item.trim().is_empty() {
                    return Err(missing().into());
                }
                self.economy.use_item(user, &item).await
            }
            CommandKind::Transfer => {
                let candidates =
                    parser::transfer_candidates(&cmd.args, &economy.currency, &spec.usage)?;
                let (arg, target) = self.pick_transfer_split(candidates).await?;
                self.economy.transfer(user, arg, &target).await
            }
            CommandKind::Inventory => self.economy.inventory(user).await,
            CommandKind::Balance => self.economy.balance(user).await,
            CommandKind::Describe => {
                let item = cmd.args.join(" ");
                if item.trim().is_empty() {
                    return Err(missing().into());
                }
                self.economy.describe(&item).await
            }
            CommandKind::Shop => self.economy.shop().await,
            CommandKind::Dice => {
                let spec = DiceSpec::parse(&cmd.args.join(""), &self.dice)?;
                Ok(spec.roll().to_string())
            }
            CommandKind::Help => Ok(self.help_text()),
        }
    }

    /// First candidate whose target is on the roster, else the last one so
    /// the transfer reports the usual unknown-target error.
    async fn pick_transfer_split(
        &self,
        mut candidates: Vec<(TransferArg, String)>,
    ) -> Result<(TransferArg, String)> {
        let last = candidates.pop().ok_or(ParseError::NoCommand)?;
        for (arg, target) in candidates {
            match self.economy.store().find_user_by_name(&target).await {
                Ok(_) => return Ok((arg, target)),
                Err(BotError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(last)
    }

    fn help_text(&self) -> String {
        let mut lines = vec!["[사용 가능한 명령어]".to_string()];
        for spec in self.registry.commands() {
            lines.push(format!("{} - {}", spec.usage, spec.description));
        }
        lines.join("\n")
    }
}
