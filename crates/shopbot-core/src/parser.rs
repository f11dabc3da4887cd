//! Bracketed command parsing.
//!
//! Everything here is pure: a toot body goes in, an [`Invocation`] or a
//! [`ParseError`] comes out. Handler-specific argument shapes (item and
//! quantity, transfer payload and target) are parsed by the helpers at the
//! bottom of the module.

use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use thiserror::Error;

use crate::dice::is_dice_expression;

/// Command name a bare dice expression (`[2d6]`) maps to.
pub const DICE_COMMAND: &str = "다이스";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no bracketed command in message")]
    NoCommand,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("'{command}' is missing arguments (usage: {usage})")]
    MissingArguments { command: String, usage: String },

    #[error("{name} {value} is outside {min}..={max}")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("malformed dice expression '{0}'")]
    MalformedDice(String),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),
}

impl ParseError {
    /// Reply text that tells the user how to fix the command.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoCommand => {
                "명령어를 찾을 수 없습니다. [도움말]로 사용 가능한 명령어를 확인해 주세요.".into()
            }
            Self::UnknownCommand(name) => format!(
                "[{name}]은(는) 알 수 없는 명령어입니다. [도움말]로 사용 가능한 명령어를 확인해 주세요."
            ),
            Self::MissingArguments { command, usage } => {
                format!("[{command}] 명령어의 형식이 올바르지 않습니다.\n예시: {usage}")
            }
            Self::OutOfRange {
                name,
                value,
                min,
                max,
            } => format!("{name}은(는) {min}에서 {max} 사이여야 합니다. (입력: {value})"),
            Self::MalformedDice(expr) => format!(
                "다이스 형식이 올바르지 않습니다: {expr}\n예시: [1d100], [2d6<4], [다이스/1d20>15]"
            ),
            Self::InvalidNumber(token) => format!("'{token}'은(는) 올바른 숫자가 아닙니다."),
        }
    }
}

/// The name and raw argument tokens of one bracketed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Lowercased command token, not yet resolved against the registry.
    pub name: String,
    pub args: Vec<String>,
}

/// Return the contents of the first `[...]` span in `text`, trimmed.
pub fn extract_bracket(text: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\[([^\[\]]+)\]").unwrap());
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

/// Split a bracket body into tokens: on `/` when the body contains one,
/// otherwise on whitespace. Empty tokens are dropped.
pub fn tokenize(body: &str) -> Vec<String> {
    let parts: Vec<&str> = if body.contains('/') {
        body.split('/').collect()
    } else {
        body.split_whitespace().collect()
    };
    parts
        .into_iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Parse the first bracketed command in `text`.
pub fn parse_invocation(text: &str) -> Result<Invocation, ParseError> {
    let body = extract_bracket(text).ok_or(ParseError::NoCommand)?;

    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if is_dice_expression(&compact) {
        return Ok(Invocation {
            name: DICE_COMMAND.to_string(),
            args: vec![compact],
        });
    }

    let mut tokens = tokenize(body).into_iter();
    let name = tokens.next().ok_or(ParseError::NoCommand)?.to_lowercase();
    Ok(Invocation {
        name,
        args: tokens.collect(),
    })
}

/// Parse `<item name> [N[개]]` where the quantity, if present, is the last
/// token. Returns the item name and quantity (default 1) checked against
/// `range`.
pub fn parse_item_and_quantity(
    command: &str,
    args: &[String],
    range: RangeInclusive<i64>,
    usage: &str,
) -> Result<(String, u32), ParseError> {
    static QTY: OnceLock<Regex> = OnceLock::new();
    let qty_re = QTY.get_or_init(|| Regex::new(r"^(-?\d+)\s*개?$").unwrap());

    let missing = || ParseError::MissingArguments {
        command: command.to_string(),
        usage: usage.to_string(),
    };

    // `3 개` in whitespace form arrives as two tokens.
    let joined;
    let (last, rest): (&str, &[String]) = match args {
        [rest @ .., n, unit]
            if !rest.is_empty() && unit.trim() == "개" && qty_re.is_match(n.trim()) =>
        {
            joined = format!("{}개", n.trim());
            (joined.as_str(), rest)
        }
        [rest @ .., last] => (last.as_str(), rest),
        [] => return Err(missing()),
    };

    let (name_tokens, qty) = match qty_re.captures(last.trim()) {
        Some(caps) if !rest.is_empty() => {
            let raw = &caps[1];
            let qty: i64 = raw
                .parse()
                .map_err(|_| ParseError::InvalidNumber(raw.to_string()))?;
            (rest, qty)
        }
        _ => (args, 1),
    };

    let name = name_tokens.join(" ").trim().to_string();
    if name.is_empty() {
        return Err(missing());
    }
    if !range.contains(&qty) {
        return Err(ParseError::OutOfRange {
            name: "수량".into(),
            value: qty,
            min: *range.start(),
            max: *range.end(),
        });
    }
    let qty = u32::try_from(qty).map_err(|_| ParseError::InvalidNumber(qty.to_string()))?;
    Ok((name, qty))
}

/// Payload of a transfer as written by the user, before any lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferArg {
    Item(String),
    Currency(i64),
}

/// Parse `<item|N<currency>> <target>`. The payload is the first token; the
/// remaining tokens form the target's display name.
pub fn parse_transfer_args(
    args: &[String],
    currency: &str,
    usage: &str,
) -> Result<(TransferArg, String), ParseError> {
    let missing = || ParseError::MissingArguments {
        command: "양도".into(),
        usage: usage.to_string(),
    };
    let (payload, target) = match args {
        [payload, target @ ..] if !target.is_empty() => (payload.trim(), target.join(" ")),
        _ => return Err(missing()),
    };
    let target = target.trim().to_string();
    if payload.is_empty() || target.is_empty() {
        return Err(missing());
    }

    let arg = match currency_amount(payload, currency) {
        Some(amount) => {
            let amount: i64 = amount
                .parse()
                .map_err(|_| ParseError::InvalidNumber(amount.to_string()))?;
            TransferArg::Currency(amount)
        }
        None => TransferArg::Item(payload.to_string()),
    };
    Ok((arg, target))
}

/// Every payload/target split of `args`, longest payload first. The last
/// entry is the split [`parse_transfer_args`] makes. Whitespace form cannot
/// mark where a multi-word item name ends, so the caller picks the first
/// split whose target is a known name.
pub fn transfer_candidates(
    args: &[String],
    currency: &str,
    usage: &str,
) -> Result<Vec<(TransferArg, String)>, ParseError> {
    if args.len() <= 2 {
        return Ok(vec![parse_transfer_args(args, currency, usage)?]);
    }
    (1..args.len())
        .rev()
        .map(|k| {
            let mut split = vec![args[..k].join(" ")];
            split.extend_from_slice(&args[k..]);
            parse_transfer_args(&split, currency, usage)
        })
        .collect()
}

/// `"100갈레온"` → `Some("100")` when `currency` is `"갈레온"`.
fn currency_amount<'a>(token: &'a str, currency: &str) -> Option<&'a str> {
    if currency.is_empty() {
        return None;
    }
    let digits = token.strip_suffix(currency)?.trim();
    let unsigned = digits.strip_prefix('-').unwrap_or(digits);
    (!unsigned.is_empty() && unsigned.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_first_bracket_only() {
        assert_eq!(
            extract_bracket("@bot 안녕 [구매 사과 3개] [사용 사과]"),
            Some("구매 사과 3개")
        );
        assert_eq!(extract_bracket("no command here"), None);
        assert_eq!(extract_bracket("[   ]"), None);
    }

    #[test]
    fn whitespace_and_slash_delimiters_are_equivalent() {
        let a = parse_invocation("[구매  사과   3개]").unwrap();
        let b = parse_invocation("[구매/사과/3개]").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "구매");
        assert_eq!(a.args, args(&["사과", "3개"]));
    }

    #[test]
    fn slash_form_keeps_spaces_inside_tokens() {
        let inv = parse_invocation("[양도/ 별빛  사탕 /홍 길동]").unwrap();
        assert_eq!(inv.args, args(&["별빛 사탕", "홍 길동"]));
    }

    #[test]
    fn command_names_are_lowercased() {
        let inv = parse_invocation("[BUY apple]").unwrap();
        assert_eq!(inv.name, "buy");
    }

    #[test]
    fn bare_dice_maps_to_dice_command() {
        let inv = parse_invocation("[2d6<4]").unwrap();
        assert_eq!(inv.name, DICE_COMMAND);
        assert_eq!(inv.args, args(&["2d6<4"]));

        let inv = parse_invocation("[다이스/1d20>15]").unwrap();
        assert_eq!(inv.name, DICE_COMMAND);
        assert_eq!(inv.args, args(&["1d20>15"]));
    }

    #[test]
    fn missing_bracket_is_no_command() {
        assert_eq!(parse_invocation("hello"), Err(ParseError::NoCommand));
    }

    #[test]
    fn quantity_suffix_variants() {
        let r = 1..=100;
        assert_eq!(
            parse_item_and_quantity("구매", &args(&["사과", "3개"]), r.clone(), "").unwrap(),
            ("사과".into(), 3)
        );
        assert_eq!(
            parse_item_and_quantity("구매", &args(&["사과", "3"]), r.clone(), "").unwrap(),
            ("사과".into(), 3)
        );
        assert_eq!(
            parse_item_and_quantity("구매", &args(&["별빛", "사탕"]), r.clone(), "").unwrap(),
            ("별빛 사탕".into(), 1)
        );
        assert_eq!(
            parse_item_and_quantity("구매", &args(&["사과", "3", "개"]), r.clone(), "").unwrap(),
            ("사과".into(), 3)
        );
        assert_eq!(
            parse_item_and_quantity("구매", &args(&["별빛", "사탕", "2", "개"]), r.clone(), "")
                .unwrap(),
            ("별빛 사탕".into(), 2)
        );
    }

    #[test]
    fn numeric_item_name_without_quantity_is_a_name() {
        let (name, qty) =
            parse_item_and_quantity("구매", &args(&["100"]), 1..=100, "").unwrap();
        assert_eq!(name, "100");
        assert_eq!(qty, 1);
    }

    #[test]
    fn quantity_out_of_range() {
        for bad in ["0개", "101", "-1"] {
            let err = parse_item_and_quantity("구매", &args(&["사과", bad]), 1..=100, "")
                .unwrap_err();
            assert!(matches!(err, ParseError::OutOfRange { .. }), "{bad}: {err:?}");
        }
        assert!(parse_item_and_quantity("구매", &args(&["사과", "100개"]), 1..=100, "").is_ok());
    }

    #[test]
    fn missing_item_is_missing_arguments() {
        let err = parse_item_and_quantity("구매", &[], 1..=100, "[구매 사과 3개]").unwrap_err();
        assert!(err.user_message().contains("[구매 사과 3개]"));
    }

    #[test]
    fn transfer_args_currency_and_item() {
        let (arg, target) =
            parse_transfer_args(&args(&["100갈레온", "대상유저"]), "갈레온", "").unwrap();
        assert_eq!(arg, TransferArg::Currency(100));
        assert_eq!(target, "대상유저");

        let (arg, _) = parse_transfer_args(&args(&["사과", "대상유저"]), "갈레온", "").unwrap();
        assert_eq!(arg, TransferArg::Item("사과".into()));

        let (arg, _) = parse_transfer_args(&args(&["-5갈레온", "대상"]), "갈레온", "").unwrap();
        assert_eq!(arg, TransferArg::Currency(-5));
    }

    #[test]
    fn transfer_currency_needs_exact_suffix() {
        let (arg, _) = parse_transfer_args(&args(&["100골드", "대상"]), "갈레온", "").unwrap();
        assert_eq!(arg, TransferArg::Item("100골드".into()));
    }

    #[test]
    fn transfer_requires_target() {
        assert!(matches!(
            parse_transfer_args(&args(&["사과"]), "갈레온", ""),
            Err(ParseError::MissingArguments { .. })
        ));
    }

    #[test]
    fn transfer_candidates_prefer_longest_payload() {
        let c = transfer_candidates(&args(&["별빛", "사탕", "두리"]), "갈레온", "").unwrap();
        assert_eq!(
            c,
            vec![
                (TransferArg::Item("별빛 사탕".into()), "두리".to_string()),
                (TransferArg::Item("별빛".into()), "사탕 두리".to_string()),
            ]
        );

        let c = transfer_candidates(&args(&["100", "갈레온", "두리"]), "갈레온", "").unwrap();
        assert_eq!(c[0], (TransferArg::Currency(100), "두리".to_string()));

        let c = transfer_candidates(&args(&["사과", "두리"]), "갈레온", "").unwrap();
        assert_eq!(c.len(), 1);
        assert!(transfer_candidates(&args(&["사과"]), "갈레온", "").is_err());
    }
}
