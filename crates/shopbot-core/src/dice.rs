use rand::Rng;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::config::DiceConfig;
use crate::parser::ParseError;

fn dice_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)[dD](\d+)(?:([<>])(\d+))?$").unwrap())
}

/// `true` when `expr` (whitespace already removed) looks like `NdM[<>K]`.
pub fn is_dice_expression(expr: &str) -> bool {
    dice_re().is_match(expr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// `<N`: a roll of N or less succeeds.
    AtMost(u32),
    /// `>N`: a roll of N or more succeeds.
    AtLeast(u32),
}

impl Threshold {
    fn passes(self, roll: u32) -> bool {
        match self {
            Self::AtMost(n) => roll <= n,
            Self::AtLeast(n) => roll >= n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceSpec {
    pub count: u32,
    pub sides: u32,
    pub threshold: Option<Threshold>,
}

impl DiceSpec {
    /// Parse `NdM`, `NdM<K` or `NdM>K` and check it against the configured
    /// limits. An empty expression means `1d6`.
    pub fn parse(expr: &str, limits: &DiceConfig) -> Result<Self, ParseError> {
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Ok(Self {
                count: 1,
                sides: 6,
                threshold: None,
            });
        }
        let caps = dice_re()
            .captures(&compact)
            .ok_or_else(|| ParseError::MalformedDice(compact.clone()))?;

        let number = |i: usize| -> Result<u32, ParseError> {
            caps[i]
                .parse::<u32>()
                .map_err(|_| ParseError::InvalidNumber(caps[i].to_string()))
        };
        let count = number(1)?;
        let sides = number(2)?;

        check_range("주사위 개수", count, 1, limits.max_count)?;
        check_range("주사위 면 수", sides, 2, limits.max_sides)?;

        let threshold = match caps.get(3).map(|m| m.as_str()) {
            Some(op) => {
                let n = number(4)?;
                check_range("기준값", n, 1, sides)?;
                Some(if op == "<" {
                    Threshold::AtMost(n)
                } else {
                    Threshold::AtLeast(n)
                })
            }
            None => None,
        };

        Ok(Self {
            count,
            sides,
            threshold,
        })
    }

    pub fn roll(&self) -> DiceRoll {
        self.roll_with(&mut rand::thread_rng())
    }

    pub fn roll_with<R: Rng + ?Sized>(&self, rng: &mut R) -> DiceRoll {
        let rolls = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();
        DiceRoll {
            spec: *self,
            rolls,
        }
    }
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<(), ParseError> {
    if value < min || value > max {
        return Err(ParseError::OutOfRange {
            name: name.to_string(),
            value: i64::from(value),
            min: i64::from(min),
            max: i64::from(max),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceRoll {
    pub spec: DiceSpec,
    pub rolls: Vec<u32>,
}

impl DiceRoll {
    pub fn total(&self) -> u64 {
        self.rolls.iter().map(|r| u64::from(*r)).sum()
    }

    pub fn successes(&self) -> Option<usize> {
        let t = self.spec.threshold?;
        Some(self.rolls.iter().filter(|r| t.passes(**r)).count())
    }
}

impl fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.rolls.as_slice(), self.spec.threshold) {
            ([single], None) => write!(f, "{single}"),
            ([single], Some(t)) => {
                let verdict = if t.passes(*single) { "성공" } else { "실패" };
                write!(f, "{single}\n[{verdict}]")
            }
            (rolls, threshold) => {
                let list = rolls
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                match threshold {
                    None => write!(f, "{list}\n합계: {}", self.total()),
                    Some(_) => {
                        let ok = self.successes().unwrap_or(0);
                        write!(
                            f,
                            "{list}\n[성공/실패] 성공: {ok}개, 실패: {}개",
                            rolls.len() - ok
                        )
                    }
                }
            }
        }
    }
}
