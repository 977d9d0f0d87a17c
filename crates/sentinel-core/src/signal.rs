//! Evaluator output: the per-cycle decision snapshot for one symbol.
//!
//! The evaluator itself lives outside this workspace; these types are the
//! contract it produces. Indicator checks are tri-state: `Unknown` means the
//! evaluator could not compute the check and is never read as `Fail`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Price, Side, Symbol};

/// Strategy verdict for a symbol in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    Wait,
}

impl Decision {
    /// Channel side this decision targets, if any.
    pub fn side(&self) -> Option<Side> {
        match self {
            Self::Buy => Some(Side::Buy),
            Self::Sell => Some(Side::Sell),
            Self::Wait => None,
        }
    }

    /// True if this decision requests the given side.
    pub fn matches(&self, side: Side) -> bool {
        self.side() == Some(side)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Wait => write!(f, "WAIT"),
        }
    }
}

/// Outcome of a single indicator check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    Pass,
    Fail,
    /// Indicator not available this cycle.
    #[default]
    Unknown,
}

impl Check {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<Option<bool>> for Check {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Pass,
            Some(false) => Self::Fail,
            None => Self::Unknown,
        }
    }
}

/// Named indicator checks the evaluator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Rsi,
    EmaTrend,
    Volume,
    Volatility,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsi => write!(f, "rsi"),
            Self::EmaTrend => write!(f, "ema_trend"),
            Self::Volume => write!(f, "volume"),
            Self::Volatility => write!(f, "volatility"),
        }
    }
}

/// Per-indicator results attached to a decision.
///
/// Fields missing from the evaluator payload deserialize as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalReasons {
    pub rsi: Check,
    pub ema_trend: Check,
    pub volume: Check,
    pub volatility: Check,
}

impl SignalReasons {
    /// All checks passed.
    pub fn all_pass() -> Self {
        Self {
            rsi: Check::Pass,
            ema_trend: Check::Pass,
            volume: Check::Pass,
            volatility: Check::Pass,
        }
    }

    pub fn get(&self, indicator: Indicator) -> Check {
        match indicator {
            Indicator::Rsi => self.rsi,
            Indicator::EmaTrend => self.ema_trend,
            Indicator::Volume => self.volume,
            Indicator::Volatility => self.volatility,
        }
    }

    /// Required indicators whose value is `Unknown`.
    pub fn missing(&self, required: &[Indicator]) -> Vec<Indicator> {
        required
            .iter()
            .copied()
            .filter(|i| self.get(*i).is_unknown())
            .collect()
    }
}

/// Decision snapshot produced once per cycle per symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub symbol: Symbol,
    pub decision: Decision,
    pub price: Price,
    #[serde(default)]
    pub reasons: SignalReasons,
}

impl SignalDecision {
    pub fn new(symbol: Symbol, decision: Decision, price: Price) -> Self {
        Self {
            symbol,
            decision,
            price,
            reasons: SignalReasons::default(),
        }
    }

    #[must_use]
    pub fn with_reasons(mut self, reasons: SignalReasons) -> Self {
        self.reasons = reasons;
        self
    }

    /// Channel side targeted by this decision (None for WAIT).
    pub fn side(&self) -> Option<Side> {
        self.decision.side()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_is_not_fail() {
        let reasons = SignalReasons {
            rsi: Check::Fail,
            ema_trend: Check::Unknown,
            ..SignalReasons::all_pass()
        };
        assert_eq!(
            reasons.missing(&[Indicator::Rsi, Indicator::EmaTrend]),
            vec![Indicator::EmaTrend]
        );
    }

    #[test]
    fn test_reasons_missing_fields_deserialize_unknown() {
        let reasons: SignalReasons = serde_json::from_str(r#"{"rsi":"pass"}"#).unwrap();
        assert_eq!(reasons.rsi, Check::Pass);
        assert_eq!(reasons.volume, Check::Unknown);
    }

    #[test]
    fn test_check_from_option() {
        assert_eq!(Check::from(Some(true)), Check::Pass);
        assert_eq!(Check::from(Some(false)), Check::Fail);
        assert_eq!(Check::from(None), Check::Unknown);
    }

    #[test]
    fn test_decision_side() {
        assert_eq!(Decision::Buy.side(), Some(Side::Buy));
        assert!(Decision::Sell.matches(Side::Sell));
        assert!(!Decision::Wait.matches(Side::Buy));
    }
}
