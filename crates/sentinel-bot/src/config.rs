//! Application configuration.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sentinel_core::{Indicator, Price, Size, Symbol};
use sentinel_executor::{
    ChannelConfig, FillPollerConfig, InstrumentSpec, ProtectionParams, ReconcilerConfig,
    SymbolSettings,
};
use sentinel_gates::{SignalGateConfig, StrategyThrottle, TradeGateConfig};

use crate::error::{AppError, AppResult};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SENTINEL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Signal gate only: alerts are evaluated and recorded, nothing is traded.
    #[default]
    Observation,
    /// Full pipeline.
    Trading,
}

/// Strategy parameters shared by every symbol that names the strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum absolute price move (percent) since the last alert.
    pub min_price_change_pct: Decimal,
    /// Stop-loss distance in percent. Protection needs both distances.
    #[serde(default)]
    pub sl_pct: Option<Decimal>,
    /// Take-profit distance in percent.
    #[serde(default)]
    pub tp_pct: Option<Decimal>,
    #[serde(default)]
    pub required_indicators: Vec<Indicator>,
}

impl StrategyConfig {
    /// Stable fingerprint of the parameters. Any change forces the next signal.
    pub fn config_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.min_price_change_pct.normalize().to_string().hash(&mut hasher);
        self.sl_pct.map(|d| d.normalize().to_string()).hash(&mut hasher);
        self.tp_pct.map(|d| d.normalize().to_string()).hash(&mut hasher);
        self.required_indicators.hash(&mut hasher);
        hasher.finish()
    }

    pub fn protection(&self) -> Option<ProtectionParams> {
        Some(ProtectionParams {
            sl_pct: self.sl_pct?,
            tp_pct: self.tp_pct?,
        })
    }
}

/// One traded/alerted symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    /// Key into `strategies`.
    pub strategy: String,
    #[serde(default = "default_true")]
    pub alert_enabled: bool,
    #[serde(default)]
    pub trade_enabled: bool,
    /// Quote amount per order.
    #[serde(default)]
    pub trade_amount: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    #[serde(default = "default_qty_decimals")]
    pub qty_decimals: u32,
    pub tick_size: Decimal,
}

fn default_true() -> bool {
    true
}

fn default_qty_decimals() -> u32 {
    3
}

impl SymbolConfig {
    pub fn instrument_spec(&self) -> InstrumentSpec {
        InstrumentSpec {
            step_size: Size::new(self.step_size),
            min_qty: Size::new(self.min_qty),
            qty_decimals: self.qty_decimals,
            tick_size: Price::new(self.tick_size),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerSection {
    #[serde(default = "default_max_orders_per_cycle")]
    pub max_orders_per_cycle: usize,
}

fn default_max_orders_per_cycle() -> usize {
    ReconcilerConfig::default().max_orders_per_cycle
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            max_orders_per_cycle: default_max_orders_per_cycle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Records buffered before a journal flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_buffer_size() -> usize {
    100
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl PersistenceConfig {
    pub fn throttle_snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("throttle_state.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Open-order polls an entry order survives before it fills.
    #[serde(default = "default_fill_after_polls")]
    pub fill_after_polls: u32,
}

fn default_fill_after_polls() -> u32 {
    2
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            fill_after_polls: default_fill_after_polls(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: OperatingMode,

    /// Scheduler tick. Default: 60s.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Reconciler cycle. Default: 5s.
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,

    #[serde(default)]
    pub signal: SignalGateConfig,

    #[serde(default)]
    pub trade: TradeGateConfig,

    #[serde(default)]
    pub fill_poll: FillPollerConfig,

    #[serde(default)]
    pub reconciler: ReconcilerSection,

    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyConfig>,

    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// JSON file the evaluator writes decisions to.
    #[serde(default = "default_signals_path")]
    pub signals_path: String,

    #[serde(default)]
    pub paper: PaperConfig,
}

fn default_tick_interval_ms() -> u64 {
    60_000
}

fn default_reconcile_interval_ms() -> u64 {
    5_000
}

fn default_signals_path() -> String {
    "data/signals.json".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::default(),
            tick_interval_ms: default_tick_interval_ms(),
            reconcile_interval_ms: default_reconcile_interval_ms(),
            signal: SignalGateConfig::default(),
            trade: TradeGateConfig::default(),
            fill_poll: FillPollerConfig::default(),
            reconciler: ReconcilerSection::default(),
            strategies: BTreeMap::new(),
            symbols: Vec::new(),
            persistence: PersistenceConfig::default(),
            signals_path: default_signals_path(),
            paper: PaperConfig::default(),
        }
    }
}

impl AppConfig {
    /// Config path: CLI argument, then `SENTINEL_CONFIG`, then the default.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load and validate a config file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.tick_interval_ms == 0 {
            return Err(AppError::Config("tick_interval_ms must be > 0".to_string()));
        }
        if self.reconcile_interval_ms == 0 {
            return Err(AppError::Config("reconcile_interval_ms must be > 0".to_string()));
        }
        if self.fill_poll.max_attempts == 0 {
            return Err(AppError::Config("fill_poll.max_attempts must be > 0".to_string()));
        }
        if self.reconciler.max_orders_per_cycle == 0 {
            return Err(AppError::Config(
                "reconciler.max_orders_per_cycle must be > 0".to_string(),
            ));
        }

        for (key, strategy) in &self.strategies {
            if strategy.min_price_change_pct < Decimal::ZERO {
                return Err(AppError::Config(format!(
                    "strategy {key}: min_price_change_pct must be >= 0"
                )));
            }
            let negative = |v: Option<Decimal>| v.map_or(false, |d| d <= Decimal::ZERO);
            if negative(strategy.sl_pct) || negative(strategy.tp_pct) {
                return Err(AppError::Config(format!(
                    "strategy {key}: sl_pct/tp_pct must be > 0"
                )));
            }
        }

        let mut seen = HashSet::new();
        for s in &self.symbols {
            if !seen.insert(s.symbol.as_str()) {
                return Err(AppError::Config(format!("duplicate symbol {}", s.symbol)));
            }
            if !self.strategies.contains_key(&s.strategy) {
                return Err(AppError::Config(format!(
                    "symbol {}: unknown strategy {}",
                    s.symbol, s.strategy
                )));
            }
            if s.step_size <= Decimal::ZERO || s.min_qty <= Decimal::ZERO || s.tick_size <= Decimal::ZERO
            {
                return Err(AppError::Config(format!(
                    "symbol {}: step_size, min_qty and tick_size must be > 0",
                    s.symbol
                )));
            }
            if s.trade_amount < Decimal::ZERO {
                return Err(AppError::Config(format!(
                    "symbol {}: trade_amount must be >= 0",
                    s.symbol
                )));
            }
        }
        Ok(())
    }

    pub fn is_trading(&self) -> bool {
        self.mode == OperatingMode::Trading
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            interval_ms: self.reconcile_interval_ms,
            max_orders_per_cycle: self.reconciler.max_orders_per_cycle,
        }
    }

    /// Per-symbol channel settings. Symbols with an unknown strategy are
    /// dropped (validation rejects them at load).
    pub fn channels(&self) -> HashMap<Symbol, ChannelConfig> {
        self.symbols
            .iter()
            .filter_map(|s| {
                let strategy = self.strategies.get(&s.strategy)?;
                let channel = ChannelConfig {
                    strategy: StrategyThrottle {
                        strategy_key: s.strategy.clone(),
                        min_price_change_pct: strategy.min_price_change_pct,
                        config_hash: strategy.config_hash(),
                    },
                    alert_enabled: s.alert_enabled,
                    trade_enabled: s.trade_enabled,
                    trade_amount: s.trade_amount,
                    required_indicators: strategy.required_indicators.clone(),
                };
                Some((Symbol::new(s.symbol.clone()), channel))
            })
            .collect()
    }

    pub fn symbol_settings(&self) -> HashMap<Symbol, SymbolSettings> {
        self.symbols
            .iter()
            .map(|s| {
                let protection = self
                    .strategies
                    .get(&s.strategy)
                    .and_then(StrategyConfig::protection);
                (
                    Symbol::new(s.symbol.clone()),
                    SymbolSettings {
                        spec: s.instrument_spec(),
                        protection,
                    },
                )
            })
            .collect()
    }
}
