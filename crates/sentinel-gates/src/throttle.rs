//! Throttle state store.
//!
//! One `ThrottleState` per (symbol, side, strategy_key) channel. Each key owns
//! its own mutex so a whole check-and-update in the signal gate is atomic per
//! channel while unrelated channels proceed in parallel.
//!
//! BUY and SELL keys of a symbol are separate entries. The only operation
//! touching both is the config-change force, which locks BUY then SELL.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sentinel_core::{Price, Side, Symbol};

use crate::error::GateResult;

/// Channel identity for throttling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThrottleKey {
    pub symbol: Symbol,
    pub side: Side,
    pub strategy_key: String,
}

impl ThrottleKey {
    pub fn new(symbol: Symbol, side: Side, strategy_key: impl Into<String>) -> Self {
        Self {
            symbol,
            side,
            strategy_key: strategy_key.into(),
        }
    }
}

/// Persisted throttle state of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleState {
    /// Price at the last emitted alert.
    pub baseline_price: Price,
    /// Unix ms of the last emitted alert.
    pub last_sent_at: Option<u64>,
    /// Hash of the strategy parameters the state was last aligned with.
    pub config_hash: u64,
    /// Next evaluation emits regardless of time and price gates.
    pub force_next_signal: bool,
}

type Slot = Arc<Mutex<Option<ThrottleState>>>;

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(flatten)]
    key: ThrottleKey,
    state: ThrottleState,
}

/// Concurrent store of throttle states.
#[derive(Default)]
pub struct ThrottleStore {
    slots: DashMap<ThrottleKey, Slot>,
}

impl ThrottleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &ThrottleKey) -> Slot {
        // Clone the Arc out so the shard lock is released before the key lock
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Run `f` with exclusive access to the state of `key`.
    ///
    /// `None` means the channel has never been evaluated.
    pub fn with_state<R>(
        &self,
        key: &ThrottleKey,
        f: impl FnOnce(&mut Option<ThrottleState>) -> R,
    ) -> R {
        let slot = self.slot(key);
        let mut guard = slot.lock();
        f(&mut guard)
    }

    /// Copy of the current state of `key`.
    pub fn get(&self, key: &ThrottleKey) -> Option<ThrottleState> {
        self.slots.get(key).and_then(|slot| slot.lock().clone())
    }

    /// Force the next signal on both sides of `symbol` for `strategy_key`.
    ///
    /// Both keys are locked (BUY then SELL) before either flag is set. Only
    /// existing states are touched; baselines and timestamps are never copied
    /// between sides. Returns the number of states flagged.
    pub fn force_next_signal(&self, symbol: &Symbol, strategy_key: &str) -> usize {
        self.update_both_sides(symbol, strategy_key, |state| {
            state.force_next_signal = true;
            true
        })
    }

    /// Align both sides of `symbol` with a new strategy config hash.
    ///
    /// Any existing state whose hash differs gets `force_next_signal` set and
    /// the new hash stored. Returns true if at least one state changed.
    pub fn apply_config_hash(&self, symbol: &Symbol, strategy_key: &str, hash: u64) -> bool {
        let changed = self.update_both_sides(symbol, strategy_key, |state| {
            if state.config_hash == hash {
                return false;
            }
            state.config_hash = hash;
            state.force_next_signal = true;
            true
        });

        if changed > 0 {
            info!(
                symbol = %symbol,
                strategy = strategy_key,
                config_hash = hash,
                sides = changed,
                "Strategy config changed, next signal forced"
            );
        }
        changed > 0
    }

    fn update_both_sides(
        &self,
        symbol: &Symbol,
        strategy_key: &str,
        mut f: impl FnMut(&mut ThrottleState) -> bool,
    ) -> usize {
        let slots: Vec<Slot> = Side::ALL
            .iter()
            .map(|side| self.slot(&ThrottleKey::new(symbol.clone(), *side, strategy_key)))
            .collect();
        let mut guards: Vec<_> = slots.iter().map(|slot| slot.lock()).collect();

        let mut changed = 0;
        for guard in guards.iter_mut() {
            if let Some(state) = guard.as_mut() {
                if f(state) {
                    changed += 1;
                }
            }
        }
        changed
    }

    /// All initialized states.
    pub fn snapshot(&self) -> Vec<(ThrottleKey, ThrottleState)> {
        self.slots
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .lock()
                    .clone()
                    .map(|state| (entry.key().clone(), state))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write all states to `path` as JSON.
    pub fn save_snapshot(&self, path: &Path) -> GateResult<()> {
        let entries: Vec<SnapshotEntry> = self
            .snapshot()
            .into_iter()
            .map(|(key, state)| SnapshotEntry { key, state })
            .collect();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&entries)?)?;
        std::fs::rename(&tmp, path)?;

        debug!(path = %path.display(), states = entries.len(), "Throttle snapshot saved");
        Ok(())
    }

    /// Load states from a snapshot. A missing file yields an empty store.
    pub fn load_snapshot(path: &Path) -> GateResult<Self> {
        let store = Self::new();
        if !path.exists() {
            return Ok(store);
        }

        let bytes = std::fs::read(path)?;
        let entries: Vec<SnapshotEntry> = serde_json::from_slice(&bytes)?;
        let count = entries.len();
        for entry in entries {
            store
                .slots
                .insert(entry.key, Arc::new(Mutex::new(Some(entry.state))));
        }

        info!(path = %path.display(), states = count, "Throttle snapshot loaded");
        Ok(store)
    }
}
