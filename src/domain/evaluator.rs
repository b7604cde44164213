//! Policy evaluation: signals first, then per-asset policy trees.
//!
//! Evaluation is a strict two-pass process. `compute_signals` resolves
//! every registered signal against the day's asset/portfolio/market
//! snapshots; `check_policy` then combines the pre-computed booleans
//! through each policy's AND-of-OR tree. The policy pass takes the
//! [`SignalResults`] by reference, so it cannot run before the signal
//! pass has produced them.
//!
//! Missing assets or fields evaluate to false, never an error.

use std::collections::{BTreeMap, HashMap};

use crate::domain::policy::{PolicyKind, PolicyRegistry};
use crate::domain::signal::{Scope, Signal};

/// Field → value snapshot for one entity (an asset, the portfolio, or
/// the market).
pub type InfoMap = HashMap<String, f64>;

/// Per-asset decision for one simulated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Exit,
    Hold,
    Enter,
}

impl Action {
    pub fn as_i8(self) -> i8 {
        match self {
            Action::Exit => -1,
            Action::Hold => 0,
            Action::Enter => 1,
        }
    }
}

/// Precedence when an entry and an exit policy fire for the same asset
/// on the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Entry wins. Matches the original evaluation order, where entry
    /// policies were checked after exit policies.
    #[default]
    EntryOverridesExit,
    ExitOverridesEntry,
}

impl std::str::FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entry_overrides_exit" => Ok(TieBreak::EntryOverridesExit),
            "exit_overrides_entry" => Ok(TieBreak::ExitOverridesEntry),
            other => Err(format!("unknown tie_break: {other}")),
        }
    }
}

/// Boolean outcome of every registered signal for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalResults {
    /// asset → signal name → outcome
    pub asset: BTreeMap<String, BTreeMap<String, bool>>,
    /// signal name → outcome
    pub portfolio: BTreeMap<String, bool>,
    /// signal name → outcome
    pub market: BTreeMap<String, bool>,
}

/// Final actions and the policies that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayDecision {
    pub actions: BTreeMap<String, Action>,
    /// asset → names of every policy that evaluated true.
    pub conditions: BTreeMap<String, Vec<String>>,
}

pub struct PolicyEvaluator<'a> {
    registry: &'a PolicyRegistry,
    tie_break: TieBreak,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(registry: &'a PolicyRegistry, tie_break: TieBreak) -> Self {
        Self {
            registry,
            tie_break,
        }
    }

    /// Run both passes for one day.
    pub fn evaluate_day(
        &self,
        assets: &[String],
        asset_info: &HashMap<String, InfoMap>,
        portfolio_info: &InfoMap,
        market_info: Option<&InfoMap>,
    ) -> (SignalResults, DayDecision) {
        let results = self.compute_signals(assets, asset_info, portfolio_info, market_info);
        let decision = self.decide(assets, &results);
        (results, decision)
    }

    /// First pass: evaluate every registered signal.
    pub fn compute_signals(
        &self,
        assets: &[String],
        asset_info: &HashMap<String, InfoMap>,
        portfolio_info: &InfoMap,
        market_info: Option<&InfoMap>,
    ) -> SignalResults {
        let mut asset_results: BTreeMap<String, BTreeMap<String, bool>> = BTreeMap::new();
        for asset in assets {
            let mut per_signal = BTreeMap::new();
            for (name, signal) in self.registry.signals(Scope::Asset) {
                let outcome = asset_info
                    .get(asset)
                    .map(|info| check_against(signal, info))
                    .unwrap_or(false);
                per_signal.insert(name.clone(), outcome);
            }
            asset_results.insert(asset.clone(), per_signal);
        }

        let portfolio = self
            .registry
            .signals(Scope::Portfolio)
            .iter()
            .map(|(name, signal)| (name.clone(), check_against(signal, portfolio_info)))
            .collect();

        let market = self
            .registry
            .signals(Scope::Market)
            .iter()
            .map(|(name, signal)| {
                let outcome = market_info
                    .map(|info| check_against(signal, info))
                    .unwrap_or(false);
                (name.clone(), outcome)
            })
            .collect();

        SignalResults {
            asset: asset_results,
            portfolio,
            market,
        }
    }

    /// Second pass: evaluate one policy's tree for one asset against the
    /// pre-computed signal results.
    pub fn check_policy(&self, policy_name: &str, asset: &str, results: &SignalResults) -> bool {
        let Some(policy) = self
            .registry
            .policies()
            .iter()
            .find(|p| p.name == policy_name)
        else {
            return false;
        };

        policy.scopes.iter().all(|(scope, tree)| {
            tree.evaluate(|signal_name| self.leaf_value(*scope, signal_name, asset, results))
        })
    }

    fn leaf_value(
        &self,
        scope: Scope,
        signal_name: &str,
        asset: &str,
        results: &SignalResults,
    ) -> bool {
        match scope {
            Scope::Asset => results
                .asset
                .get(asset)
                .and_then(|per_signal| per_signal.get(signal_name))
                .copied()
                .unwrap_or(false),
            Scope::Portfolio => results.portfolio.get(signal_name).copied().unwrap_or(false),
            Scope::Market => {
                // A market signal restricted to specific assets reads as
                // false for every other asset.
                let Some(signal) = self.registry.signal(Scope::Market, signal_name) else {
                    return false;
                };
                if !signal.assets_to_consider.applies_to(asset) {
                    return false;
                }
                results.market.get(signal_name).copied().unwrap_or(false)
            }
        }
    }

    fn decide(&self, assets: &[String], results: &SignalResults) -> DayDecision {
        let mut actions = BTreeMap::new();
        let mut conditions = BTreeMap::new();

        for asset in assets {
            let mut entry_fired = false;
            let mut exit_fired = false;
            let mut contributing = Vec::new();

            for policy in self.registry.policies() {
                if !self.check_policy(&policy.name, asset, results) {
                    continue;
                }
                contributing.push(policy.name.clone());
                match policy.kind {
                    PolicyKind::Entry => entry_fired = true,
                    PolicyKind::Exit => exit_fired = true,
                }
            }

            let action = match (entry_fired, exit_fired) {
                (false, false) => Action::Hold,
                (true, false) => Action::Enter,
                (false, true) => Action::Exit,
                (true, true) => match self.tie_break {
                    TieBreak::EntryOverridesExit => Action::Enter,
                    TieBreak::ExitOverridesEntry => Action::Exit,
                },
            };

            actions.insert(asset.clone(), action);
            conditions.insert(asset.clone(), contributing);
        }

        DayDecision {
            actions,
            conditions,
        }
    }
}

/// Evaluate one signal against a field snapshot. A missing field is
/// false; relative signals resolve their comparison field from the same
/// snapshot.
fn check_against(signal: &Signal, info: &InfoMap) -> bool {
    let Some(&current) = info.get(&signal.field) else {
        return false;
    };
    let relative = signal
        .comparison_field
        .as_ref()
        .and_then(|field| info.get(field))
        .copied();
    signal.check(current, relative)
}
