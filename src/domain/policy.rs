//! Policy registry: compiles signal and policy declarations from config.
//!
//! Signal declarations live under `[Signal_Asset]`, `[Signal_Portfolio]`
//! and `[Signal_Market]`, one signal per key:
//!
//! ```ini
//! [Signal_Asset]
//! perf_down = runningPerformance,<,false,-0.05,NONE
//! ```
//!
//! `[TradePolicyConfig]` names the entry and exit policies; each policy
//! has its own section whose keys are scope names and whose values are
//! AND-of-OR condition strings: `(SIG_A|SIG_B)(SIG_C)` means
//! AND(OR(SIG_A, SIG_B), OR(SIG_C)).
//!
//! Unknown signal names referenced by a policy are logged as warnings and
//! dropped from their OR group; a missing `[TradePolicyConfig]` section is
//! a fatal configuration error. Parsing the condition string and
//! evaluating the resulting tree are separate stages.

use std::collections::BTreeMap;

use log::warn;

use crate::domain::error::PolicybackError;
use crate::domain::signal::{AssetFilter, Operator, Scope, Signal};
use crate::ports::config_port::ConfigPort;

pub const TRADE_POLICY_SECTION: &str = "TradePolicyConfig";

const SCOPES: [Scope; 3] = [Scope::Asset, Scope::Portfolio, Scope::Market];

/// AND-of-OR tree of signal references. Outer vec is the AND group, each
/// inner vec an OR group of signal names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConditionTree {
    pub groups: Vec<Vec<String>>,
}

impl ConditionTree {
    /// True when every group contains at least one true leaf. An empty
    /// tree is vacuously true; an empty group is false.
    pub fn evaluate<F: Fn(&str) -> bool>(&self, leaf: F) -> bool {
        self.groups
            .iter()
            .all(|group| group.iter().any(|name| leaf(name)))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Parse a condition string of parenthesized OR groups into a tree.
///
/// Text outside parentheses is ignored, matching the original lenient
/// grammar; unbalanced parentheses are an error.
pub fn parse_condition_tree(input: &str) -> Result<ConditionTree, String> {
    let mut groups = Vec::new();
    let mut chars = input.char_indices();

    while let Some((start, ch)) = chars.next() {
        if ch != '(' {
            continue;
        }
        let mut end = None;
        for (i, c) in chars.by_ref() {
            match c {
                ')' => {
                    end = Some(i);
                    break;
                }
                '(' => return Err(format!("nested '(' at position {i}")),
                _ => {}
            }
        }
        let Some(end) = end else {
            return Err(format!("unclosed '(' at position {start}"));
        };

        let inner = &input[start + 1..end];
        let names: Vec<String> = inner
            .split('|')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        groups.push(names);
    }

    Ok(ConditionTree { groups })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Entry,
    Exit,
}

/// A named entry or exit policy: one condition tree per scope it uses.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub name: String,
    pub kind: PolicyKind,
    pub scopes: BTreeMap<Scope, ConditionTree>,
}

/// Immutable mapping of scope → signal name → signal, plus the compiled
/// entry/exit policies. Built once from configuration.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    signals: BTreeMap<Scope, BTreeMap<String, Signal>>,
    policies: Vec<Policy>,
}

impl PolicyRegistry {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PolicybackError> {
        let mut signals: BTreeMap<Scope, BTreeMap<String, Signal>> = BTreeMap::new();

        for scope in SCOPES {
            let section = signal_section(scope);
            let mut by_name = BTreeMap::new();
            for key in config.keys(&section) {
                let raw = config.get_string(&section, &key).unwrap_or_default();
                let signal = parse_signal_declaration(&key, scope, &raw).map_err(|reason| {
                    PolicybackError::ConfigInvalid {
                        section: section.clone(),
                        key: key.clone(),
                        reason,
                    }
                })?;
                by_name.insert(key, signal);
            }
            signals.insert(scope, by_name);
        }

        let entry_names = policy_name_list(config, "entry")?;
        let exit_names = policy_name_list(config, "exit")?;

        let mut policies = Vec::new();
        // Exit policies first, entry after, mirroring the registration
        // order of the combined policy table.
        for name in &exit_names {
            policies.push(build_policy(config, name, PolicyKind::Exit, &signals)?);
        }
        for name in &entry_names {
            policies.push(build_policy(config, name, PolicyKind::Entry, &signals)?);
        }

        Ok(PolicyRegistry { signals, policies })
    }

    pub fn signals(&self, scope: Scope) -> &BTreeMap<String, Signal> {
        self.signals
            .get(&scope)
            .expect("all scopes populated at construction")
    }

    pub fn signal(&self, scope: Scope, name: &str) -> Option<&Signal> {
        self.signals(scope).get(&name.to_lowercase())
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }
}

fn signal_section(scope: Scope) -> String {
    match scope {
        Scope::Asset => "Signal_Asset".to_string(),
        Scope::Portfolio => "Signal_Portfolio".to_string(),
        Scope::Market => "Signal_Market".to_string(),
    }
}

/// Parse one signal declaration value:
/// `field,operator,isRelative,threshold|NONE,comparisonField|NONE[,assets...]`.
fn parse_signal_declaration(name: &str, scope: Scope, raw: &str) -> Result<Signal, String> {
    let tokens: Vec<&str> = raw.split(',').map(str::trim).collect();
    if tokens.len() < 5 {
        return Err(format!(
            "expected at least 5 comma-separated fields, found {}",
            tokens.len()
        ));
    }

    let field = tokens[0].to_string();
    if field.is_empty() {
        return Err("empty field name".to_string());
    }

    let operator: Operator = tokens[1].parse()?;

    let is_relative = match tokens[2].to_lowercase().as_str() {
        "true" => true,
        "false" => false,
        other => return Err(format!("isRelative must be true or false, found {other}")),
    };

    let threshold = parse_optional(tokens[3])
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| format!("invalid threshold: {t}"))
        })
        .transpose()?;

    let comparison_field = parse_optional(tokens[4]).map(str::to_string);

    let assets_to_consider = if scope == Scope::Market {
        parse_asset_filter(&tokens[5..])
    } else {
        AssetFilter::All
    };

    Ok(Signal {
        name: name.to_string(),
        field,
        operator,
        is_relative,
        threshold,
        comparison_field,
        scope,
        assets_to_consider,
    })
}

fn parse_optional(token: &str) -> Option<&str> {
    if token.eq_ignore_ascii_case("none") || token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn parse_asset_filter(tokens: &[&str]) -> AssetFilter {
    let assets: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| !t.is_empty())
        .collect();
    if assets.is_empty() || assets.iter().any(|a| a.eq_ignore_ascii_case("all")) {
        AssetFilter::All
    } else {
        AssetFilter::Only(assets.iter().map(|a| a.to_string()).collect())
    }
}

fn policy_name_list(config: &dyn ConfigPort, key: &str) -> Result<Vec<String>, PolicybackError> {
    let raw = config.get_string(TRADE_POLICY_SECTION, key).ok_or_else(|| {
        PolicybackError::ConfigMissing {
            section: TRADE_POLICY_SECTION.to_string(),
            key: key.to_string(),
        }
    })?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

fn build_policy(
    config: &dyn ConfigPort,
    name: &str,
    kind: PolicyKind,
    signals: &BTreeMap<Scope, BTreeMap<String, Signal>>,
) -> Result<Policy, PolicybackError> {
    let mut scopes = BTreeMap::new();

    for scope in SCOPES {
        let Some(raw) = config.get_string(name, scope.key()) else {
            continue;
        };
        let tree = parse_condition_tree(&raw).map_err(|reason| PolicybackError::ConfigInvalid {
            section: name.to_string(),
            key: scope.key().to_string(),
            reason,
        })?;
        scopes.insert(scope, link_tree(name, scope, tree, &signals[&scope]));
    }

    Ok(Policy {
        name: name.to_string(),
        kind,
        scopes,
    })
}

/// Drop references to signals that were never declared. A warning, not an
/// error: the remaining terms of the OR group still apply.
fn link_tree(
    policy: &str,
    scope: Scope,
    tree: ConditionTree,
    known: &BTreeMap<String, Signal>,
) -> ConditionTree {
    let groups = tree
        .groups
        .into_iter()
        .map(|group| {
            group
                .into_iter()
                .filter_map(|name| {
                    let canonical = name.to_lowercase();
                    if known.contains_key(&canonical) {
                        Some(canonical)
                    } else {
                        warn!("{name} not available in {} signals (policy {policy})", scope.key());
                        None
                    }
                })
                .collect()
        })
        .collect();
    ConditionTree { groups }
}
