//! Signal definitions: a named boolean comparison rule over a data field.
//!
//! A signal compares the current value of its configured field against
//! either a fixed threshold or another field's value (relative mode).
//! Scope is a tag, not a type hierarchy: `check` behaves identically for
//! asset, portfolio and market signals. Market signals additionally carry
//! an asset restriction consulted during policy evaluation, not here.

use std::collections::BTreeSet;
use std::str::FromStr;

/// Comparison operator for signal checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl Operator {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Operator::Gt => left > right,
            Operator::Lt => left < right,
            Operator::Ge => left >= right,
            Operator::Le => left <= right,
            Operator::Eq => left == right,
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Ge),
            "<=" => Ok(Operator::Le),
            "==" => Ok(Operator::Eq),
            other => Err(format!("unknown operator: {other}")),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Eq => "==",
        };
        f.write_str(s)
    }
}

/// The level a signal's field applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Asset,
    Portfolio,
    Market,
}

impl Scope {
    /// Scope name as it appears in policy-section keys.
    pub fn key(self) -> &'static str {
        match self {
            Scope::Asset => "asset",
            Scope::Portfolio => "portfolio",
            Scope::Market => "market",
        }
    }
}

/// Asset restriction for market-scope signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetFilter {
    All,
    Only(BTreeSet<String>),
}

impl AssetFilter {
    pub fn applies_to(&self, asset: &str) -> bool {
        match self {
            AssetFilter::All => true,
            AssetFilter::Only(set) => set.contains(asset),
        }
    }
}

/// A single comparison rule. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub name: String,
    pub field: String,
    pub operator: Operator,
    pub is_relative: bool,
    pub threshold: Option<f64>,
    pub comparison_field: Option<String>,
    pub scope: Scope,
    pub assets_to_consider: AssetFilter,
}

impl Signal {
    /// Evaluate the rule against the current field value.
    ///
    /// Relative signals compare against `relative` and are false when no
    /// relative value is available. Absolute signals compare against the
    /// configured threshold and are false when none was configured.
    pub fn check(&self, current: f64, relative: Option<f64>) -> bool {
        if self.is_relative {
            match relative {
                Some(rel) => self.operator.apply(current, rel),
                None => false,
            }
        } else {
            match self.threshold {
                Some(threshold) => self.operator.apply(current, threshold),
                None => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absolute_signal(operator: Operator, threshold: f64) -> Signal {
        Signal {
            name: "sig".into(),
            field: "runningPerformance".into(),
            operator,
            is_relative: false,
            threshold: Some(threshold),
            comparison_field: None,
            scope: Scope::Asset,
            assets_to_consider: AssetFilter::All,
        }
    }

    fn relative_signal(operator: Operator) -> Signal {
        Signal {
            name: "sig".into(),
            field: "shortYield".into(),
            operator,
            is_relative: true,
            threshold: None,
            comparison_field: Some("longYield".into()),
            scope: Scope::Market,
            assets_to_consider: AssetFilter::All,
        }
    }

    #[test]
    fn operator_parse() {
        assert_eq!(">".parse::<Operator>().unwrap(), Operator::Gt);
        assert_eq!("<".parse::<Operator>().unwrap(), Operator::Lt);
        assert_eq!(">=".parse::<Operator>().unwrap(), Operator::Ge);
        assert_eq!("<=".parse::<Operator>().unwrap(), Operator::Le);
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert!("!=".parse::<Operator>().is_err());
    }

    #[test]
    fn operator_roundtrip_display() {
        for op in [
            Operator::Gt,
            Operator::Lt,
            Operator::Ge,
            Operator::Le,
            Operator::Eq,
        ] {
            assert_eq!(op.to_string().parse::<Operator>().unwrap(), op);
        }
    }

    #[test]
    fn absolute_check_matches_operator_exactly() {
        let cases: &[(Operator, f64, f64, bool)] = &[
            (Operator::Gt, 1.0, 0.5, true),
            (Operator::Gt, 0.5, 0.5, false),
            (Operator::Lt, 0.4, 0.5, true),
            (Operator::Lt, 0.5, 0.5, false),
            (Operator::Ge, 0.5, 0.5, true),
            (Operator::Ge, 0.4, 0.5, false),
            (Operator::Le, 0.5, 0.5, true),
            (Operator::Le, 0.6, 0.5, false),
            (Operator::Eq, 0.5, 0.5, true),
            (Operator::Eq, 0.6, 0.5, false),
        ];
        for &(op, current, threshold, expected) in cases {
            let sig = absolute_signal(op, threshold);
            assert_eq!(
                sig.check(current, None),
                expected,
                "{current} {op} {threshold}"
            );
        }
    }

    #[test]
    fn relative_check_with_value() {
        let sig = relative_signal(Operator::Gt);
        assert!(sig.check(2.0, Some(1.0)));
        assert!(!sig.check(1.0, Some(2.0)));
    }

    #[test]
    fn relative_check_without_value_is_false() {
        // Never an error: missing comparison value degrades to false.
        for op in [
            Operator::Gt,
            Operator::Lt,
            Operator::Ge,
            Operator::Le,
            Operator::Eq,
        ] {
            let sig = relative_signal(op);
            assert!(!sig.check(1.0, None));
        }
    }

    #[test]
    fn absolute_check_without_threshold_is_false() {
        let mut sig = absolute_signal(Operator::Gt, 0.0);
        sig.threshold = None;
        assert!(!sig.check(100.0, None));
    }

    #[test]
    fn asset_filter_all() {
        assert!(AssetFilter::All.applies_to("A"));
        assert!(AssetFilter::All.applies_to("anything"));
    }

    #[test]
    fn asset_filter_only() {
        let filter = AssetFilter::Only(BTreeSet::from(["A".to_string()]));
        assert!(filter.applies_to("A"));
        assert!(!filter.applies_to("B"));
    }

    #[test]
    fn scope_keys() {
        assert_eq!(Scope::Asset.key(), "asset");
        assert_eq!(Scope::Portfolio.key(), "portfolio");
        assert_eq!(Scope::Market.key(), "market");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn absolute_check_agrees_with_operator(
                current in -1e6f64..1e6,
                threshold in -1e6f64..1e6,
            ) {
                prop_assert_eq!(
                    absolute_signal(Operator::Ge, threshold).check(current, None),
                    current >= threshold
                );
                prop_assert_eq!(
                    absolute_signal(Operator::Lt, threshold).check(current, None),
                    current < threshold
                );
            }

            #[test]
            fn relative_check_agrees_with_operator(
                current in -1e6f64..1e6,
                rel in -1e6f64..1e6,
            ) {
                prop_assert_eq!(
                    relative_signal(Operator::Gt).check(current, Some(rel)),
                    current > rel
                );
            }
        }
    }
}
