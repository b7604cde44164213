//! Domain error types.

/// Top-level error type for policyback.
#[derive(Debug, thiserror::Error)]
pub enum PolicybackError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown order-sizing policy: {name}")]
    UnknownPolicy { name: String },

    #[error("benchmark weights sum to {total}, expected 1.0")]
    BenchmarkWeights { total: f64 },

    #[error("no data for {name} in {path}")]
    DataUnavailable { name: String, path: String },

    #[error("bad data in {path}: {reason}")]
    DataFormat { path: String, reason: String },

    #[error("insufficient funds on {date}: available {available}, required {required}")]
    InsufficientFunds {
        date: chrono::NaiveDate,
        available: f64,
        required: f64,
    },

    #[error("negative holding for {asset} on {date}: holding {holding}, order {quantity}")]
    NegativeHolding {
        date: chrono::NaiveDate,
        asset: String,
        holding: f64,
        quantity: f64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&PolicybackError> for std::process::ExitCode {
    fn from(err: &PolicybackError) -> Self {
        let code: u8 = match err {
            PolicybackError::Io(_) => 1,
            PolicybackError::ConfigParse { .. }
            | PolicybackError::ConfigMissing { .. }
            | PolicybackError::ConfigInvalid { .. }
            | PolicybackError::UnknownPolicy { .. }
            | PolicybackError::BenchmarkWeights { .. } => 2,
            PolicybackError::DataUnavailable { .. } | PolicybackError::DataFormat { .. } => 3,
            PolicybackError::InsufficientFunds { .. }
            | PolicybackError::NegativeHolding { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn config_error_messages() {
        let err = PolicybackError::ConfigMissing {
            section: "TradePolicyConfig".into(),
            key: "entry".into(),
        };
        assert_eq!(
            err.to_string(),
            "missing config key [TradePolicyConfig] entry"
        );

        let err = PolicybackError::BenchmarkWeights { total: 0.9 };
        assert!(err.to_string().contains("0.9"));
    }

    #[test]
    fn ledger_error_messages() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let err = PolicybackError::InsufficientFunds {
            date,
            available: 1_000_000.0,
            required: 1_100_000.0,
        };
        assert!(err.to_string().contains("available 1000000"));

        let err = PolicybackError::NegativeHolding {
            date,
            asset: "A".into(),
            holding: 50.0,
            quantity: -100.0,
        };
        assert!(err.to_string().contains("negative holding for A"));
    }

    #[test]
    fn exit_codes() {
        use std::process::ExitCode;
        let config_err = PolicybackError::ConfigMissing {
            section: "s".into(),
            key: "k".into(),
        };
        let _code: ExitCode = (&config_err).into();

        let io_err = PolicybackError::Io(std::io::Error::other("boom"));
        let _code: ExitCode = (&io_err).into();
    }
}
