//! Data access port trait.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::domain::error::PolicybackError;

pub trait DataPort {
    /// Close prices for one asset keyed by date. The series is
    /// forward-filled over the business-day calendar of its own span;
    /// dates outside the span are simply absent.
    fn fetch_closes(&self, asset: &str) -> Result<BTreeMap<NaiveDate, f64>, PolicybackError>;

    /// Market factor columns keyed by date, forward-filled the same way.
    fn fetch_factors(
        &self,
        name: &str,
    ) -> Result<BTreeMap<NaiveDate, HashMap<String, f64>>, PolicybackError>;

    /// First and last date with data for an asset, if any.
    fn date_range(
        &self,
        asset: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, PolicybackError>;
}
