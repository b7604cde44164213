//! CSV file data adapter.
//!
//! Price data lives in `{asset}.csv` with `Date` and `Close` columns;
//! market factor data in `{name}.csv` with `Date` plus one column per
//! factor. Both are forward-filled over the Monday-to-Friday business
//! days of the file's span, so a gap in the file reads as the last
//! observed value.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::domain::error::PolicybackError;
use crate::ports::data_port::DataPort;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.csv"))
    }

    /// Read `{name}.csv` into sorted (date, column → value) rows.
    fn read_rows(
        &self,
        name: &str,
    ) -> Result<Vec<(NaiveDate, HashMap<String, f64>)>, PolicybackError> {
        let path = self.csv_path(name);
        let mut rdr = csv::Reader::from_path(&path).map_err(|_| {
            PolicybackError::DataUnavailable {
                name: name.to_string(),
                path: path.display().to_string(),
            }
        })?;

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| PolicybackError::DataFormat {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let date_column = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("date"))
            .ok_or_else(|| PolicybackError::DataFormat {
                path: path.display().to_string(),
                reason: "missing Date column".to_string(),
            })?;

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| PolicybackError::DataFormat {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

            let date_str = record.get(date_column).unwrap_or_default();
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                PolicybackError::DataFormat {
                    path: path.display().to_string(),
                    reason: format!("invalid date {date_str}: {e}"),
                }
            })?;

            let mut values = HashMap::new();
            for (i, header) in headers.iter().enumerate() {
                if i == date_column {
                    continue;
                }
                let raw = record.get(i).unwrap_or_default().trim();
                if raw.is_empty() {
                    continue;
                }
                let value: f64 = raw.parse().map_err(|_| PolicybackError::DataFormat {
                    path: path.display().to_string(),
                    reason: format!("invalid value for {header} on {date}: {raw}"),
                })?;
                values.insert(header.clone(), value);
            }
            rows.push((date, values));
        }

        if rows.is_empty() {
            return Err(PolicybackError::DataUnavailable {
                name: name.to_string(),
                path: path.display().to_string(),
            });
        }

        rows.sort_by_key(|(date, _)| *date);
        Ok(rows)
    }
}

fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Expand sorted rows onto the business-day calendar of their span,
/// carrying the last observed value of each column forward.
fn forward_fill(
    rows: Vec<(NaiveDate, HashMap<String, f64>)>,
) -> BTreeMap<NaiveDate, HashMap<String, f64>> {
    let mut by_date: BTreeMap<NaiveDate, HashMap<String, f64>> = BTreeMap::new();
    let mut raw: BTreeMap<NaiveDate, HashMap<String, f64>> = rows.into_iter().collect();

    let (Some(&first), Some(&last)) = (
        raw.keys().next(),
        raw.keys().next_back(),
    ) else {
        return by_date;
    };

    let mut current: HashMap<String, f64> = HashMap::new();
    let mut date = first;
    while date <= last {
        if let Some(values) = raw.remove(&date) {
            current.extend(values);
        }
        if is_business_day(date) || date == first {
            by_date.insert(date, current.clone());
        }
        let Some(next) = date.succ_opt() else { break };
        date = next;
    }
    by_date
}

impl DataPort for CsvAdapter {
    fn fetch_closes(&self, asset: &str) -> Result<BTreeMap<NaiveDate, f64>, PolicybackError> {
        let path = self.csv_path(asset).display().to_string();
        let filled = forward_fill(self.read_rows(asset)?);

        let mut closes = BTreeMap::new();
        for (date, values) in filled {
            let close = values
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("close"))
                .map(|(_, &v)| v)
                .ok_or_else(|| PolicybackError::DataFormat {
                    path: path.clone(),
                    reason: format!("missing Close value on {date}"),
                })?;
            closes.insert(date, close);
        }
        Ok(closes)
    }

    fn fetch_factors(
        &self,
        name: &str,
    ) -> Result<BTreeMap<NaiveDate, HashMap<String, f64>>, PolicybackError> {
        Ok(forward_fill(self.read_rows(name)?))
    }

    fn date_range(
        &self,
        asset: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, PolicybackError> {
        let rows = match self.read_rows(asset) {
            Ok(rows) => rows,
            Err(PolicybackError::DataUnavailable { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let first = rows.first().map(|(d, _)| *d);
        let last = rows.last().map(|(d, _)| *d);
        Ok(first.zip(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (TempDir, CsvAdapter) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        // 2024-01-15 is a Monday. Wednesday is missing, then the series
        // jumps over the weekend to the following Monday.
        fs::write(
            path.join("BHP.csv"),
            "Date,Close\n\
             2024-01-15,100.0\n\
             2024-01-16,105.0\n\
             2024-01-18,110.0\n\
             2024-01-19,112.0\n\
             2024-01-22,115.0\n",
        )
        .unwrap();

        fs::write(
            path.join("yields.csv"),
            "Date,shortYield,longYield\n\
             2024-01-15,4.0,4.5\n\
             2024-01-16,4.1,\n\
             2024-01-17,4.2,4.4\n",
        )
        .unwrap();

        (dir, CsvAdapter::new(path))
    }

    #[test]
    fn fetch_closes_parses_and_sorts() {
        let (_dir, adapter) = setup();
        let closes = adapter.fetch_closes("BHP").unwrap();

        assert_eq!(closes[&day(2024, 1, 15)], 100.0);
        assert_eq!(closes[&day(2024, 1, 16)], 105.0);
        assert_eq!(closes[&day(2024, 1, 22)], 115.0);
    }

    #[test]
    fn fetch_closes_forward_fills_missing_business_day() {
        let (_dir, adapter) = setup();
        let closes = adapter.fetch_closes("BHP").unwrap();

        // Wednesday the 17th has no row; it carries Tuesday's close.
        assert_eq!(closes[&day(2024, 1, 17)], 105.0);
    }

    #[test]
    fn fetch_closes_excludes_weekends() {
        let (_dir, adapter) = setup();
        let closes = adapter.fetch_closes("BHP").unwrap();

        assert!(!closes.contains_key(&day(2024, 1, 20)));
        assert!(!closes.contains_key(&day(2024, 1, 21)));
        assert_eq!(closes.len(), 6); // Mon..Fri + next Mon
    }

    #[test]
    fn fetch_closes_missing_file_is_unavailable() {
        let (_dir, adapter) = setup();
        let err = adapter.fetch_closes("XYZ").unwrap_err();
        assert!(matches!(err, PolicybackError::DataUnavailable { .. }));
    }

    #[test]
    fn fetch_closes_empty_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("EMPTY.csv"), "Date,Close\n").unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let err = adapter.fetch_closes("EMPTY").unwrap_err();
        assert!(matches!(err, PolicybackError::DataUnavailable { .. }));
    }

    #[test]
    fn fetch_closes_bad_value_is_format_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("BAD.csv"),
            "Date,Close\n2024-01-15,oops\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let err = adapter.fetch_closes("BAD").unwrap_err();
        assert!(matches!(err, PolicybackError::DataFormat { .. }));
    }

    #[test]
    fn fetch_factors_returns_all_columns() {
        let (_dir, adapter) = setup();
        let factors = adapter.fetch_factors("yields").unwrap();

        let monday = &factors[&day(2024, 1, 15)];
        assert_eq!(monday["shortYield"], 4.0);
        assert_eq!(monday["longYield"], 4.5);
    }

    #[test]
    fn fetch_factors_forward_fills_per_column() {
        let (_dir, adapter) = setup();
        let factors = adapter.fetch_factors("yields").unwrap();

        // longYield is blank on the 16th; it carries the 15th's value
        // while shortYield updates.
        let tuesday = &factors[&day(2024, 1, 16)];
        assert_eq!(tuesday["shortYield"], 4.1);
        assert_eq!(tuesday["longYield"], 4.5);

        let wednesday = &factors[&day(2024, 1, 17)];
        assert_eq!(wednesday["longYield"], 4.4);
    }

    #[test]
    fn date_range_reports_span() {
        let (_dir, adapter) = setup();
        let range = adapter.date_range("BHP").unwrap();
        assert_eq!(range, Some((day(2024, 1, 15), day(2024, 1, 22))));

        assert_eq!(adapter.date_range("XYZ").unwrap(), None);
    }
}
