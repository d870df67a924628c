//! Deterministic storage key derivation

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};

static FILENAME_DATE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"_(\d{8})_").ok());

/// Key of a recall feed file: `{base_prefix}/{region}/{YYYY}/{MM}/{DD}/{basename}`
///
/// The date is the first `_YYYYMMDD_` run in the filename. Directory components
/// of `filename` are ignored.
///
/// ```
/// use feed_landing::storage::keys::recall_key;
///
/// let key = recall_key("data/recall/output", "DEALERWARE-INV_20240115_120000_output.csv", "us").unwrap();
/// assert_eq!(key, "data/recall/output/us/2024/01/15/DEALERWARE-INV_20240115_120000_output.csv");
/// ```
pub fn recall_key(base_prefix: &str, filename: &str, region: &str) -> Result<String> {
    let base_filename = filename.rsplit('/').next().unwrap_or(filename);
    let date = FILENAME_DATE
        .as_ref()
        .and_then(|re| re.captures(base_filename))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            tracing::error!(filename, "Date not found in filename");
            Error::InvalidFileName(filename.to_string())
        })?;

    let (year, rest) = date.split_at(4);
    let (month, day) = rest.split_at(2);
    Ok(format!(
        "{}/{}/{}/{}/{}/{}",
        base_prefix.trim_end_matches('/'),
        region,
        year,
        month,
        day,
        base_filename
    ))
}

/// Key of a timestamped artifact: `{target_dir}{YYYY}/{MM}/{DD}/{entity}_{HHMMSS}.csv`
///
/// `target_dir` is used verbatim and is expected to end with `/`.
pub fn artifact_key(target_dir: &str, entity: &str, run_time: DateTime<Utc>) -> String {
    format!(
        "{}{}/{}_{}.csv",
        target_dir,
        run_time.format("%Y/%m/%d"),
        entity,
        run_time.format("%H%M%S")
    )
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_recall_key_from_vendor_filename() {
        let key = recall_key(
            "data/recall/output",
            "DEALERWARE-INV_20240115_120000_output.csv",
            "us",
        )
        .unwrap();
        assert_eq!(
            key,
            "data/recall/output/us/2024/01/15/DEALERWARE-INV_20240115_120000_output.csv"
        );
    }

    #[test]
    fn test_recall_key_ignores_remote_directory() {
        let key = recall_key(
            "data/recall/output/",
            "/outgoing/DEALERWARE-C-INV_20231231_235959_output.csv",
            "ca",
        )
        .unwrap();
        assert_eq!(
            key,
            "data/recall/output/ca/2023/12/31/DEALERWARE-C-INV_20231231_235959_output.csv"
        );
    }

    #[test]
    fn test_recall_key_without_date_fails() {
        let err = recall_key("p", "inventory_latest.csv", "us").unwrap_err();
        assert!(matches!(err, Error::InvalidFileName(name) if name == "inventory_latest.csv"));
    }

    #[test]
    fn test_artifact_key_layout() {
        let run = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(
            artifact_key("raw/volvo/infleet/", "volvo_inventories", run),
            "raw/volvo/infleet/2024/03/07/volvo_inventories_090502.csv"
        );
    }
}
