//! Tabular records passed between pipeline stages
//!
//! A [`RecordCollection`] is an ordered set of rows sharing one column schema.
//! Stages add, rename and drop columns and remove rows in place.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::Result;

/// Natural key column
pub const VIN: &str = "vin";

/// Source last-modified timestamp column
pub const LAST_MODIFIED: &str = "lastModifiedDate";

/// One row, cells aligned with the collection's columns
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    cells: Vec<Value>,
}

impl Record {
    /// Cells in column order
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
}

/// Ordered rows with a uniform schema
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordCollection {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl RecordCollection {
    /// Build from JSON objects
    ///
    /// The schema is the union of keys in order of first appearance; a row
    /// missing a key gets `null` in that column.
    pub fn from_objects(objects: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for object in &objects {
            for key in object.keys() {
                if !positions.contains_key(key) {
                    positions.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
        }

        let rows = objects
            .into_iter()
            .map(|object| {
                let mut cells = vec![Value::Null; columns.len()];
                for (key, value) in object {
                    if let Some(&idx) = positions.get(&key) {
                        cells[idx] = value;
                    }
                }
                Record { cells }
            })
            .collect();

        Self { columns, rows }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order
    pub fn records(&self) -> &[Record] {
        &self.rows
    }

    /// Position of a column
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Cell value, `None` if the row or column does not exist
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r.cells[idx])
    }

    /// Cell value as text; `None` for null, missing or non-string cells
    pub fn get_str(&self, row: usize, column: &str) -> Option<&str> {
        self.get(row, column).and_then(Value::as_str)
    }

    /// Set a cell, appending the column first if it does not exist
    pub fn set(&mut self, row: usize, column: &str, value: Value) {
        let idx = self.ensure_column(column);
        if let Some(record) = self.rows.get_mut(row) {
            record.cells[idx] = value;
        }
    }

    /// Append a column filled with `null` unless it already exists; returns its position
    pub fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.columns.push(column.to_string());
        for record in &mut self.rows {
            record.cells.push(Value::Null);
        }
        self.columns.len() - 1
    }

    /// Rename a column; returns false when `from` does not exist
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Drop a column; returns false when it does not exist
    pub fn drop_column(&mut self, column: &str) -> bool {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        self.columns.remove(idx);
        for record in &mut self.rows {
            record.cells.remove(idx);
        }
        true
    }

    /// Keep the rows for which `keep(row_index)` is true, preserving order
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize) -> bool,
    {
        let mut idx = 0;
        self.rows.retain(|_| {
            let k = keep(idx);
            idx += 1;
            k
        });
    }

    /// Keep one row per VIN, the one with the latest `lastModifiedDate`
    ///
    /// Rows are stably ordered by timestamp (oldest first) and the last row of
    /// each VIN survives, so on equal timestamps the later input row wins.
    /// A missing or unparseable timestamp sorts before every valid one.
    /// Returns the number of rows removed.
    pub fn dedup_latest(&mut self) -> usize {
        let before = self.rows.len();
        let vin_idx = self.column_index(VIN);
        let ts_idx = self.column_index(LAST_MODIFIED);

        let mut keyed: Vec<(Option<DateTime<Utc>>, String, Record)> = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|record| {
                let ts = ts_idx
                    .and_then(|i| record.cells[i].as_str())
                    .and_then(parse_timestamp);
                let vin = vin_idx
                    .map(|i| cell_text(&record.cells[i]))
                    .unwrap_or_default();
                (ts, vin, record)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut last_seen: HashMap<&str, usize> = HashMap::new();
        for (pos, (_, vin, _)) in keyed.iter().enumerate() {
            last_seen.insert(vin.as_str(), pos);
        }
        let survivors: std::collections::HashSet<usize> = last_seen.into_values().collect();

        self.rows = keyed
            .into_iter()
            .enumerate()
            .filter(|(pos, _)| survivors.contains(pos))
            .map(|(_, (_, _, record))| record)
            .collect();

        before - self.rows.len()
    }

    /// Serialize as CSV with a header row; `null` cells are empty
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for record in &self.rows {
            writer.write_record(record.cells.iter().map(cell_text))?;
        }
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| crate::error::Error::Io(std::io::Error::other(e.to_string())))
    }
}

/// Render a cell for CSV output
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Parse RFC 3339, naive ISO-8601 (taken as UTC) or a bare date
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection(values: Vec<Value>) -> RecordCollection {
        let objects = values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        RecordCollection::from_objects(objects)
    }

    #[test]
    fn test_schema_is_first_appearance_union() {
        let c = collection(vec![
            json!({"vin": "A", "retailerName": "North"}),
            json!({"vin": "B", "statusDate": "2024-01-01"}),
        ]);
        assert_eq!(c.columns(), &["vin", "retailerName", "statusDate"]);
        assert_eq!(c.get(0, "statusDate"), Some(&Value::Null));
        assert_eq!(c.get_str(1, "statusDate"), Some("2024-01-01"));
    }

    #[test]
    fn test_dedup_keeps_latest_last_modified() {
        let mut c = collection(vec![
            json!({"vin": "A", "lastModifiedDate": "2024-01-02T00:00:00Z", "n": 2}),
            json!({"vin": "A", "lastModifiedDate": "2024-01-01T00:00:00Z", "n": 1}),
            json!({"vin": "B", "lastModifiedDate": "2024-01-01T12:00:00Z", "n": 3}),
        ]);
        let removed = c.dedup_latest();

        assert_eq!(removed, 1);
        assert_eq!(c.len(), 2);
        let survivors: Vec<(String, i64)> = (0..c.len())
            .map(|i| {
                (
                    c.get_str(i, "vin").unwrap().to_string(),
                    c.get(i, "n").unwrap().as_i64().unwrap(),
                )
            })
            .collect();
        // ordered by timestamp, oldest first
        assert_eq!(survivors, vec![("B".to_string(), 3), ("A".to_string(), 2)]);
    }

    #[test]
    fn test_dedup_equal_timestamps_later_row_wins() {
        let mut c = collection(vec![
            json!({"vin": "A", "lastModifiedDate": "2024-01-01T00:00:00Z", "n": 1}),
            json!({"vin": "A", "lastModifiedDate": "2024-01-01T00:00:00Z", "n": 2}),
        ]);
        c.dedup_latest();
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(0, "n").unwrap().as_i64(), Some(2));
    }

    #[test]
    fn test_dedup_unparseable_timestamp_loses() {
        let mut c = collection(vec![
            json!({"vin": "A", "lastModifiedDate": "2023-06-01", "n": 1}),
            json!({"vin": "A", "lastModifiedDate": "not a date", "n": 2}),
        ]);
        c.dedup_latest();
        assert_eq!(c.get(0, "n").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn test_column_edits() {
        let mut c = collection(vec![json!({"vin": "A", "statusDate": "x", "retailerName": "R"})]);
        assert!(c.drop_column("statusDate"));
        assert!(!c.drop_column("statusDate"));
        assert!(c.rename_column("retailerName", "retailer_name"));
        c.set(0, "out_service_date", Value::Null);
        assert_eq!(c.columns(), &["vin", "retailer_name", "out_service_date"]);
        assert_eq!(c.records()[0].cells().len(), 3);
    }

    #[test]
    fn test_retain_rows_preserves_order() {
        let mut c = collection(vec![
            json!({"vin": "v1"}),
            json!({"vin": "v2"}),
            json!({"vin": "v3"}),
        ]);
        c.retain_rows(|i| i != 1);
        assert_eq!(c.get_str(0, "vin"), Some("v1"));
        assert_eq!(c.get_str(1, "vin"), Some("v3"));
    }

    #[test]
    fn test_to_csv_renders_nulls_and_numbers() {
        let c = collection(vec![
            json!({"vin": "A", "count": 3, "note": null}),
            json!({"vin": "B, C", "count": 1.5, "note": "x"}),
        ]);
        let csv = String::from_utf8(c.to_csv().unwrap()).unwrap();
        assert_eq!(csv, "vin,count,note\nA,3,\n\"B, C\",1.5,x\n");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-15T12:00:00.123Z").is_some());
        assert!(parse_timestamp("2024-01-15T12:00:00+02:00").is_some());
        assert!(parse_timestamp("2024-01-15T12:00:00").is_some());
        assert!(parse_timestamp("2024-01-15").is_some());
        assert!(parse_timestamp("15/01/2024").is_none());
    }
}
