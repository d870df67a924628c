//! Row filtering of downloaded feed files

use crate::error::{Error, Result};

/// Row counts of one filter pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterSummary {
    /// Data rows read
    pub initial: usize,
    /// Data rows kept
    pub kept: usize,
}

impl FilterSummary {
    /// Data rows dropped
    pub fn removed(&self) -> usize {
        self.initial - self.kept
    }
}

/// Keeps the rows whose `column` equals `accepted` exactly
#[derive(Clone, Debug)]
pub struct StatusFilter {
    column: String,
    accepted: String,
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self::new("status", "ok")
    }
}

impl StatusFilter {
    /// Filter on `column == accepted`
    pub fn new(column: impl Into<String>, accepted: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            accepted: accepted.into(),
        }
    }

    /// Filter CSV bytes, keeping the header row
    ///
    /// # Errors
    ///
    /// `MissingColumn` if the header lacks the filter column; `Csv` for
    /// unreadable input.
    pub fn apply(&self, input: &[u8]) -> Result<(Vec<u8>, FilterSummary)> {
        let mut reader = csv::Reader::from_reader(input);
        let headers = reader.headers()?.clone();
        let idx = headers
            .iter()
            .position(|h| h == self.column)
            .ok_or_else(|| Error::MissingColumn(self.column.clone()))?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&headers)?;

        let mut summary = FilterSummary::default();
        for record in reader.records() {
            let record = record?;
            summary.initial += 1;
            if record.get(idx) == Some(self.accepted.as_str()) {
                writer.write_record(&record)?;
                summary.kept += 1;
            }
        }
        writer.flush()?;
        let output = writer
            .into_inner()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

        tracing::info!(
            initial = summary.initial,
            kept = summary.kept,
            removed = summary.removed(),
            column = %self.column,
            "Filtered CSV rows"
        );
        Ok((output, summary))
    }
}
