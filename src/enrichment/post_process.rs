//! Column cleanup applied to enriched loaner records

use serde_json::Value;

use crate::records::{LAST_MODIFIED, RecordCollection};

/// Source column holding the retailer's global code
pub const GLOBAL_RETAILER_CODE: &str = "globalRetailerCode";

const RENAMES: &[(&str, &str)] = &[
    ("retailerName", "retailer_name"),
    ("retailerCode", "retailer_code"),
    (LAST_MODIFIED, "last_modified_date"),
    (GLOBAL_RETAILER_CODE, "global_retailer_code"),
];

/// Shape enriched records for the landing artifact
///
/// Adds `oem_dealer_code` (the global retailer code without
/// `dealer_code_prefix`) and an empty `out_service_date`, drops `statusDate`
/// and renames the remaining camelCase columns.
pub fn post_process(records: &mut RecordCollection, dealer_code_prefix: &str) {
    let dealer_codes: Vec<Value> = (0..records.len())
        .map(|row| match records.get(row, GLOBAL_RETAILER_CODE) {
            Some(Value::String(code)) => Value::String(
                code.strip_prefix(dealer_code_prefix)
                    .unwrap_or(code)
                    .to_string(),
            ),
            Some(Value::Null) | None => Value::Null,
            Some(other) => Value::String(crate::records::cell_text(other)),
        })
        .collect();
    if records.column_index(GLOBAL_RETAILER_CODE).is_none() {
        tracing::warn!(column = GLOBAL_RETAILER_CODE, "Column missing, oem_dealer_code left empty");
    }

    records.ensure_column("oem_dealer_code");
    for (row, code) in dealer_codes.into_iter().enumerate() {
        records.set(row, "oem_dealer_code", code);
    }
    records.ensure_column("out_service_date");
    records.drop_column("statusDate");

    for (from, to) in RENAMES {
        records.rename_column(from, to);
    }
}
