//! Import pre-scan (pass A).
//!
//! Builds the repo-wide `name → [defining files]` table the resolvers use.
//! Works on already-parsed records: the pipeline parses each file exactly
//! once and reuses the records for the write and resolve passes.

use crate::parsing::FileRecord;
use crate::types::ImportsMap;

/// Build the imports map from parsed records.
pub fn build_imports_map<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> ImportsMap {
    let mut map = ImportsMap::new();
    merge_records(&mut map, records);
    map
}

/// Merge exported names of `records` into an existing map, deduplicating
/// paths per name.
pub fn merge_records<'a>(
    map: &mut ImportsMap,
    records: impl IntoIterator<Item = &'a FileRecord>,
) {
    for record in records {
        for name in record.exported_names() {
            let paths = map.entry(name.to_string()).or_default();
            if !paths.iter().any(|p| p == &record.path) {
                paths.push(record.path.clone());
            }
        }
    }
}
