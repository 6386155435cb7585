//! CAS number lookup built from the source rows

use std::collections::HashMap;
use tracing::trace;

use crate::cas::extract_cas;
use crate::source::SourceRow;
use crate::value::CellValue;

/// Maps every CAS number seen in the source to the value of the last row
/// that mentioned it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceIndex {
    values: HashMap<String, CellValue>,
}

impl SourceIndex {
    /// Build the index in row order; later rows overwrite earlier ones
    pub fn build(rows: &[SourceRow]) -> Self {
        let mut values = HashMap::new();
        for row in rows {
            for cas in extract_cas(row.cas_text.as_deref()) {
                if let Some(previous) = values.insert(cas.to_string(), row.value.clone()) {
                    trace!(cas, row = row.row, ?previous, "CAS number repeated, keeping later value");
                }
            }
        }
        Self { values }
    }

    pub fn get(&self, cas: &str) -> Option<&CellValue> {
        self.values.get(cas)
    }

    /// First CAS number of `cas_numbers` present in the index, with its value
    pub fn first_hit<'a, 'c>(
        &'a self,
        cas_numbers: impl IntoIterator<Item = &'c str>,
    ) -> Option<(&'c str, &'a CellValue)> {
        cas_numbers
            .into_iter()
            .find_map(|cas| self.get(cas).map(|value| (cas, value)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries sorted by CAS number
    pub fn entries(&self) -> Vec<(&str, &CellValue)> {
        let mut entries: Vec<_> = self
            .values
            .iter()
            .map(|(cas, value)| (cas.as_str(), value))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
