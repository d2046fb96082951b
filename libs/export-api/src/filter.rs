use std::collections::HashSet;

use crate::types::Record;

/// Set of prototype references a session is interested in.
///
/// Empty set matches every record. Matching is exact byte equality
/// against any member; there are no prefix or wildcard semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrototypeFilter {
    prototypes: HashSet<Vec<u8>>,
}

impl PrototypeFilter {
    /// Filter that accepts everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn insert(&mut self, prototype: impl Into<Vec<u8>>) {
        self.prototypes.insert(prototype.into());
    }

    pub fn matches_prototype(&self, prototype: &[u8]) -> bool {
        self.prototypes.is_empty() || self.prototypes.contains(prototype)
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.matches_prototype(&record.prototype_reference)
    }

    /// Number of `records` accepted by the filter.
    pub fn count<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> i64 {
        records.into_iter().filter(|r| self.matches(r)).count() as i64
    }
}

impl<P: Into<Vec<u8>>> FromIterator<P> for PrototypeFilter {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            prototypes: iter.into_iter().map(Into::into).collect(),
        }
    }
}
