//! Read-only catalog of eligible subjects.
//!
//! Supplied by the surrounding system (the dashboard's client/site list) and
//! treated as authoritative. The engine only reads it: work items whose
//! subject is not cataloged are logged, never rejected, since operators
//! sometimes check sites ahead of the catalog sync.

use std::collections::HashSet;

use ronda_model::normalize_subject_key;

#[derive(Debug, Clone, Default)]
pub struct SubjectCatalog {
    names: Vec<String>,
    keys: HashSet<String>,
}

impl SubjectCatalog {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let keys = names.iter().map(|n| normalize_subject_key(n)).collect();
        SubjectCatalog { names, keys }
    }

    /// Lookup by normalized key, so "BANCO central" matches "Banco Central".
    pub fn contains(&self, subject: &str) -> bool {
        self.keys.contains(&normalize_subject_key(subject))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
