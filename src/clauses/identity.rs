use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::model::{ClauseRecord, IndexedClause};

pub fn base_key(doc_id: &str, clause_id: &str) -> String {
    format!("{doc_id}-{clause_id}")
}

/// Hands out run-unique ids: the first occurrence of a base key keeps it, later ones get `-N`.
///
/// Which duplicate stays unsuffixed depends on the order records are fed in. A candidate that
/// was already issued (a literal id shaped like a suffix, e.g. `1-2`) bumps the counter again.
#[derive(Debug, Default)]
pub struct StableIdAssigner {
    counts: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl StableIdAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, doc_id: &str, clause_id: &str) -> String {
        let key = base_key(doc_id, clause_id);
        let count = self.counts.entry(key.clone()).or_insert(0);

        loop {
            *count += 1;
            let candidate = if *count == 1 {
                key.clone()
            } else {
                format!("{key}-{count}")
            };
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
            warn!(stable_id = %candidate, "stable id already issued; trying next suffix");
        }
    }

    pub fn tag(&mut self, record: ClauseRecord) -> IndexedClause {
        let stable_id = self.assign(&record.doc_id, &record.id);
        IndexedClause {
            doc_id: record.doc_id,
            id: record.id,
            text: record.text,
            stable_id,
        }
    }
}

pub fn assign_stable_ids(records: Vec<ClauseRecord>) -> Vec<IndexedClause> {
    let mut assigner = StableIdAssigner::new();
    records
        .into_iter()
        .map(|record| assigner.tag(record))
        .collect()
}
