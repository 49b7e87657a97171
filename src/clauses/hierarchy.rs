use std::collections::HashMap;

use crate::model::{Clause, ClauseRecord};

pub fn normalize_clause_id(id: &str) -> &str {
    id.strip_suffix('.').unwrap_or(id)
}

/// "1.2.3" -> "1.2"; ids without a dot have no parent.
pub fn parent_clause_id(normalized_id: &str) -> Option<&str> {
    normalized_id.rsplit_once('.').map(|(parent, _)| parent)
}

/// Nests decimal clauses under the most recent clause whose normalized id is their prefix.
///
/// A repeated normalized id replaces the lookup entry, so later children attach to the newest
/// occurrence while both occurrences stay in the forest.
pub fn build_decimal_hierarchy(clauses: Vec<Clause>) -> Vec<Clause> {
    struct Slot {
        clause: Clause,
        children: Vec<usize>,
    }

    let mut slots = Vec::<Slot>::with_capacity(clauses.len());
    let mut roots = Vec::<usize>::new();
    let mut node_index = HashMap::<String, usize>::new();

    for clause in clauses {
        let normalized = normalize_clause_id(&clause.id).to_string();
        let parent = parent_clause_id(&normalized).and_then(|id| node_index.get(id).copied());

        let slot_index = slots.len();
        slots.push(Slot {
            clause,
            children: Vec::new(),
        });
        node_index.insert(normalized, slot_index);

        match parent {
            Some(parent_index) => slots[parent_index].children.push(slot_index),
            None => roots.push(slot_index),
        }
    }

    // Children always sit after their parent, so a reverse pass sees every child finished.
    let mut built = Vec::<Option<Clause>>::with_capacity(slots.len());
    built.resize_with(slots.len(), || None);
    for (index, slot) in slots.into_iter().enumerate().rev() {
        let Slot {
            mut clause,
            children,
        } = slot;
        clause
            .subclauses
            .extend(children.into_iter().filter_map(|child| built[child].take()));
        built[index] = Some(clause);
    }

    roots
        .into_iter()
        .filter_map(|index| built[index].take())
        .collect()
}

/// Pre-order flattening of a clause forest into index records for `doc_id`.
pub fn flatten_clauses(doc_id: &str, forest: &[Clause]) -> Vec<ClauseRecord> {
    let mut records = Vec::new();
    let mut stack = forest.iter().rev().collect::<Vec<&Clause>>();

    while let Some(clause) = stack.pop() {
        records.push(ClauseRecord {
            doc_id: doc_id.to_string(),
            id: clause.id.clone(),
            text: clause.text.clone(),
        });
        stack.extend(clause.subclauses.iter().rev());
    }

    records
}
