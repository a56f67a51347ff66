use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    domain::RecipientId,
    phone::{canonicalize_excluding, CanonicalPhoneNumber},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientEntry {
    pub id: RecipientId,
    pub number: CanonicalPhoneNumber,
}

/// Ordered, deduplicated set of recipients.
///
/// Insertion order is the display order and the dispatch order. The backing
/// sequence is private: entries only come and go through `add` / `remove`.
#[derive(Clone, Debug, Default)]
pub struct RecipientSet {
    entries: Vec<RecipientEntry>,
    numbers: HashSet<CanonicalPhoneNumber>,
    next_id: u64,
}

impl RecipientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize `raw` and append every number not already present.
    ///
    /// Returns how many entries were added and the added entries themselves.
    pub fn add(&mut self, raw: &str) -> (usize, Vec<RecipientEntry>) {
        let mut added = Vec::new();
        for number in canonicalize_excluding(raw, &self.numbers) {
            self.next_id += 1;
            let entry = RecipientEntry {
                id: RecipientId(self.next_id),
                number,
            };
            self.numbers.insert(entry.number.clone());
            self.entries.push(entry.clone());
            added.push(entry);
        }

        if !added.is_empty() {
            tracing::debug!(added = added.len(), total = self.entries.len(), "recipients added");
        }
        (added.len(), added)
    }

    pub fn remove(&mut self, id: RecipientId) -> Option<RecipientEntry> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(idx);
        self.numbers.remove(&entry.number);
        Some(entry)
    }

    pub fn to_ordered_list(&self) -> Vec<RecipientEntry> {
        self.entries.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecipientEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, number: &CanonicalPhoneNumber) -> bool {
        self.numbers.contains(number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
