use slotmap::SlotMap;

use super::Pattern;
use crate::error::{Result, SheetfoldError};

slotmap::new_key_type! {
    /// Unique identifier for a pattern in a [`PatternStore`].
    pub struct PatternId;
}

/// Arena that owns the patterns of one nesting job.
///
/// Patterns are addressed by [`PatternId`]; iteration follows insertion
/// order, which is also the final tie-break of the nesting order.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    patterns: SlotMap<PatternId, Pattern>,
    order: Vec<PatternId>,
}

impl PatternStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pattern and returns its ID.
    pub fn insert(&mut self, pattern: Pattern) -> PatternId {
        let id = self.patterns.insert(pattern);
        self.order.push(id);
        id
    }

    /// Returns the pattern, or an error if the ID is unknown.
    ///
    /// # Errors
    ///
    /// Returns `SheetfoldError::InvalidInput` if the pattern is not in the store.
    pub fn get(&self, id: PatternId) -> Result<&Pattern> {
        self.patterns
            .get(id)
            .ok_or_else(|| SheetfoldError::InvalidInput(format!("unknown pattern {id:?}")))
    }

    /// Removes a pattern, returning it if it was present.
    pub fn remove(&mut self, id: PatternId) -> Option<Pattern> {
        let pattern = self.patterns.remove(id)?;
        self.order.retain(|&other| other != id);
        Some(pattern)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Insertion position of a pattern.
    #[must_use]
    pub fn index_of(&self, id: PatternId) -> Option<usize> {
        self.order.iter().position(|&other| other == id)
    }

    /// IDs in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[PatternId] {
        &self.order
    }

    /// Patterns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (PatternId, &Pattern)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.patterns.get(id).map(|p| (id, p)))
    }

    /// Sum of the pattern areas.
    #[must_use]
    pub fn total_area(&self) -> f64 {
        self.patterns.values().map(Pattern::area).sum()
    }
}

impl FromIterator<Pattern> for PatternStore {
    fn from_iter<I: IntoIterator<Item = Pattern>>(iter: I) -> Self {
        let mut store = Self::new();
        for pattern in iter {
            store.insert(pattern);
        }
        store
    }
}
