//! Growable term vectors, and the arena that owns every nested OR/AND
//! sub-store for one statement (§3, "TermStore"; §9 "Cross-referential term
//! graph").
//!
//! Parent pointers within one store are dense [`TermId`]s rather than raw
//! pointers. Nested stores (one per OR/AND sub-clause) are themselves
//! stored in a single grow-only arena owned by the
//! [`crate::context::WhereContext`], addressed by [`StoreId`], instead of
//! being owned directly by the carrying [`crate::term::Term`] — Rust's
//! aliasing rules make a `Term` that owns a `Box<TermStore>` while also
//! being looked up by dense index from its own store awkward to mutate in
//! place; the arena indirection sidesteps that without losing the "owned
//! by its carrier, destroyed with it" semantics (the arena is dropped in
//! its entirety with the context, and a sub-store is only ever reachable
//! through its owning term's `or_info`/`and_info`).

use super::Term;

/// The connective a [`TermStore`] was split by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

/// Dense index of one [`TermStore`] within a [`TermArena`].
pub type StoreId = usize;

/// Dense index of one [`Term`] within a single [`TermStore`].
pub type TermId = usize;

/// An ordered growable vector of terms, all implicitly joined by the same
/// top-level connective.
#[derive(Debug, Clone)]
pub struct TermStore {
    pub terms: Vec<Term>,
    pub connective: Connective,
    /// The enclosing store, for stores created by OR/AND sub-clause
    /// splitting. Inner stores inherit access to the outer store for
    /// transitive equality lookups (§4.3.4).
    pub outer: Option<StoreId>,
}

impl TermStore {
    pub fn new(connective: Connective, outer: Option<StoreId>) -> TermStore {
        TermStore {
            terms: Vec::new(),
            connective,
            outer,
        }
    }

    pub fn push(&mut self, term: Term) -> TermId {
        self.terms.push(term);
        self.terms.len() - 1
    }

    pub fn get(&self, id: TermId) -> &Term {
        &self.terms[id]
    }

    pub fn get_mut(&mut self, id: TermId) -> &mut Term {
        &mut self.terms[id]
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TermId, &Term)> {
        self.terms.iter().enumerate()
    }
}

/// Owns every [`TermStore`] created while analysing one statement: the
/// top-level store at index 0, plus one nested store per OR/AND sub-clause.
#[derive(Debug, Clone, Default)]
pub struct TermArena {
    stores: Vec<TermStore>,
}

impl TermArena {
    pub fn new() -> TermArena {
        TermArena { stores: Vec::new() }
    }

    /// Allocate a new store and return its id.
    pub fn alloc(&mut self, connective: Connective, outer: Option<StoreId>) -> StoreId {
        self.stores.push(TermStore::new(connective, outer));
        self.stores.len() - 1
    }

    pub fn get(&self, id: StoreId) -> &TermStore {
        &self.stores[id]
    }

    pub fn get_mut(&mut self, id: StoreId) -> &mut TermStore {
        &mut self.stores[id]
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }
}
