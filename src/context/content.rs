//! Element-body text captured on behalf of open owners.
//!
//! An owner declares ("flags") the child element names whose text it
//! wants before any of those children can start. Text captured under a
//! flagged child is recorded into the innermost open scope of every owner
//! that flagged it. When a
//! child name occurs at several depths below one owner, the occurrence
//! nearest to the owner wins regardless of document order; among equally
//! deep occurrences the first one recorded wins.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::name::QName;

#[derive(Debug)]
struct Captured {
    depth: u32,
    text: String,
}

#[derive(Debug)]
struct ContentScope {
    owner_depth: u32,
    owner: QName,
    children: HashMap<QName, Option<Captured>>,
}

impl ContentScope {
    /// Applies the shadowing rule. Returns true if the text was kept.
    fn offer(&mut self, depth: u32, child: &QName, text: &str) -> bool {
        match self.children.get_mut(child) {
            Some(slot) => {
                let replace = match slot {
                    None => true,
                    Some(existing) => existing.depth > depth,
                };
                if replace {
                    *slot = Some(Captured {
                        depth,
                        text: text.to_string(),
                    });
                }
                replace
            }
            None => false,
        }
    }
}

/// Scoped store of captured element text.
///
/// Scopes form a stack ordered by owner depth, mirroring the open owners.
#[derive(Debug, Default)]
pub struct ContentStore {
    scopes: Vec<ContentScope>,
}

impl ContentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that text of `child` below `owner` (open at `owner_depth`)
    /// must be captured.
    pub fn flag(&mut self, owner_depth: u32, owner: &QName, child: QName) {
        let idx = match self
            .scopes
            .iter()
            .rposition(|s| s.owner_depth == owner_depth && &s.owner == owner)
        {
            Some(idx) => idx,
            None => {
                let idx = self
                    .scopes
                    .iter()
                    .rposition(|s| s.owner_depth < owner_depth)
                    .map_or(0, |i| i + 1);
                self.scopes.insert(
                    idx,
                    ContentScope {
                        owner_depth,
                        owner: owner.clone(),
                        children: HashMap::new(),
                    },
                );
                idx
            }
        };
        self.scopes[idx].children.entry(child).or_insert(None);
    }

    /// True if any open owner flagged `child`.
    pub fn is_flagged(&self, child: &QName) -> bool {
        self.scopes.iter().any(|s| s.children.contains_key(child))
    }

    /// Records text captured at `current_depth` for `child` into the
    /// nearest enclosing scope of `owner`.
    ///
    /// Returns whether the text displaced the previous value. Recording for
    /// an owner or child that was never flagged is an engine defect.
    pub fn record(
        &mut self,
        current_depth: u32,
        owner: &QName,
        child: &QName,
        text: &str,
    ) -> Result<bool> {
        let scope = self
            .scopes
            .iter_mut()
            .rev()
            .find(|s| s.owner_depth <= current_depth && &s.owner == owner)
            .ok_or_else(|| not_flagged(owner, child))?;
        if !scope.children.contains_key(child) {
            return Err(not_flagged(owner, child));
        }
        Ok(scope.offer(current_depth, child, text))
    }

    /// Records text captured at `current_depth` for `child` into the open
    /// scopes that flagged it. Each owner name only sees the text through its
    /// innermost open scope, so a self-nested owner never reads a level that
    /// belongs to a nested copy of itself. Returns the number of scopes that
    /// kept the text.
    pub fn capture(&mut self, current_depth: u32, child: &QName, text: &str) -> usize {
        let mut served: Vec<QName> = Vec::new();
        let mut kept = 0;
        for scope in self.scopes.iter_mut().rev() {
            if scope.owner_depth >= current_depth
                || !scope.children.contains_key(child)
                || served.contains(&scope.owner)
            {
                continue;
            }
            served.push(scope.owner.clone());
            if scope.offer(current_depth, child, text) {
                kept += 1;
            }
        }
        kept
    }

    /// Reads the text captured for `child` by `owner`, searching upward
    /// from `owner_depth` for the owner's nearest scope.
    pub fn read(&self, owner_depth: u32, owner: &QName, child: &QName) -> Result<Option<&str>> {
        let scope = self
            .scopes
            .iter()
            .rev()
            .find(|s| s.owner_depth <= owner_depth && &s.owner == owner)
            .ok_or_else(|| not_flagged(owner, child))?;
        match scope.children.get(child) {
            Some(slot) => Ok(slot.as_ref().map(|c| c.text.as_str())),
            None => Err(not_flagged(owner, child)),
        }
    }

    /// Drops the scope of `owner` open at `owner_depth`. Returns whether a
    /// scope existed.
    pub fn clear(&mut self, owner_depth: u32, owner: &QName) -> bool {
        match self
            .scopes
            .iter()
            .rposition(|s| s.owner_depth == owner_depth && &s.owner == owner)
        {
            Some(idx) => {
                self.scopes.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Number of open scopes.
    pub fn open_scopes(&self) -> usize {
        self.scopes.len()
    }
}

fn not_flagged(owner: &QName, child: &QName) -> Error {
    Error::InternalConsistency(format!(
        "content <{}> read or written for <{}> before it was flagged",
        child, owner
    ))
}
