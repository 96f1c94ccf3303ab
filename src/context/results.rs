//! Values produced by callbacks, waiting to be consumed by an ancestor.

use std::collections::HashMap;

use crate::name::QName;
use crate::value::{Value, ValueType};

struct Produced {
    depth: u32,
    producer: QName,
    value: Value,
}

/// Store of callback results, indexed by value type.
///
/// Each value remembers the depth and element that produced it. A read
/// takes (removes) only values produced strictly deeper than the reader,
/// so a callback only ever sees results of its own descendants, and each
/// value is delivered at most once.
#[derive(Default)]
pub struct ResultStore {
    by_type: HashMap<ValueType, Vec<Produced>>,
}

impl ResultStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, produced by `producer` at `depth`.
    pub fn produce(&mut self, depth: u32, producer: QName, value_type: ValueType, value: Value) {
        self.by_type.entry(value_type).or_default().push(Produced {
            depth,
            producer,
            value,
        });
    }

    /// Removes and returns, in production order, every value of
    /// `value_type` produced deeper than `reading_depth` (and by `source`,
    /// when given). Everything else stays stored.
    pub fn consume(
        &mut self,
        reading_depth: u32,
        source: Option<&QName>,
        value_type: ValueType,
    ) -> Vec<Value> {
        let Some(stored) = self.by_type.get_mut(&value_type) else {
            return Vec::new();
        };

        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(stored.len());
        for entry in stored.drain(..) {
            let below = entry.depth > reading_depth;
            let from_source = source.map_or(true, |name| &entry.producer == name);
            if below && from_source {
                taken.push(entry.value);
            } else {
                kept.push(entry);
            }
        }
        *stored = kept;
        if stored.is_empty() {
            self.by_type.remove(&value_type);
        }
        taken
    }

    /// Consumes like [`ResultStore::consume`] but delivers only the first
    /// match. The remaining matches are discarded.
    pub fn consume_first(
        &mut self,
        reading_depth: u32,
        source: Option<&QName>,
        value_type: ValueType,
    ) -> Option<Value> {
        self.consume(reading_depth, source, value_type)
            .into_iter()
            .next()
    }

    /// Number of values still stored for `value_type`.
    pub fn pending(&self, value_type: ValueType) -> usize {
        self.by_type.get(&value_type).map_or(0, Vec::len)
    }

    /// Total number of stored values.
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
