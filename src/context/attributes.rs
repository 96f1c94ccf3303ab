//! Depth-scoped attribute storage.

use std::collections::HashMap;

use crate::name::QName;

/// Attribute values of the elements currently open, keyed by depth.
///
/// Values are only ever read back at the depth they were written at. A
/// depth is cleared when its element closes, so a later element reusing
/// the same depth never sees stale values.
#[derive(Debug, Default)]
pub struct AttributeStore {
    scopes: HashMap<u32, HashMap<QName, String>>,
}

impl AttributeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for attribute `name` of the element open at `depth`.
    pub fn put(&mut self, depth: u32, name: QName, value: String) {
        self.scopes.entry(depth).or_default().insert(name, value);
    }

    /// Reads attribute `name` of the element open at `depth`.
    pub fn get(&self, depth: u32, name: &QName) -> Option<&str> {
        self.scopes
            .get(&depth)
            .and_then(|scope| scope.get(name))
            .map(String::as_str)
    }

    /// Drops every attribute recorded at `depth`.
    pub fn clear(&mut self, depth: u32) {
        self.scopes.remove(&depth);
    }

    /// Number of depths holding attributes.
    pub fn open_scopes(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_clear() {
        let mut store = AttributeStore::new();
        let id = QName::local("id");
        store.put(2, id.clone(), "a".to_string());

        assert_eq!(store.get(2, &id), Some("a"));
        assert_eq!(store.get(1, &id), None);
        assert_eq!(store.get(3, &id), None);

        store.clear(2);
        assert_eq!(store.get(2, &id), None);
        assert_eq!(store.open_scopes(), 0);
    }

    #[test]
    fn test_reused_depth_sees_no_stale_values() {
        let mut store = AttributeStore::new();
        let id = QName::local("id");
        let kind = QName::local("kind");
        store.put(1, id.clone(), "first".to_string());
        store.put(1, kind.clone(), "x".to_string());
        store.clear(1);

        store.put(1, id.clone(), "second".to_string());
        assert_eq!(store.get(1, &id), Some("second"));
        assert_eq!(store.get(1, &kind), None);
    }
}
