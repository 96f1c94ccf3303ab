//! Qualified names and their resolution from user-level references.
//!
//! Every element and attribute the engine deals with is keyed by a
//! [`QName`]. References written by callers (`"item"`, `"dc:title"`,
//! `"{urn:x}item"`, or an empty string plus a fallback identifier) are
//! turned into `QName`s once, at configuration time, by a [`NameResolver`].

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// A namespace-qualified XML name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QName {
    /// Namespace URI, if any
    pub namespace: Option<String>,
    /// Local part of the name
    pub local: String,
}

impl QName {
    /// Creates a name in the given namespace.
    pub fn new(namespace: Option<impl Into<String>>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(Into::into),
            local: local.into(),
        }
    }

    /// Creates a name without a namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    /// Creates a name in `namespace`.
    pub fn qualified(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

impl From<&str> for QName {
    fn from(local: &str) -> Self {
        QName::local(local)
    }
}

/// How a fallback identifier becomes an element name when no explicit
/// reference is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingStrategy {
    /// Use the identifier as-is
    #[default]
    Verbatim,
    /// Lowercase the identifier
    Lowercase,
    /// `lineItem` / `line_item` → `line-item`
    KebabCase,
    /// `lineItem` / `line-item` → `line_item`
    SnakeCase,
}

impl NamingStrategy {
    /// Applies the strategy to an identifier.
    pub fn apply(&self, identifier: &str) -> String {
        match self {
            NamingStrategy::Verbatim => identifier.to_string(),
            NamingStrategy::Lowercase => identifier.to_lowercase(),
            NamingStrategy::KebabCase => split_words(identifier).join("-"),
            NamingStrategy::SnakeCase => split_words(identifier).join("_"),
        }
    }
}

/// Splits `camelCase`, `snake_case` and `kebab-case` identifiers into
/// lowercase words.
fn split_words(identifier: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in identifier.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Prefix-to-URI table used to resolve prefixed references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    prefixes: BTreeMap<String, String>,
    default_namespace: Option<String>,
}

impl Namespaces {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `prefix` to `uri`.
    pub fn with_prefix(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into(), uri.into());
        self
    }

    /// Sets the namespace applied to unprefixed element references.
    pub fn with_default(mut self, uri: impl Into<String>) -> Self {
        self.default_namespace = Some(uri.into());
        self
    }

    /// Looks up the URI bound to `prefix`.
    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// The default element namespace.
    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Iterates over `(prefix, uri)` bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

/// Turns user-level references into [`QName`]s.
#[derive(Debug, Clone, Copy)]
pub struct NameResolver<'a> {
    namespaces: &'a Namespaces,
    naming: NamingStrategy,
}

impl<'a> NameResolver<'a> {
    /// Creates a resolver over a namespace table and fallback strategy.
    pub fn new(namespaces: &'a Namespaces, naming: NamingStrategy) -> Self {
        Self { namespaces, naming }
    }

    /// Resolves an element reference.
    ///
    /// An empty reference falls back to `fallback` transformed by the naming
    /// strategy. Unprefixed names take the default namespace.
    pub fn element(&self, reference: &str, fallback: Option<&str>) -> Result<QName> {
        let reference = reference.trim();
        if reference.is_empty() {
            let local = match fallback {
                Some(identifier) if !identifier.trim().is_empty() => {
                    self.naming.apply(identifier.trim())
                }
                _ => return Err(Error::EmptyName("element".to_string())),
            };
            return Ok(QName::new(self.namespaces.default_namespace(), local));
        }
        self.resolve(reference, self.namespaces.default_namespace())
    }

    /// Resolves an attribute reference. Unprefixed attributes have no
    /// namespace.
    pub fn attribute(&self, reference: &str) -> Result<QName> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::EmptyName("attribute".to_string()));
        }
        self.resolve(reference, None)
    }

    fn resolve(&self, reference: &str, unprefixed: Option<&str>) -> Result<QName> {
        if let Some(rest) = reference.strip_prefix('{') {
            return match rest.split_once('}') {
                Some((_, "")) | None => Err(Error::EmptyName(reference.to_string())),
                Some(("", local)) => Ok(QName::local(local)),
                Some((uri, local)) => Ok(QName::qualified(uri, local)),
            };
        }

        match reference.split_once(':') {
            Some((prefix, local)) => {
                if local.is_empty() {
                    return Err(Error::EmptyName(reference.to_string()));
                }
                let uri = self.namespaces.uri(prefix).ok_or_else(|| Error::UnknownPrefix {
                    prefix: prefix.to_string(),
                    reference: reference.to_string(),
                })?;
                Ok(QName::qualified(uri, local))
            }
            None => Ok(QName::new(unprefixed, reference)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(QName::local("item").to_string(), "item");
        assert_eq!(QName::qualified("urn:a", "item").to_string(), "{urn:a}item");
    }

    #[test]
    fn test_naming_strategies() {
        assert_eq!(NamingStrategy::KebabCase.apply("lineItem"), "line-item");
        assert_eq!(NamingStrategy::KebabCase.apply("line_item"), "line-item");
        assert_eq!(NamingStrategy::SnakeCase.apply("lineItemV2"), "line_item_v2");
        assert_eq!(NamingStrategy::Lowercase.apply("LineItem"), "lineitem");
        assert_eq!(NamingStrategy::Verbatim.apply("lineItem"), "lineItem");
    }

    #[test]
    fn test_resolve_prefixed() {
        let ns = Namespaces::new()
            .with_prefix("dc", "http://purl.org/dc/elements/1.1/")
            .with_default("urn:catalog");
        let resolver = NameResolver::new(&ns, NamingStrategy::Verbatim);

        let title = resolver.element("dc:title", None).unwrap();
        assert_eq!(title, QName::qualified("http://purl.org/dc/elements/1.1/", "title"));

        let item = resolver.element("item", None).unwrap();
        assert_eq!(item, QName::qualified("urn:catalog", "item"));

        let attr = resolver.attribute("id").unwrap();
        assert_eq!(attr, QName::local("id"));
    }

    #[test]
    fn test_resolve_fallback() {
        let ns = Namespaces::new();
        let resolver = NameResolver::new(&ns, NamingStrategy::KebabCase);
        assert_eq!(
            resolver.element("", Some("lineItem")).unwrap(),
            QName::local("line-item")
        );
        assert!(matches!(resolver.element("", None), Err(Error::EmptyName(_))));
    }

    #[test]
    fn test_resolve_clark_notation() {
        let ns = Namespaces::new();
        let resolver = NameResolver::new(&ns, NamingStrategy::Verbatim);
        assert_eq!(
            resolver.element("{urn:x}node", None).unwrap(),
            QName::qualified("urn:x", "node")
        );
    }

    #[test]
    fn test_unknown_prefix() {
        let ns = Namespaces::new();
        let resolver = NameResolver::new(&ns, NamingStrategy::Verbatim);
        assert!(matches!(
            resolver.attribute("xlink:href"),
            Err(Error::UnknownPrefix { .. })
        ));
    }
}
