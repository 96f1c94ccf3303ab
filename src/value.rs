//! Typed values and text-to-value parsers.
//!
//! Values flow through the engine type-erased as [`Value`]; a
//! [`ValueType`] remembers which concrete type a binding expects.
//! The [`ParserRegistry`] converts attribute and element text into values.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};
use crate::reader::parse_bool;

/// A type-erased value produced by a parser or a callback.
pub type Value = Box<dyn Any>;

/// Runtime identity of a bound type.
#[derive(Clone, Copy)]
pub struct ValueType {
    id: TypeId,
    name: &'static str,
}

impl ValueType {
    /// The value type of `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The underlying type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True for `()`, the "produces nothing" marker.
    pub fn is_unit(&self) -> bool {
        self.id == TypeId::of::<()>()
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueType {}

impl Hash for ValueType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

type ParseFn = dyn Fn(&str) -> std::result::Result<Value, String> + Send + Sync;

/// Table of text-to-value conversions keyed by target type.
///
/// [`ParserRegistry::default`] covers booleans, the integer and float
/// families, `char`, `String`, and the chrono date types. Registering a
/// parser for a type replaces any existing one.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<TypeId, (ValueType, Arc<ParseFn>)>,
}

impl ParserRegistry {
    /// Creates a registry with no parsers at all.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registers (or replaces) the parser for `T`.
    pub fn register<T, F, E>(&mut self, parser: F) -> &mut Self
    where
        T: 'static,
        F: Fn(&str) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        let erased = move |text: &str| -> std::result::Result<Value, String> {
            parser(text)
                .map(|v| Box::new(v) as Value)
                .map_err(|e| e.to_string())
        };
        self.parsers
            .insert(TypeId::of::<T>(), (ValueType::of::<T>(), Arc::new(erased)));
        self
    }

    /// Removes the parser for `T`, returning whether one was present.
    pub fn remove<T: 'static>(&mut self) -> bool {
        self.parsers.remove(&TypeId::of::<T>()).is_some()
    }

    /// Returns true if a parser for `value_type` is registered.
    pub fn contains(&self, value_type: ValueType) -> bool {
        self.parsers.contains_key(&value_type.id())
    }

    /// Number of registered parsers.
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Returns true if no parsers are registered.
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// Converts `text` into a value of `value_type`.
    pub fn parse(&self, value_type: ValueType, text: &str) -> Result<Value> {
        let (_, parser) = self
            .parsers
            .get(&value_type.id())
            .ok_or_else(|| Error::InternalConsistency(format!("no parser for {}", value_type)))?;
        parser(text).map_err(|message| Error::ValueConversion {
            value_type: value_type.name(),
            text: text.to_string(),
            message,
        })
    }

    /// Typed convenience wrapper around [`ParserRegistry::parse`].
    pub fn parse_as<T: 'static>(&self, text: &str) -> Result<T> {
        let value = self.parse(ValueType::of::<T>(), text)?;
        value
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| {
                Error::InternalConsistency(format!(
                    "parser for {} returned another type",
                    type_name::<T>()
                ))
            })
    }

    fn register_from_str<T>(&mut self)
    where
        T: std::str::FromStr + 'static,
        T::Err: fmt::Display,
    {
        self.register::<T, _, _>(|text: &str| text.trim().parse::<T>());
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.register::<bool, _, _>(|text: &str| {
            parse_bool(text.trim()).ok_or("expected one of true, false, 1, 0")
        });
        registry.register::<String, _, _>(|text: &str| {
            Ok::<_, std::convert::Infallible>(text.to_string())
        });
        registry.register::<char, _, _>(|text: &str| {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err("expected exactly one character"),
            }
        });

        registry.register_from_str::<i8>();
        registry.register_from_str::<i16>();
        registry.register_from_str::<i32>();
        registry.register_from_str::<i64>();
        registry.register_from_str::<i128>();
        registry.register_from_str::<isize>();
        registry.register_from_str::<u8>();
        registry.register_from_str::<u16>();
        registry.register_from_str::<u32>();
        registry.register_from_str::<u64>();
        registry.register_from_str::<u128>();
        registry.register_from_str::<usize>();
        registry.register_from_str::<f32>();
        registry.register_from_str::<f64>();

        registry.register::<DateTime<FixedOffset>, _, _>(|text: &str| parse_iso8601(text.trim()));
        registry.register::<DateTime<Utc>, _, _>(|text: &str| {
            parse_iso8601(text.trim()).map(|dt| dt.with_timezone(&Utc))
        });
        registry.register::<NaiveDate, _, _>(|text: &str| {
            NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        });

        registry
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.parsers.values().map(|(t, _)| t.name()).collect();
        names.sort_unstable();
        f.debug_struct("ParserRegistry").field("types", &names).finish()
    }
}

/// Parses an ISO 8601 timestamp, assuming UTC when no offset is given.
pub fn parse_iso8601(s: &str) -> std::result::Result<DateTime<FixedOffset>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }

    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in formats {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }

    Err(format!("cannot parse timestamp: {}", s))
}
