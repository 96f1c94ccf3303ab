//! Binding descriptors: what each callback triggers on and what it receives.
//!
//! A [`Binding`] is built once by [`EngineBuilder`](crate::EngineBuilder)
//! and shared read-only by every run. Its [`ParamBinding`]s describe, in
//! declaration order, where each callback argument comes from.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::{CallbackError, Error};
use crate::name::QName;
use crate::value::{Value, ValueType};

/// Source of a single callback argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamBinding {
    /// An attribute of the owner element
    Attribute {
        /// Attribute name
        name: QName,
        /// Target type
        value_type: ValueType,
        /// Whether the callback runs without it
        optional: bool,
    },
    /// Text of a descendant element, nearest to the owner
    Content {
        /// Child element name
        child: QName,
        /// Target type
        value_type: ValueType,
        /// Whether the callback runs without it
        optional: bool,
    },
    /// The first not-yet-consumed value produced below the owner
    SingleResult {
        /// Restrict to values produced by this element
        source: Option<QName>,
        /// Type of the produced value
        value_type: ValueType,
        /// Whether the callback runs without it
        optional: bool,
    },
    /// Every not-yet-consumed value produced below the owner
    ResultList {
        /// Restrict to values produced by this element
        source: Option<QName>,
        /// Type of the list elements
        element_type: ValueType,
        /// Whether the callback runs with an empty list
        optional: bool,
    },
}

impl ParamBinding {
    /// Whether the callback may run when this binding resolves to nothing.
    pub fn is_optional(&self) -> bool {
        match self {
            ParamBinding::Attribute { optional, .. }
            | ParamBinding::Content { optional, .. }
            | ParamBinding::SingleResult { optional, .. }
            | ParamBinding::ResultList { optional, .. } => *optional,
        }
    }

    /// The bound type (element type for lists).
    pub fn value_type(&self) -> ValueType {
        match self {
            ParamBinding::Attribute { value_type, .. }
            | ParamBinding::Content { value_type, .. }
            | ParamBinding::SingleResult { value_type, .. } => *value_type,
            ParamBinding::ResultList { element_type, .. } => *element_type,
        }
    }

    /// True for bindings whose value is parsed from text.
    pub fn needs_parser(&self) -> bool {
        matches!(
            self,
            ParamBinding::Attribute { .. } | ParamBinding::Content { .. }
        )
    }
}

pub(crate) type Callback =
    Arc<dyn Fn(&mut dyn Any, &mut Arguments) -> Result<Option<Value>, CallbackError> + Send + Sync>;

pub(crate) type Duplicate = fn(&dyn Any) -> Option<Value>;

/// Immutable description of one callback.
#[derive(Clone)]
pub struct Binding {
    pub(crate) owner: QName,
    pub(crate) recursive: bool,
    pub(crate) params: Vec<ParamBinding>,
    pub(crate) controller: ValueType,
    pub(crate) returns: ValueType,
    pub(crate) duplicate: Duplicate,
    pub(crate) callback: Callback,
}

impl Binding {
    /// The element whose end triggers the callback.
    pub fn owner(&self) -> &QName {
        &self.owner
    }

    /// Whether the owner may nest inside itself.
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Parameter bindings in declaration order.
    pub fn params(&self) -> &[ParamBinding] {
        &self.params
    }

    /// Controller type the callback runs against.
    pub fn controller_type(&self) -> ValueType {
        self.controller
    }

    /// Type of the value the callback produces (`()` for none).
    pub fn return_type(&self) -> ValueType {
        self.returns
    }

    /// True if a start tag named `name` carrying `attributes` satisfies
    /// this binding's owner name and every required attribute.
    pub(crate) fn accepts(&self, name: &QName, attributes: &[(QName, String)]) -> bool {
        name == &self.owner
            && self.params.iter().all(|p| match p {
                ParamBinding::Attribute {
                    name: attribute,
                    optional: false,
                    ..
                } => attributes.iter().any(|(n, _)| n == attribute),
                _ => true,
            })
    }

    /// True if attribute `name` is bound by this binding.
    pub(crate) fn binds_attribute(&self, name: &QName) -> bool {
        self.params
            .iter()
            .any(|p| matches!(p, ParamBinding::Attribute { name: n, .. } if n == name))
    }

    /// Child names whose text this binding captures.
    pub(crate) fn content_children(&self) -> impl Iterator<Item = &QName> {
        self.params.iter().filter_map(|p| match p {
            ParamBinding::Content { child, .. } => Some(child),
            _ => None,
        })
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("owner", &self.owner)
            .field("recursive", &self.recursive)
            .field("params", &self.params)
            .field("controller", &self.controller)
            .field("returns", &self.returns)
            .finish()
    }
}

/// Wraps a typed callback into the erased form stored in a [`Binding`].
pub(crate) fn erase<C, V, F>(callback: F) -> Callback
where
    C: 'static,
    V: Clone + 'static,
    F: Fn(&mut C, &mut Arguments) -> Result<V, CallbackError> + Send + Sync + 'static,
{
    Arc::new(
        move |controller: &mut dyn Any,
              args: &mut Arguments|
              -> Result<Option<Value>, CallbackError> {
            let controller = controller.downcast_mut::<C>().ok_or_else(|| {
                CallbackError::Unexpected(Error::InternalConsistency(format!(
                    "controller instance is not a {}",
                    type_name::<C>()
                )))
            })?;
            let produced = callback(controller, args)?;
            if TypeId::of::<V>() == TypeId::of::<()>() {
                Ok(None)
            } else {
                Ok(Some(Box::new(produced) as Value))
            }
        },
    )
}

/// Clones a produced value of type `V` for use as the run's final result.
pub(crate) fn duplicate<V: Clone + 'static>(value: &dyn Any) -> Option<Value> {
    value
        .downcast_ref::<V>()
        .map(|v| Box::new(v.clone()) as Value)
}

/// A resolved callback argument.
pub(crate) enum Argument {
    Absent,
    Value(Value),
    List(Vec<Value>),
}

impl Argument {
    pub(crate) fn is_absent(&self) -> bool {
        matches!(self, Argument::Absent)
    }
}

/// Arguments handed to a callback, in parameter declaration order.
///
/// Each argument can be taken once; taking moves the value out.
pub struct Arguments {
    values: Vec<Argument>,
}

impl Arguments {
    pub(crate) fn new(values: Vec<Argument>) -> Self {
        Self { values }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the callback declared no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether argument `index` resolved to something (and was not taken yet).
    pub fn is_present(&self, index: usize) -> bool {
        matches!(
            self.values.get(index),
            Some(Argument::Value(_) | Argument::List(_))
        )
    }

    /// Takes argument `index`, or `None` if it resolved to nothing.
    pub fn take<T: 'static>(&mut self, index: usize) -> Result<Option<T>, CallbackError> {
        match self.slot(index) {
            Argument::Absent => Ok(None),
            Argument::Value(value) => value
                .downcast::<T>()
                .map(|v| Some(*v))
                .map_err(|_| mismatch::<T>(index)),
            Argument::List(_) => Err(mismatch::<T>(index)),
        }
    }

    /// Takes argument `index`, failing if it resolved to nothing.
    pub fn required<T: 'static>(&mut self, index: usize) -> Result<T, CallbackError> {
        self.take::<T>(index)?.ok_or_else(|| mismatch::<T>(index))
    }

    /// Takes list argument `index`. An absent argument yields an empty list.
    pub fn take_list<T: 'static>(&mut self, index: usize) -> Result<Vec<T>, CallbackError> {
        match self.slot(index) {
            Argument::Absent => Ok(Vec::new()),
            Argument::Value(value) => value
                .downcast::<T>()
                .map(|v| vec![*v])
                .map_err(|_| mismatch::<T>(index)),
            Argument::List(values) => values
                .into_iter()
                .map(|v| v.downcast::<T>().map(|v| *v).map_err(|_| mismatch::<T>(index)))
                .collect(),
        }
    }

    fn slot(&mut self, index: usize) -> Argument {
        self.values
            .get_mut(index)
            .map_or(Argument::Absent, |slot| std::mem::replace(slot, Argument::Absent))
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shapes: Vec<&str> = self
            .values
            .iter()
            .map(|a| match a {
                Argument::Absent => "absent",
                Argument::Value(_) => "value",
                Argument::List(_) => "list",
            })
            .collect();
        f.debug_struct("Arguments").field("values", &shapes).finish()
    }
}

fn mismatch<T>(index: usize) -> CallbackError {
    CallbackError::Unexpected(Error::ArgumentType {
        index,
        expected: type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, optional: bool) -> ParamBinding {
        ParamBinding::Attribute {
            name: QName::local(name),
            value_type: ValueType::of::<String>(),
            optional,
        }
    }

    fn binding(params: Vec<ParamBinding>) -> Binding {
        Binding {
            owner: QName::local("item"),
            recursive: false,
            params,
            controller: ValueType::of::<()>(),
            returns: ValueType::of::<()>(),
            duplicate: duplicate::<()>,
            callback: erase::<(), (), _>(|_, _| Ok(())),
        }
    }

    #[test]
    fn test_accepts_requires_attributes() {
        let b = binding(vec![attr("id", false), attr("kind", true)]);
        let id = (QName::local("id"), "1".to_string());

        assert!(b.accepts(&QName::local("item"), &[id.clone()]));
        assert!(!b.accepts(&QName::local("item"), &[]));
        assert!(!b.accepts(&QName::local("other"), &[id]));
        assert!(b.binds_attribute(&QName::local("kind")));
        assert!(!b.binds_attribute(&QName::local("x")));
    }

    #[test]
    fn test_arguments_take_once() {
        let mut args = Arguments::new(vec![
            Argument::Value(Box::new(7u32)),
            Argument::Absent,
            Argument::List(vec![Box::new(1i32), Box::new(2i32)]),
        ]);

        assert!(args.is_present(0));
        assert_eq!(args.take::<u32>(0).unwrap(), Some(7));
        assert!(!args.is_present(0));
        assert_eq!(args.take::<u32>(0).unwrap(), None);
        assert_eq!(args.take::<String>(1).unwrap(), None);
        assert_eq!(args.take_list::<i32>(2).unwrap(), vec![1, 2]);
        assert!(args.take_list::<i32>(9).unwrap().is_empty());
    }

    #[test]
    fn test_arguments_type_mismatch() {
        let mut args = Arguments::new(vec![Argument::Value(Box::new(7u32))]);
        match args.take::<String>(0) {
            Err(CallbackError::Unexpected(Error::ArgumentType { index, .. })) => {
                assert_eq!(index, 0)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_erased_callback_unit_produces_nothing() {
        let cb = erase::<u32, (), _>(|counter, _| {
            *counter += 1;
            Ok(())
        });
        let mut counter = 0u32;
        let mut args = Arguments::new(vec![]);
        assert!(cb(&mut counter, &mut args).unwrap().is_none());
        assert_eq!(counter, 1);

        let cb = erase::<u32, String, _>(|counter, _| Ok(format!("n{}", counter)));
        let produced = cb(&mut counter, &mut args).unwrap().unwrap();
        assert_eq!(*produced.downcast::<String>().unwrap(), "n1");
    }

    #[test]
    fn test_param_accessors() {
        assert!(!attr("id", false).is_optional());
        assert!(attr("id", true).is_optional());
        assert!(attr("id", true).needs_parser());

        let list = ParamBinding::ResultList {
            source: None,
            element_type: ValueType::of::<u32>(),
            optional: false,
        };
        assert!(!list.needs_parser());
        assert_eq!(list.value_type(), ValueType::of::<u32>());
    }
}
