//! Per-run execution state.
//!
//! This module holds everything that lives exactly as long as one run:
//!
//! - [`AttributeStore`] - attributes of the currently open owners, by depth
//! - [`ContentStore`] - captured element text with nearest-wins shadowing
//! - [`ResultStore`] - callback results awaiting an ancestor
//! - [`Controllers`] - the controller instances callbacks run against
//!
//! [`ExecutionContext`] aggregates them with the depth counter, the shared
//! parser table and the slot for the run's final result.

mod attributes;
mod content;
mod results;

pub use attributes::AttributeStore;
pub use content::ContentStore;
pub use results::ResultStore;

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::binding::Duplicate;
use crate::error::{Error, Result};
use crate::name::QName;
use crate::value::{ParserRegistry, Value, ValueType};

/// Creates one controller instance for a run.
pub(crate) type ControllerFactory = Arc<dyn Fn() -> Box<dyn Any> + Send + Sync>;

/// Controller instances of a single run, keyed by controller type.
#[derive(Default)]
pub struct Controllers {
    instances: HashMap<TypeId, Box<dyn Any>>,
}

impl Controllers {
    /// Instantiates every controller through its factory.
    pub(crate) fn instantiate<'a, I>(factories: I) -> Self
    where
        I: IntoIterator<Item = &'a (ValueType, ControllerFactory)>,
    {
        let instances = factories
            .into_iter()
            .map(|(controller_type, factory)| (controller_type.id(), factory()))
            .collect();
        Self { instances }
    }

    /// The instance for `controller_type`.
    pub(crate) fn get_mut(&mut self, controller_type: ValueType) -> Result<&mut dyn Any> {
        self.instances
            .get_mut(&controller_type.id())
            .map(|instance| &mut **instance)
            .ok_or_else(|| {
                Error::InternalConsistency(format!(
                    "no controller instance for {}",
                    controller_type
                ))
            })
    }

    /// Typed access to the instance of `C`.
    pub fn get<C: 'static>(&self) -> Option<&C> {
        self.instances
            .get(&TypeId::of::<C>())
            .and_then(|instance| instance.downcast_ref::<C>())
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if the run has no controllers.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Mutable state of one run.
///
/// Created fresh by the engine for every run and dropped when the run ends;
/// never shared between runs.
pub struct ExecutionContext<'e> {
    depth: u32,
    pub(crate) attributes: AttributeStore,
    pub(crate) content: ContentStore,
    pub(crate) results: ResultStore,
    pub(crate) controllers: Controllers,
    pub(crate) parsers: &'e ParserRegistry,
    final_type: ValueType,
    final_result: Option<Value>,
}

impl<'e> ExecutionContext<'e> {
    /// Creates the context of a run whose requested result type is `final_type`.
    pub(crate) fn new(
        parsers: &'e ParserRegistry,
        controllers: Controllers,
        final_type: ValueType,
    ) -> Self {
        Self {
            depth: 0,
            attributes: AttributeStore::new(),
            content: ContentStore::new(),
            results: ResultStore::new(),
            controllers,
            parsers,
            final_type,
            final_result: None,
        }
    }

    /// Nesting depth of the element currently being processed (0 outside
    /// the root element).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Moves one level down; called before a start-element is dispatched.
    pub(crate) fn enter(&mut self) -> u32 {
        self.depth += 1;
        self.depth
    }

    /// Moves one level up; called after an end-element is dispatched.
    pub(crate) fn leave(&mut self) -> Result<u32> {
        self.depth = self.depth.checked_sub(1).ok_or_else(|| {
            Error::InternalConsistency("depth counter went below zero".to_string())
        })?;
        Ok(self.depth)
    }

    /// The result type this run was asked for.
    pub fn final_type(&self) -> ValueType {
        self.final_type
    }

    /// Stores a callback result. If it is of the requested result type it
    /// also becomes the run's final result.
    pub(crate) fn produce(
        &mut self,
        producer: &QName,
        value_type: ValueType,
        duplicate: Duplicate,
        value: Value,
    ) {
        if value_type == self.final_type {
            if let Some(copy) = duplicate(&*value) {
                self.final_result = Some(copy);
            }
        }
        self.results
            .produce(self.depth, producer.clone(), value_type, value);
    }

    /// True once a value of the requested result type was produced.
    pub fn has_result(&self) -> bool {
        self.final_result.is_some()
    }

    /// Extracts the final result, consuming the context.
    ///
    /// A run asked for `()` succeeds without any produced value.
    pub(crate) fn into_result<R: 'static>(self) -> Result<R> {
        let value: Value = match self.final_result {
            Some(value) => value,
            None if TypeId::of::<R>() == TypeId::of::<()>() => Box::new(()),
            None => {
                return Err(Error::MissingResult {
                    value_type: type_name::<R>(),
                })
            }
        };
        value.downcast::<R>().map(|v| *v).map_err(|_| {
            Error::InternalConsistency(format!(
                "final result is not a {}",
                type_name::<R>()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::duplicate;

    fn context(parsers: &ParserRegistry) -> ExecutionContext<'_> {
        ExecutionContext::new(parsers, Controllers::default(), ValueType::of::<String>())
    }

    #[test]
    fn test_depth_counter() {
        let parsers = ParserRegistry::default();
        let mut ctx = context(&parsers);
        assert_eq!(ctx.enter(), 1);
        assert_eq!(ctx.enter(), 2);
        assert_eq!(ctx.leave().unwrap(), 1);
        assert_eq!(ctx.leave().unwrap(), 0);
        assert!(matches!(ctx.leave(), Err(Error::InternalConsistency(_))));
    }

    #[test]
    fn test_final_result_is_last_of_requested_type() {
        let parsers = ParserRegistry::default();
        let mut ctx = context(&parsers);
        let owner = QName::local("a");
        ctx.enter();
        let text = ValueType::of::<String>();
        ctx.produce(&owner, text, duplicate::<String>, Box::new("x".to_string()));
        ctx.produce(&owner, ValueType::of::<u8>(), duplicate::<u8>, Box::new(1u8));
        ctx.produce(&owner, text, duplicate::<String>, Box::new("y".to_string()));

        assert!(ctx.has_result());
        assert_eq!(ctx.results.len(), 3);
        assert_eq!(ctx.into_result::<String>().unwrap(), "y");
    }

    #[test]
    fn test_missing_result() {
        let parsers = ParserRegistry::default();
        let ctx = context(&parsers);
        assert!(matches!(
            ctx.into_result::<String>(),
            Err(Error::MissingResult { .. })
        ));

        let ctx = ExecutionContext::new(&parsers, Controllers::default(), ValueType::of::<()>());
        ctx.into_result::<()>().unwrap();
    }

    #[test]
    fn test_controllers_instantiate_per_call() {
        let factory: ControllerFactory = Arc::new(|| Box::new(Vec::<String>::new()) as Box<dyn Any>);
        let table = vec![(ValueType::of::<Vec<String>>(), factory)];

        let mut first = Controllers::instantiate(&table);
        let any = first.get_mut(ValueType::of::<Vec<String>>()).unwrap();
        any.downcast_mut::<Vec<String>>().unwrap().push("a".to_string());

        let second = Controllers::instantiate(&table);
        assert_eq!(first.get::<Vec<String>>().unwrap().len(), 1);
        assert!(second.get::<Vec<String>>().unwrap().is_empty());
        assert!(first.get_mut(ValueType::of::<u8>()).is_err());
    }
}
