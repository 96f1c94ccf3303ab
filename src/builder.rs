//! Configuration surface for [`Engine`].
//!
//! Declarations are collected as written and validated in one place, by
//! [`EngineBuilder::build`]: controller registrations, namespace tables,
//! element and attribute names, and parser availability are all checked
//! before an engine exists.
//!
//! ```rust
//! use xmlmap_rs::{ControllerConfig, Engine, Namespaces};
//!
//! #[derive(Default)]
//! struct Catalog;
//!
//! let engine = Engine::<Vec<String>>::builder()
//!     .controller::<Catalog>()
//!     .configure::<Catalog>(
//!         ControllerConfig::new().with_namespaces(Namespaces::new().with_prefix("c", "urn:catalog")),
//!     )
//!     .on::<Catalog>("c:book")
//!     .attribute::<String>("id")
//!     .handle(|_, args| args.required::<String>(0))
//!     .on::<Catalog>("c:catalog")
//!     .results::<String>()
//!     .handle(|_, args| args.take_list::<String>(0))
//!     .build()
//!     .unwrap();
//!
//! let ids = engine
//!     .run_str(r#"<catalog xmlns="urn:catalog"><book id="b1"/><book id="b2"/></catalog>"#)
//!     .unwrap();
//! assert_eq!(ids, vec!["b1", "b2"]);
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;

use crate::binding::{duplicate, erase, Arguments, Binding, Callback, Duplicate, ParamBinding};
use crate::context::ControllerFactory;
use crate::engine::Engine;
use crate::error::{CallbackError, Error, Result};
use crate::name::{NameResolver, NamingStrategy, Namespaces};
use crate::value::{ParserRegistry, ValueType};

/// Per-controller name resolution settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Prefix table and default element namespace
    pub namespaces: Namespaces,
    /// How fallback identifiers become element names
    pub naming: NamingStrategy,
}

impl ControllerConfig {
    /// Creates a config with no namespaces and verbatim naming.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace table.
    pub fn with_namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Sets the naming strategy.
    pub fn with_naming(mut self, naming: NamingStrategy) -> Self {
        self.naming = naming;
        self
    }
}

struct ControllerEntry {
    controller_type: ValueType,
    factory: ControllerFactory,
    config: ControllerConfig,
}

#[derive(Debug)]
enum ParamSource {
    Attribute(String),
    Content(String),
    Result(Option<String>),
    Results(Option<String>),
}

#[derive(Debug)]
struct ParamDecl {
    source: ParamSource,
    value_type: ValueType,
    optional: bool,
}

struct Declaration {
    controller: ValueType,
    reference: String,
    fallback: Option<String>,
    recursive: bool,
    params: Vec<ParamDecl>,
    returns: ValueType,
    duplicate: Duplicate,
    callback: Callback,
}

/// Collects controllers, parsers and element bindings for an [`Engine`].
pub struct EngineBuilder<R = ()> {
    parsers: ParserRegistry,
    controllers: Vec<ControllerEntry>,
    declarations: Vec<Declaration>,
    errors: Vec<Error>,
    _result: PhantomData<fn() -> R>,
}

impl<R: 'static> Default for EngineBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: 'static> EngineBuilder<R> {
    /// Creates a builder with the default value parsers.
    pub fn new() -> Self {
        Self {
            parsers: ParserRegistry::default(),
            controllers: Vec::new(),
            declarations: Vec::new(),
            errors: Vec::new(),
            _result: PhantomData,
        }
    }

    /// Registers `C`; every run gets a fresh `C::default()`.
    pub fn controller<C: Default + 'static>(self) -> Self {
        self.register(
            ValueType::of::<C>(),
            Arc::new(|| Box::new(C::default()) as Box<dyn Any>),
        )
    }

    /// Registers `C`; every run gets an instance from `factory`.
    pub fn controller_with<C, F>(self, factory: F) -> Self
    where
        C: 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.register(
            ValueType::of::<C>(),
            Arc::new(move || Box::new(factory()) as Box<dyn Any>),
        )
    }

    /// Registers one instance shared by every run.
    ///
    /// Bindings for it are declared against `Arc<S>`. The instance is used
    /// from concurrent runs as-is, so any mutation needs interior
    /// synchronisation.
    pub fn shared_controller<S: Send + Sync + 'static>(self, shared: Arc<S>) -> Self {
        self.register(
            ValueType::of::<Arc<S>>(),
            Arc::new(move || Box::new(Arc::clone(&shared)) as Box<dyn Any>),
        )
    }

    fn register(mut self, controller_type: ValueType, factory: ControllerFactory) -> Self {
        if self
            .controllers
            .iter()
            .any(|c| c.controller_type == controller_type)
        {
            self.errors
                .push(Error::DuplicateController(controller_type.name()));
        } else {
            self.controllers.push(ControllerEntry {
                controller_type,
                factory,
                config: ControllerConfig::default(),
            });
        }
        self
    }

    /// Sets name resolution for the already registered controller `C`.
    pub fn configure<C: 'static>(mut self, config: ControllerConfig) -> Self {
        let controller_type = ValueType::of::<C>();
        match self
            .controllers
            .iter_mut()
            .find(|c| c.controller_type == controller_type)
        {
            Some(entry) => entry.config = config,
            None => self
                .errors
                .push(Error::UnknownController(controller_type.name())),
        }
        self
    }

    /// Registers (or replaces) the text parser for `T`.
    pub fn parser<T, F, E>(mut self, parser: F) -> Self
    where
        T: 'static,
        F: Fn(&str) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        self.parsers.register::<T, F, E>(parser);
        self
    }

    /// Removes the text parser for `T`.
    pub fn remove_parser<T: 'static>(mut self) -> Self {
        self.parsers.remove::<T>();
        self
    }

    /// Replaces the whole parser table.
    pub fn parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    /// Starts a binding whose callback runs against controller `C` when
    /// `element` closes.
    ///
    /// `element` may be `prefix:local`, `{uri}local` or a bare local name.
    /// An empty reference takes its name from [`ElementBinder::named`].
    pub fn on<C: 'static>(self, element: &str) -> ElementBinder<R, C> {
        ElementBinder {
            builder: self,
            reference: element.to_string(),
            fallback: None,
            recursive: false,
            params: Vec::new(),
            _controller: PhantomData,
        }
    }

    /// Validates every declaration and compiles the engine.
    pub fn build(self) -> Result<Engine<R>> {
        let EngineBuilder {
            parsers,
            controllers,
            declarations,
            errors,
            ..
        } = self;

        if let Some(error) = errors.into_iter().next() {
            return Err(error);
        }
        if declarations.is_empty() {
            return Err(Error::NoBindings);
        }
        check_namespaces(&controllers)?;

        let mut bindings = Vec::with_capacity(declarations.len());
        for decl in declarations {
            let entry = controllers
                .iter()
                .find(|c| c.controller_type == decl.controller)
                .ok_or(Error::UnknownController(decl.controller.name()))?;
            let resolver = NameResolver::new(&entry.config.namespaces, entry.config.naming);

            let owner = resolver.element(&decl.reference, decl.fallback.as_deref())?;
            let params = decl
                .params
                .into_iter()
                .map(|p| resolve_param(p, &resolver))
                .collect::<Result<Vec<_>>>()?;

            if let Some(missing) = params
                .iter()
                .find(|p| p.needs_parser() && !parsers.contains(p.value_type()))
            {
                return Err(Error::NoParser {
                    value_type: missing.value_type().name(),
                    element: owner.to_string(),
                });
            }

            bindings.push(Binding {
                owner,
                recursive: decl.recursive,
                params,
                controller: decl.controller,
                returns: decl.returns,
                duplicate: decl.duplicate,
                callback: decl.callback,
            });
        }

        debug!(
            "engine built: {} binding(s), {} controller(s), {} parser(s)",
            bindings.len(),
            controllers.len(),
            parsers.len()
        );
        let controllers = controllers
            .into_iter()
            .map(|c| (c.controller_type, c.factory))
            .collect();
        Ok(Engine::new(bindings, parsers, controllers))
    }
}

impl<R> fmt::Debug for EngineBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let controllers: Vec<ValueType> =
            self.controllers.iter().map(|c| c.controller_type).collect();
        f.debug_struct("EngineBuilder")
            .field("controllers", &controllers)
            .field("declarations", &self.declarations.len())
            .field("parsers", &self.parsers.len())
            .finish()
    }
}

fn check_namespaces(controllers: &[ControllerEntry]) -> Result<()> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for entry in controllers {
        for (prefix, uri) in entry.config.namespaces.iter() {
            match seen.get(prefix) {
                Some(first) if *first != uri => {
                    return Err(Error::InconsistentNamespace {
                        prefix: prefix.to_string(),
                        first: first.to_string(),
                        second: uri.to_string(),
                    })
                }
                Some(_) => {}
                None => {
                    seen.insert(prefix, uri);
                }
            }
        }
    }
    Ok(())
}

fn resolve_param(decl: ParamDecl, resolver: &NameResolver<'_>) -> Result<ParamBinding> {
    let ParamDecl {
        source,
        value_type,
        optional,
    } = decl;
    let source_name = |source: Option<String>| -> Result<_> {
        source
            .map(|reference| resolver.element(&reference, None))
            .transpose()
    };
    Ok(match source {
        ParamSource::Attribute(reference) => ParamBinding::Attribute {
            name: resolver.attribute(&reference)?,
            value_type,
            optional,
        },
        ParamSource::Content(reference) => ParamBinding::Content {
            child: resolver.element(&reference, None)?,
            value_type,
            optional,
        },
        ParamSource::Result(source) => ParamBinding::SingleResult {
            source: source_name(source)?,
            value_type,
            optional,
        },
        ParamSource::Results(source) => ParamBinding::ResultList {
            source: source_name(source)?,
            element_type: value_type,
            optional,
        },
    })
}

/// Declares one binding: its owner, parameters and callback.
///
/// Parameters are handed to the callback in the order they are declared
/// here. Finish with [`ElementBinder::handle`].
pub struct ElementBinder<R, C> {
    builder: EngineBuilder<R>,
    reference: String,
    fallback: Option<String>,
    recursive: bool,
    params: Vec<ParamDecl>,
    _controller: PhantomData<fn(&mut C)>,
}

impl<R: 'static, C: 'static> ElementBinder<R, C> {
    /// Identifier turned into the element name by the controller's naming
    /// strategy when the element reference is empty.
    pub fn named(mut self, identifier: &str) -> Self {
        self.fallback = Some(identifier.to_string());
        self
    }

    /// Allows the owner to nest inside itself; the callback then runs once
    /// per nesting level, innermost first.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Binds an attribute of the owner, parsed as `T`.
    pub fn attribute<T: 'static>(self, name: &str) -> Self {
        self.param(ParamSource::Attribute(name.to_string()), ValueType::of::<T>())
    }

    /// Binds the text of the `child` element nearest to the owner, parsed
    /// as `T`.
    pub fn content<T: 'static>(self, child: &str) -> Self {
        self.param(ParamSource::Content(child.to_string()), ValueType::of::<T>())
    }

    /// Binds the first unconsumed `T` produced below the owner.
    pub fn result<T: 'static>(self) -> Self {
        self.param(ParamSource::Result(None), ValueType::of::<T>())
    }

    /// Binds the first unconsumed `T` produced by a `source` element below
    /// the owner.
    pub fn result_from<T: 'static>(self, source: &str) -> Self {
        self.param(
            ParamSource::Result(Some(source.to_string())),
            ValueType::of::<T>(),
        )
    }

    /// Binds every unconsumed `T` produced below the owner.
    pub fn results<T: 'static>(self) -> Self {
        self.param(ParamSource::Results(None), ValueType::of::<T>())
    }

    /// Binds every unconsumed `T` produced by `source` elements below the
    /// owner.
    pub fn results_from<T: 'static>(self, source: &str) -> Self {
        self.param(
            ParamSource::Results(Some(source.to_string())),
            ValueType::of::<T>(),
        )
    }

    /// Marks the most recently declared parameter optional.
    pub fn optional(mut self) -> Self {
        if let Some(last) = self.params.last_mut() {
            last.optional = true;
        }
        self
    }

    fn param(mut self, source: ParamSource, value_type: ValueType) -> Self {
        self.params.push(ParamDecl {
            source,
            value_type,
            optional: false,
        });
        self
    }

    /// Sets the callback and returns to the builder.
    ///
    /// A callback returning `()` produces nothing; any other value is
    /// stored for ancestors and becomes the run's result when its type is
    /// `R`.
    pub fn handle<V, F>(self, callback: F) -> EngineBuilder<R>
    where
        V: Clone + 'static,
        F: Fn(&mut C, &mut Arguments) -> std::result::Result<V, CallbackError>
            + Send
            + Sync
            + 'static,
    {
        let ElementBinder {
            mut builder,
            reference,
            fallback,
            recursive,
            params,
            ..
        } = self;
        builder.declarations.push(Declaration {
            controller: ValueType::of::<C>(),
            reference,
            fallback,
            recursive,
            params,
            returns: ValueType::of::<V>(),
            duplicate: duplicate::<V>,
            callback: erase::<C, V, F>(callback),
        });
        builder
    }
}

impl<R, C> fmt::Debug for ElementBinder<R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementBinder")
            .field("reference", &self.reference)
            .field("fallback", &self.fallback)
            .field("recursive", &self.recursive)
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::QName;

    #[derive(Default)]
    struct Catalog;

    #[derive(Default)]
    struct Audit;

    fn catalog_ns() -> ControllerConfig {
        ControllerConfig::new().with_namespaces(Namespaces::new().with_prefix("c", "urn:catalog"))
    }

    #[test]
    fn test_no_bindings() {
        let err = Engine::<()>::builder()
            .controller::<Catalog>()
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::NoBindings));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_controller() {
        let err = Engine::<()>::builder()
            .controller::<Catalog>()
            .controller_with(|| Catalog)
            .on::<Catalog>("book")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateController(_)));
    }

    #[test]
    fn test_unknown_controller() {
        let err = Engine::<()>::builder()
            .controller::<Catalog>()
            .on::<Audit>("book")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownController(_)));

        let err = Engine::<()>::builder()
            .configure::<Audit>(ControllerConfig::new())
            .controller::<Catalog>()
            .on::<Catalog>("book")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownController(_)));
    }

    #[test]
    fn test_inconsistent_namespaces() {
        let err = Engine::<()>::builder()
            .controller::<Catalog>()
            .controller::<Audit>()
            .configure::<Catalog>(catalog_ns())
            .configure::<Audit>(
                ControllerConfig::new()
                    .with_namespaces(Namespaces::new().with_prefix("c", "urn:other")),
            )
            .on::<Catalog>("c:book")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap_err();
        match err {
            Error::InconsistentNamespace {
                prefix,
                first,
                second,
            } => {
                assert_eq!(prefix, "c");
                assert_eq!(first, "urn:catalog");
                assert_eq!(second, "urn:other");
            }
            other => panic!("unexpected: {:?}", other),
        }

        // Agreeing declarations are fine.
        Engine::<()>::builder()
            .controller::<Catalog>()
            .controller::<Audit>()
            .configure::<Catalog>(catalog_ns())
            .configure::<Audit>(catalog_ns())
            .on::<Audit>("c:book")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap();
    }

    #[test]
    fn test_unknown_prefix() {
        let err = Engine::<()>::builder()
            .controller::<Catalog>()
            .on::<Catalog>("x:book")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPrefix { .. }));
    }

    #[test]
    fn test_missing_parser() {
        #[derive(Clone)]
        struct Isbn;

        let err = Engine::<()>::builder()
            .controller::<Catalog>()
            .on::<Catalog>("book")
            .attribute::<Isbn>("isbn")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::NoParser { element, .. } if element == "book"));

        let err = Engine::<()>::builder()
            .remove_parser::<u32>()
            .controller::<Catalog>()
            .on::<Catalog>("book")
            .content::<u32>("pages")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::NoParser { value_type: "u32", .. }));

        // Produced values need no parser.
        Engine::<()>::builder()
            .controller::<Catalog>()
            .on::<Catalog>("book")
            .results::<Isbn>()
            .handle(|_, _| Ok(()))
            .build()
            .unwrap();
    }

    #[test]
    fn test_names_resolve_through_namespaces() {
        let engine = Engine::<(String, Option<String>)>::builder()
            .controller::<Catalog>()
            .configure::<Catalog>(catalog_ns())
            .on::<Catalog>("c:book")
            .attribute::<String>("c:id")
            .attribute::<String>("lang")
            .optional()
            .handle(|_, args| Ok((args.required::<String>(0)?, args.take::<String>(1)?)))
            .build()
            .unwrap();

        let binding = &engine.bindings()[0];
        assert_eq!(binding.owner(), &QName::qualified("urn:catalog", "book"));
        assert_eq!(binding.params().len(), 2);
        assert!(binding.params()[1].is_optional());

        let (id, lang) = engine
            .run_str(r#"<x:book xmlns:x="urn:catalog" x:id="7" lang="en"/>"#)
            .unwrap();
        assert_eq!(id, "7");
        assert_eq!(lang.as_deref(), Some("en"));

        // Same local name outside the namespace is not matched.
        assert!(engine.run_str(r#"<book id="7"/>"#).is_err());
    }

    #[test]
    fn test_default_namespace_and_clark_names() {
        let engine = Engine::<Vec<String>>::builder()
            .controller::<Catalog>()
            .configure::<Catalog>(
                ControllerConfig::new()
                    .with_namespaces(Namespaces::new().with_default("urn:catalog")),
            )
            .on::<Catalog>("title")
            .handle(|_, _| Ok("title".to_string()))
            .on::<Catalog>("{}catalog")
            .results_from::<String>("{urn:catalog}title")
            .handle(|_, args| args.take_list::<String>(0))
            .build()
            .unwrap();

        assert_eq!(
            engine.bindings()[1].owner(),
            &QName::local("catalog")
        );
        let found = engine
            .run_str(r#"<catalog><title xmlns="urn:catalog"/><title/></catalog>"#)
            .unwrap();
        assert_eq!(found, vec!["title"]);
    }

    #[test]
    fn test_fallback_name() {
        let engine = Engine::<u32>::builder()
            .controller::<Catalog>()
            .configure::<Catalog>(ControllerConfig::new().with_naming(NamingStrategy::KebabCase))
            .on::<Catalog>("")
            .named("lineItem")
            .attribute::<u32>("qty")
            .handle(|_, args| args.required::<u32>(0))
            .build()
            .unwrap();

        assert_eq!(engine.bindings()[0].owner(), &QName::local("line-item"));
        assert_eq!(engine.run_str(r#"<line-item qty="4"/>"#).unwrap(), 4);

        let err = Engine::<()>::builder()
            .controller::<Catalog>()
            .on::<Catalog>("")
            .handle(|_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::EmptyName(_)));
    }

    #[test]
    fn test_controller_factory() {
        struct Prefixed(&'static str);

        let engine = Engine::<String>::builder()
            .controller_with(|| Prefixed("sku-"))
            .on::<Prefixed>("item")
            .attribute::<String>("id")
            .handle(|p, args| Ok(format!("{}{}", p.0, args.required::<String>(0)?)))
            .build()
            .unwrap();

        assert_eq!(engine.run_str(r#"<item id="9"/>"#).unwrap(), "sku-9");
    }

    #[test]
    fn test_binding_metadata() {
        let engine = Engine::<()>::builder()
            .controller::<Catalog>()
            .on::<Catalog>("node")
            .recursive()
            .result_from::<u32>("leaf")
            .optional()
            .handle(|_, _| Ok(7u32))
            .build()
            .unwrap();

        let binding = &engine.bindings()[0];
        assert!(binding.is_recursive());
        assert_eq!(binding.controller_type(), ValueType::of::<Catalog>());
        assert_eq!(binding.return_type(), ValueType::of::<u32>());
        assert_eq!(
            binding.params()[0],
            ParamBinding::SingleResult {
                source: Some(QName::local("leaf")),
                value_type: ValueType::of::<u32>(),
                optional: true,
            }
        );
    }
}
