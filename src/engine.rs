//! The compiled engine and the invocation protocol.
//!
//! An [`Engine`] is immutable once built. Every run allocates its own
//! [`ExecutionContext`], controller instances and handler chain, so one
//! engine can serve any number of sequential or concurrent runs.
//!
//! # Example
//!
//! ```rust
//! use xmlmap_rs::Engine;
//!
//! #[derive(Default)]
//! struct Titles;
//!
//! let engine = Engine::<String>::builder()
//!     .controller::<Titles>()
//!     .on::<Titles>("book")
//!     .content::<String>("title")
//!     .handle(|_, args| args.required::<String>(0))
//!     .build()
//!     .unwrap();
//!
//! let title = engine
//!     .run_str("<book><title>Dune</title></book>")
//!     .unwrap();
//! assert_eq!(title, "Dune");
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::Path;

use log::{debug, trace};

use crate::binding::{Argument, Arguments, Binding, ParamBinding};
use crate::builder::EngineBuilder;
use crate::context::{ControllerFactory, Controllers, ExecutionContext};
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerChain};
use crate::name::QName;
use crate::reader::{EventReader, ReaderConfig, XmlEvent};
use crate::value::{ParserRegistry, ValueType};

/// A compiled set of element bindings producing a result of type `R`.
///
/// `R = ()` declares that runs produce no result.
pub struct Engine<R = ()> {
    bindings: Vec<Binding>,
    templates: Vec<Handler>,
    parsers: ParserRegistry,
    controllers: Vec<(ValueType, ControllerFactory)>,
    _result: PhantomData<fn() -> R>,
}

impl<R: 'static> Engine<R> {
    /// Starts configuring an engine.
    pub fn builder() -> EngineBuilder<R> {
        EngineBuilder::new()
    }

    pub(crate) fn new(
        bindings: Vec<Binding>,
        parsers: ParserRegistry,
        controllers: Vec<(ValueType, ControllerFactory)>,
    ) -> Self {
        let templates = HandlerChain::templates(&bindings);
        Self {
            bindings,
            templates,
            parsers,
            controllers,
            _result: PhantomData,
        }
    }

    /// The compiled bindings, in declaration order.
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// The value parsers this engine converts text with.
    pub fn parsers(&self) -> &ParserRegistry {
        &self.parsers
    }

    /// Processes one event stream and returns the run's result.
    ///
    /// Any error aborts the run immediately; the engine itself stays usable.
    pub fn run<I>(&self, events: I) -> Result<R>
    where
        I: IntoIterator<Item = Result<XmlEvent>>,
    {
        let controllers = Controllers::instantiate(&self.controllers);
        let mut ctx = ExecutionContext::new(&self.parsers, controllers, ValueType::of::<R>());
        let mut chain = HandlerChain::new(&self.templates);
        debug!(
            "run started: {} binding(s), result type {}",
            self.bindings.len(),
            ctx.final_type()
        );

        let mut events_seen = 0usize;
        for event in events {
            let event = event?;
            events_seen += 1;
            match &event {
                XmlEvent::Start { name, .. } => {
                    ctx.enter();
                    if !chain.dispatch(&event, &mut ctx, &self.bindings)? {
                        trace!("<{}> at depth {} not of interest", name, ctx.depth());
                    }
                }
                XmlEvent::Text(_) => {
                    chain.dispatch(&event, &mut ctx, &self.bindings)?;
                }
                XmlEvent::End { name } => {
                    if ctx.depth() == 0 {
                        return Err(Error::Stream(format!(
                            "end of <{}> without an open element",
                            name
                        )));
                    }
                    chain.dispatch(&event, &mut ctx, &self.bindings)?;
                    ctx.leave()?;
                }
            }
        }

        if ctx.depth() != 0 {
            return Err(Error::Stream(format!(
                "input ended with {} unclosed element(s)",
                ctx.depth()
            )));
        }
        debug!(
            "run finished after {} event(s), {} handler(s) in chain, {} unconsumed result(s)",
            events_seen,
            chain.len(),
            ctx.results.len()
        );
        ctx.into_result::<R>()
    }

    /// Runs over XML read from `reader` with the default reader settings.
    pub fn run_reader<B: BufRead>(&self, reader: B) -> Result<R> {
        self.run(EventReader::from_reader(reader))
    }

    /// Runs over XML read from `reader` with explicit reader settings.
    pub fn run_reader_with<B: BufRead>(&self, reader: B, config: &ReaderConfig) -> Result<R> {
        self.run(EventReader::with_config(reader, config))
    }

    /// Runs over an in-memory document.
    pub fn run_str(&self, xml: &str) -> Result<R> {
        self.run_reader(xml.as_bytes())
    }

    /// Runs over the XML file at `path`.
    pub fn run_file<P: AsRef<Path>>(&self, path: P) -> Result<R> {
        let file = File::open(path.as_ref())?;
        debug!("reading {}", path.as_ref().display());
        self.run_reader(BufReader::new(file))
    }
}

impl<R> fmt::Debug for Engine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("bindings", &self.bindings)
            .field("parsers", &self.parsers.len())
            .field("controllers", &self.controllers.len())
            .finish()
    }
}

/// Invokes `binding` for the owner closing at the current depth.
///
/// Every parameter is resolved first; the owner's attributes and captured
/// content are then dropped whether or not the callback runs. A required
/// parameter that resolved to nothing skips the callback silently.
pub(crate) fn invoke(binding: &Binding, ctx: &mut ExecutionContext<'_>) -> Result<()> {
    let depth = ctx.depth();
    let owner = &binding.owner;

    let mut satisfied = true;
    let mut values = Vec::with_capacity(binding.params.len());
    for param in &binding.params {
        let argument = resolve(param, owner, depth, ctx)?;
        if argument.is_absent() && !param.is_optional() {
            satisfied = false;
        }
        values.push(argument);
    }

    ctx.attributes.clear(depth);
    ctx.content.clear(depth, owner);

    if !satisfied {
        debug!("<{}> at depth {} skipped: required binding unresolved", owner, depth);
        return Ok(());
    }

    trace!("invoking <{}> at depth {}", owner, depth);
    let mut args = Arguments::new(values);
    let controller = ctx.controllers.get_mut(binding.controller)?;
    let produced =
        (binding.callback)(controller, &mut args).map_err(|e| e.into_error(&owner.to_string()))?;
    if let Some(value) = produced {
        ctx.produce(owner, binding.returns, binding.duplicate, value);
    }
    Ok(())
}

fn resolve(
    param: &ParamBinding,
    owner: &QName,
    depth: u32,
    ctx: &mut ExecutionContext<'_>,
) -> Result<Argument> {
    let argument = match param {
        ParamBinding::Attribute {
            name, value_type, ..
        } => match ctx.attributes.get(depth, name) {
            Some(text) => Argument::Value(ctx.parsers.parse(*value_type, text)?),
            None => Argument::Absent,
        },
        ParamBinding::Content {
            child, value_type, ..
        } => match ctx.content.read(depth, owner, child)? {
            Some(text) => Argument::Value(ctx.parsers.parse(*value_type, text)?),
            None => Argument::Absent,
        },
        ParamBinding::SingleResult {
            source, value_type, ..
        } => ctx
            .results
            .consume_first(depth, source.as_ref(), *value_type)
            .map_or(Argument::Absent, Argument::Value),
        ParamBinding::ResultList {
            source,
            element_type,
            optional,
        } => {
            let values = ctx.results.consume(depth, source.as_ref(), *element_type);
            if values.is_empty() && !optional {
                Argument::Absent
            } else {
                Argument::List(values)
            }
        }
    };
    Ok(argument)
}
