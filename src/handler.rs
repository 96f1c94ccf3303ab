//! Event-driven handler state machine.
//!
//! The chain holds the handlers that may currently react to an event. For
//! every event the first handler (front = most recently active) whose
//! `matches` accepts it is removed, `process`ed, and whatever handler it
//! returns goes back into the chain. Events nobody matches are ignored.
//!
//! Handler states:
//!
//! - `StartNode` waits for its owner's start tag (with all required
//!   attributes present), then opens the owner's scopes and becomes a
//!   `Node` or `Recursive` handler that remembers it as its parent.
//! - `Node` turns flagged child starts into `Content` handlers and invokes
//!   the callback on its owner's end tag, handing control back to its parent.
//! - `Recursive` additionally absorbs nested starts of its own owner at any
//!   depth, invoking once per nesting level on the way out, innermost first.
//! - `Content` accumulates text until its child's end tag and records it
//!   unless no text arrived. Other events are offered to its parent, whose
//!   successor it adopts.
//!
//! Active handlers sit ahead of the start-node handlers, which stay in
//! declaration order so that the first matching binding wins.

use std::collections::VecDeque;

use log::trace;

use crate::binding::Binding;
use crate::context::ExecutionContext;
use crate::engine::invoke;
use crate::error::{Error, Result};
use crate::name::QName;
use crate::reader::XmlEvent;

/// One state of the per-run state machine.
#[derive(Debug, Clone)]
pub(crate) enum Handler {
    StartNode {
        binding: usize,
    },
    Node {
        binding: usize,
        depth: u32,
        parent: Box<Handler>,
    },
    Recursive {
        binding: usize,
        depth: u32,
        /// Depths of the nested owner copies still open, innermost last.
        nested: Vec<u32>,
        parent: Box<Handler>,
    },
    Content {
        child: QName,
        depth: u32,
        text: Option<String>,
        parent: Box<Handler>,
    },
}

impl Handler {
    /// Whether this handler wants `event`.
    pub(crate) fn matches(
        &self,
        event: &XmlEvent,
        ctx: &ExecutionContext<'_>,
        bindings: &[Binding],
    ) -> bool {
        match self {
            Handler::StartNode { binding } => match event {
                XmlEvent::Start { name, attributes } => bindings[*binding].accepts(name, attributes),
                _ => false,
            },
            Handler::Node { binding, depth, .. } => match event {
                XmlEvent::Start { name, .. } => ctx.content.is_flagged(name),
                XmlEvent::End { name } => {
                    ctx.depth() == *depth && name == &bindings[*binding].owner
                }
                XmlEvent::Text(_) => false,
            },
            Handler::Recursive {
                binding,
                depth,
                nested,
                ..
            } => match event {
                XmlEvent::Start { name, .. } => {
                    name == &bindings[*binding].owner || ctx.content.is_flagged(name)
                }
                XmlEvent::End { name } => {
                    ctx.depth() == nested.last().copied().unwrap_or(*depth)
                        && name == &bindings[*binding].owner
                }
                XmlEvent::Text(_) => false,
            },
            Handler::Content {
                child,
                depth,
                parent,
                ..
            } => match event {
                XmlEvent::Text(_) => true,
                XmlEvent::End { name } if ctx.depth() == *depth && name == child => true,
                _ => parent.matches(event, ctx, bindings),
            },
        }
    }

    /// Handles `event` and returns the handler that takes this one's place.
    pub(crate) fn process(
        self,
        event: &XmlEvent,
        ctx: &mut ExecutionContext<'_>,
        bindings: &[Binding],
    ) -> Result<Handler> {
        match self {
            Handler::StartNode { binding } => {
                let attributes = match event {
                    XmlEvent::Start { attributes, .. } => attributes,
                    _ => return Err(unexpected("start-node", event)),
                };
                let b = &bindings[binding];
                open_scope(b, attributes, ctx);
                let depth = ctx.depth();
                let parent = Box::new(Handler::StartNode { binding });
                trace!("<{}> opened at depth {}", b.owner, depth);
                Ok(if b.recursive {
                    Handler::Recursive {
                        binding,
                        depth,
                        nested: Vec::new(),
                        parent,
                    }
                } else {
                    Handler::Node {
                        binding,
                        depth,
                        parent,
                    }
                })
            }

            Handler::Node {
                binding,
                depth,
                parent,
            } => match event {
                XmlEvent::Start { name, .. } => Ok(Handler::content(
                    name,
                    ctx.depth(),
                    Handler::Node {
                        binding,
                        depth,
                        parent,
                    },
                )),
                XmlEvent::End { .. } => {
                    invoke(&bindings[binding], ctx)?;
                    Ok(*parent)
                }
                XmlEvent::Text(_) => Err(unexpected("node", event)),
            },

            Handler::Recursive {
                binding,
                depth,
                mut nested,
                parent,
            } => {
                let b = &bindings[binding];
                match event {
                    XmlEvent::Start { name, attributes } if name == &b.owner => {
                        open_scope(b, attributes, ctx);
                        trace!("<{}> re-entered at depth {}", b.owner, ctx.depth());
                        nested.push(ctx.depth());
                        Ok(Handler::Recursive {
                            binding,
                            depth,
                            nested,
                            parent,
                        })
                    }
                    XmlEvent::Start { name, .. } => Ok(Handler::content(
                        name,
                        ctx.depth(),
                        Handler::Recursive {
                            binding,
                            depth,
                            nested,
                            parent,
                        },
                    )),
                    XmlEvent::End { .. } => {
                        invoke(b, ctx)?;
                        if nested.pop().is_none() {
                            Ok(*parent)
                        } else {
                            Ok(Handler::Recursive {
                                binding,
                                depth,
                                nested,
                                parent,
                            })
                        }
                    }
                    XmlEvent::Text(_) => Err(unexpected("recursive node", event)),
                }
            }

            Handler::Content {
                child,
                depth,
                mut text,
                parent,
            } => match event {
                XmlEvent::Text(t) => {
                    text.get_or_insert_with(String::new).push_str(t);
                    // Nested captures see their descendants' text too.
                    let parent = match *parent {
                        nested @ Handler::Content { .. } => nested.process(event, ctx, bindings)?,
                        other => other,
                    };
                    Ok(Handler::Content {
                        child,
                        depth,
                        text,
                        parent: Box::new(parent),
                    })
                }
                XmlEvent::End { name } if ctx.depth() == depth && name == &child => {
                    match text {
                        Some(text) => {
                            let kept = ctx.content.capture(depth, &child, &text);
                            trace!("<{}> captured at depth {} for {} owner(s)", child, depth, kept);
                        }
                        None => trace!("<{}> at depth {} has no text", child, depth),
                    }
                    Ok(*parent)
                }
                _ => {
                    let parent = parent.process(event, ctx, bindings)?;
                    Ok(Handler::Content {
                        child,
                        depth,
                        text,
                        parent: Box::new(parent),
                    })
                }
            },
        }
    }

    fn content(child: &QName, depth: u32, parent: Handler) -> Handler {
        Handler::Content {
            child: child.clone(),
            depth,
            text: None,
            parent: Box::new(parent),
        }
    }
}

/// Records the owner's bound attributes at the current depth and flags the
/// children whose text it captures.
fn open_scope(binding: &Binding, attributes: &[(QName, String)], ctx: &mut ExecutionContext<'_>) {
    let depth = ctx.depth();
    for (name, value) in attributes {
        if binding.binds_attribute(name) {
            ctx.attributes.put(depth, name.clone(), value.clone());
        }
    }
    for child in binding.content_children() {
        ctx.content.flag(depth, &binding.owner, child.clone());
    }
}

fn unexpected(state: &str, event: &XmlEvent) -> Error {
    Error::InternalConsistency(format!("{} handler cannot process {:?}", state, event))
}

/// The active handlers of one run, front first.
#[derive(Debug)]
pub(crate) struct HandlerChain {
    handlers: VecDeque<Handler>,
}

impl HandlerChain {
    /// One start-node handler per binding, in declaration order.
    pub(crate) fn templates(bindings: &[Binding]) -> Vec<Handler> {
        (0..bindings.len())
            .map(|binding| Handler::StartNode { binding })
            .collect()
    }

    /// Creates a fresh chain from compiled templates.
    pub(crate) fn new(templates: &[Handler]) -> Self {
        Self {
            handlers: templates.iter().cloned().collect(),
        }
    }

    /// Routes `event` to the first matching handler. Returns false if no
    /// handler was interested.
    pub(crate) fn dispatch(
        &mut self,
        event: &XmlEvent,
        ctx: &mut ExecutionContext<'_>,
        bindings: &[Binding],
    ) -> Result<bool> {
        let Some(idx) = self
            .handlers
            .iter()
            .position(|h| h.matches(event, ctx, bindings))
        else {
            return Ok(false);
        };
        let handler = self
            .handlers
            .remove(idx)
            .ok_or_else(|| Error::InternalConsistency(format!("handler {} vanished", idx)))?;
        match handler.process(event, ctx, bindings)? {
            Handler::StartNode { binding } => {
                let rank = self
                    .handlers
                    .iter()
                    .position(|h| matches!(h, Handler::StartNode { binding: b } if *b > binding))
                    .unwrap_or(self.handlers.len());
                self.handlers.insert(rank, Handler::StartNode { binding });
            }
            next => self.handlers.push_front(next),
        }
        Ok(true)
    }

    /// Number of handlers in the chain.
    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{duplicate, erase, ParamBinding};
    use crate::context::{ControllerFactory, Controllers};
    use crate::value::{ParserRegistry, ValueType};
    use std::any::Any;
    use std::sync::Arc;

    fn binding(owner: &str, recursive: bool, children: &[&str]) -> Binding {
        Binding {
            owner: QName::local(owner),
            recursive,
            params: children
                .iter()
                .map(|c| ParamBinding::Content {
                    child: QName::local(*c),
                    value_type: ValueType::of::<String>(),
                    optional: true,
                })
                .collect(),
            controller: ValueType::of::<()>(),
            returns: ValueType::of::<()>(),
            duplicate: duplicate::<()>,
            callback: erase::<(), (), _>(|_, _| Ok(())),
        }
    }

    fn drive(
        bindings: &[Binding],
        events: &[XmlEvent],
        mut check: impl FnMut(usize, &HandlerChain, &ExecutionContext<'_>),
    ) {
        let parsers = ParserRegistry::default();
        let factory: ControllerFactory = Arc::new(|| Box::new(()) as Box<dyn Any>);
        let controllers = Controllers::instantiate(&[(ValueType::of::<()>(), factory)]);
        let mut ctx = ExecutionContext::new(&parsers, controllers, ValueType::of::<()>());
        let templates = HandlerChain::templates(bindings);
        let mut chain = HandlerChain::new(&templates);

        for (i, event) in events.iter().enumerate() {
            match event {
                XmlEvent::Start { .. } => {
                    ctx.enter();
                    chain.dispatch(event, &mut ctx, bindings).unwrap();
                }
                XmlEvent::Text(_) => {
                    chain.dispatch(event, &mut ctx, bindings).unwrap();
                }
                XmlEvent::End { .. } => {
                    chain.dispatch(event, &mut ctx, bindings).unwrap();
                    ctx.leave().unwrap();
                }
            }
            check(i, &chain, &ctx);
        }
    }

    #[test]
    fn test_unmatched_events_are_ignored() {
        let bindings = vec![binding("item", false, &[])];
        let parsers = ParserRegistry::default();
        let mut ctx = ExecutionContext::new(&parsers, Controllers::default(), ValueType::of::<()>());
        let templates = HandlerChain::templates(&bindings);
        let mut chain = HandlerChain::new(&templates);

        ctx.enter();
        let handled = chain
            .dispatch(&XmlEvent::start("other", vec![]), &mut ctx, &bindings)
            .unwrap();
        assert!(!handled);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_content_scope_lifecycle() {
        let bindings = vec![binding("item", false, &["title"])];
        let events = vec![
            XmlEvent::start("item", vec![]),
            XmlEvent::start("title", vec![]),
            XmlEvent::text("t"),
            XmlEvent::end("title"),
            XmlEvent::end("item"),
        ];
        drive(&bindings, &events, |i, chain, ctx| {
            assert_eq!(chain.len(), 1);
            match i {
                0 => assert!(ctx.content.is_flagged(&QName::local("title"))),
                3 => assert_eq!(
                    ctx.content
                        .read(1, &QName::local("item"), &QName::local("title"))
                        .unwrap(),
                    Some("t")
                ),
                4 => assert_eq!(ctx.content.open_scopes(), 0),
                _ => {}
            }
        });
    }

    #[test]
    fn test_non_recursive_ignores_nested_same_name() {
        let bindings = vec![binding("item", false, &["title"])];
        let events = vec![
            XmlEvent::start("item", vec![]),
            XmlEvent::start("item", vec![]),
            XmlEvent::end("item"),
            XmlEvent::end("item"),
        ];
        drive(&bindings, &events, |i, _, ctx| {
            // The inner end must not close the outer owner.
            if i == 2 {
                assert!(ctx.content.is_flagged(&QName::local("title")));
            }
            if i == 3 {
                assert!(!ctx.content.is_flagged(&QName::local("title")));
            }
        });
    }

    #[test]
    fn test_recursive_opens_scope_per_level() {
        let bindings = vec![binding("node", true, &["name"])];
        let events = vec![
            XmlEvent::start("node", vec![]),
            XmlEvent::start("node", vec![]),
            XmlEvent::start("node", vec![]),
            XmlEvent::end("node"),
            XmlEvent::end("node"),
            XmlEvent::end("node"),
        ];
        drive(&bindings, &events, |i, _, ctx| {
            let expected = [1, 2, 3, 2, 1, 0][i];
            assert_eq!(ctx.content.open_scopes(), expected);
        });
    }

    #[test]
    fn test_recursive_scopes_through_wrappers() {
        let bindings = vec![binding("node", true, &["name"])];
        let events = vec![
            XmlEvent::start("node", vec![]),
            XmlEvent::start("kids", vec![]),
            XmlEvent::start("node", vec![]),
            XmlEvent::end("node"),
            XmlEvent::end("kids"),
            XmlEvent::end("node"),
            XmlEvent::start("node", vec![]),
        ];
        drive(&bindings, &events, |i, _, ctx| {
            let expected = [1, 1, 2, 1, 1, 0, 1][i];
            assert_eq!(ctx.content.open_scopes(), expected);
        });
    }

    #[test]
    fn test_empty_child_records_nothing() {
        let bindings = vec![binding("item", false, &["price"])];
        let events = vec![
            XmlEvent::start("item", vec![]),
            XmlEvent::start("price", vec![]),
            XmlEvent::end("price"),
        ];
        drive(&bindings, &events, |i, _, ctx| {
            if i == 2 {
                let price = ctx
                    .content
                    .read(1, &QName::local("item"), &QName::local("price"))
                    .unwrap();
                assert_eq!(price, None);
            }
        });
    }

    #[test]
    fn test_start_nodes_return_to_their_rank() {
        let bindings = vec![binding("item", false, &[]), binding("other", false, &[])];
        let events = vec![
            XmlEvent::start("item", vec![]),
            XmlEvent::start("other", vec![]),
            XmlEvent::end("other"),
            XmlEvent::end("item"),
        ];
        drive(&bindings, &events, |i, chain, _| {
            let ranks: Vec<Option<usize>> = chain
                .handlers
                .iter()
                .map(|h| match h {
                    Handler::StartNode { binding } => Some(*binding),
                    _ => None,
                })
                .collect();
            match i {
                0 => assert_eq!(ranks, vec![None, Some(1)]),
                1 => assert_eq!(ranks, vec![None, None]),
                // Behind the still-open <item>, not in front of it.
                2 => assert_eq!(ranks, vec![None, Some(1)]),
                _ => assert_eq!(ranks, vec![Some(0), Some(1)]),
            }
        });
    }

    #[test]
    fn test_nested_flagged_children_share_text() {
        let bindings = vec![binding("owner", false, &["title", "name"])];
        let events = vec![
            XmlEvent::start("owner", vec![]),
            XmlEvent::start("title", vec![]),
            XmlEvent::text("a"),
            XmlEvent::start("name", vec![]),
            XmlEvent::text("b"),
            XmlEvent::end("name"),
            XmlEvent::text("c"),
            XmlEvent::end("title"),
        ];
        drive(&bindings, &events, |i, _, ctx| {
            let owner = QName::local("owner");
            if i == 5 {
                let name = ctx.content.read(1, &owner, &QName::local("name")).unwrap();
                assert_eq!(name, Some("b"));
            }
            if i == 7 {
                let title = ctx.content.read(1, &owner, &QName::local("title")).unwrap();
                assert_eq!(title, Some("abc"));
            }
        });
    }
}
