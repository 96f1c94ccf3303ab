//! Streaming XML-to-typed-values mapping for Rust.
//!
//! This crate maps XML documents onto typed values in a single forward
//! pass. Callbacks are bound to element names; when a bound element closes,
//! its callback runs with arguments taken from the element's attributes,
//! the text of its descendants, and values produced by callbacks of
//! elements nested inside it.
//!
//! # Features
//!
//! - **Streaming**: one pass over the document, memory bounded by the
//!   currently open elements of interest, not by document size.
//! - **Typed arguments**: attribute and element text are converted by a
//!   per-type parser table with defaults for the primitive and chrono types.
//! - **Nested results**: values produced below an element can be consumed
//!   by its callback, one at a time or as a list, at most once each.
//! - **Recursive elements**: self-nested elements invoke once per level.
//! - **Namespaces**: prefixed, default-namespace and `{uri}local` names.
//! - **Reusable engines**: an [`Engine`] is immutable and can serve
//!   concurrent runs.
//!
//! # Quick Start
//!
//! ```rust
//! use xmlmap_rs::Engine;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Book {
//!     id: u32,
//!     title: String,
//! }
//!
//! #[derive(Default)]
//! struct Library;
//!
//! let engine = Engine::<Vec<Book>>::builder()
//!     .controller::<Library>()
//!     .on::<Library>("book")
//!     .attribute::<u32>("id")
//!     .content::<String>("title")
//!     .handle(|_, args| {
//!         Ok(Book {
//!             id: args.required(0)?,
//!             title: args.required(1)?,
//!         })
//!     })
//!     .on::<Library>("library")
//!     .results::<Book>()
//!     .optional()
//!     .handle(|_, args| args.take_list::<Book>(0))
//!     .build()
//!     .unwrap();
//!
//! let books = engine
//!     .run_str(r#"<library><book id="1"><title>Dune</title></book></library>"#)
//!     .unwrap();
//! assert_eq!(books, vec![Book { id: 1, title: "Dune".into() }]);
//! ```
//!
//! # Module Structure
//!
//! - [`builder`] - Engine configuration and binding declarations
//! - [`engine`] - The compiled engine and its run entry points
//! - [`binding`] - Binding descriptors and callback arguments
//! - [`context`] - Per-run scoped stores
//! - [`reader`] - quick-xml backed event source
//! - [`value`] - Value types and text parsers
//! - [`name`] - Qualified names and name resolution
//! - [`error`] - Error types
//!
//! # Optional Features
//!
//! - `serde` - Enable serde serialization/deserialization support
//! - `cli` - Build the `xmlmap_extract` command line tool

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod binding;
pub mod builder;
pub mod context;
pub mod engine;
pub mod error;
mod handler;
pub mod name;
pub mod reader;
pub mod value;

// Re-export commonly used types at the crate root
pub use binding::{Arguments, Binding, ParamBinding};
pub use builder::{ControllerConfig, ElementBinder, EngineBuilder};
pub use engine::Engine;
pub use error::{CallbackError, Error, Result};
pub use name::{NameResolver, Namespaces, NamingStrategy, QName};
pub use reader::{read_events, EventReader, ReaderConfig, XmlEvent};
pub use value::{parse_iso8601, ParserRegistry, Value, ValueType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
