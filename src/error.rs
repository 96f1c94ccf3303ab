//! Error types for the xmlmap library.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Errors that can occur while configuring an engine or executing a run.
#[derive(Error, Debug)]
pub enum Error {
    /// XML parsing error
    #[error("XML parsing error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    /// XML attribute parsing error
    #[error("XML attribute error: {0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Malformed event stream
    #[error("Malformed event stream: {0}")]
    Stream(String),

    /// A controller type was registered twice
    #[error("Controller {0} is registered more than once")]
    DuplicateController(&'static str),

    /// A binding refers to a controller type that was never registered
    #[error("No controller registered for {0}")]
    UnknownController(&'static str),

    /// Two controllers bind the same prefix to different namespace URIs
    #[error("Prefix '{prefix}' is bound to both '{first}' and '{second}'")]
    InconsistentNamespace {
        /// The conflicting prefix
        prefix: String,
        /// URI from the first controller that declared the prefix
        first: String,
        /// URI from the conflicting controller
        second: String,
    },

    /// A qualified name used a prefix with no namespace binding
    #[error("Unknown namespace prefix '{prefix}' in '{reference}'")]
    UnknownPrefix {
        /// The unresolved prefix
        prefix: String,
        /// The full reference that contained it
        reference: String,
    },

    /// A name reference resolved to nothing
    #[error("Empty name for {0}")]
    EmptyName(String),

    /// The engine was built without any element bindings
    #[error("No element bindings were declared")]
    NoBindings,

    /// A binding targets a type with no registered value parser
    #[error("No value parser registered for {value_type} (needed by <{element}>)")]
    NoParser {
        /// Name of the type lacking a parser
        value_type: &'static str,
        /// Element whose binding needs it
        element: String,
    },

    /// Text could not be converted into the bound type
    #[error("Cannot convert '{text}' to {value_type}: {message}")]
    ValueConversion {
        /// Target type name
        value_type: &'static str,
        /// The offending text
        text: String,
        /// Parser diagnostic
        message: String,
    },

    /// A user callback failed
    #[error("Callback for <{element}> failed: {source}")]
    Callback {
        /// Element whose callback failed
        element: String,
        /// The error returned by the callback
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A callback read an argument with the wrong type
    #[error("Argument {index} is not a {expected}")]
    ArgumentType {
        /// Position of the argument
        index: usize,
        /// Type the callback asked for
        expected: &'static str,
    },

    /// The run finished without producing a value of the requested type
    #[error("No result of type {value_type} was produced")]
    MissingResult {
        /// Requested result type
        value_type: &'static str,
    },

    /// The engine's own bookkeeping is inconsistent
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),
}

impl Error {
    /// Returns true for errors detected while building an engine.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DuplicateController(_)
                | Error::UnknownController(_)
                | Error::InconsistentNamespace { .. }
                | Error::UnknownPrefix { .. }
                | Error::EmptyName(_)
                | Error::NoBindings
                | Error::NoParser { .. }
        )
    }
}

/// Result type alias for xmlmap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure returned from a user callback.
///
/// `User` errors are wrapped into [`Error::Callback`] together with the
/// element name. `Unexpected` errors are surfaced unchanged.
#[derive(Debug)]
pub enum CallbackError {
    /// A domain failure raised by the callback
    User(Box<dyn StdError + Send + Sync>),
    /// An engine-level failure observed inside the callback
    Unexpected(Error),
}

impl CallbackError {
    /// Wraps any error as a user failure.
    pub fn user<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        CallbackError::User(error.into())
    }

    /// Converts into an engine error, attributing user failures to `element`.
    pub(crate) fn into_error(self, element: &str) -> Error {
        match self {
            CallbackError::User(source) => Error::Callback {
                element: element.to_string(),
                source,
            },
            CallbackError::Unexpected(e) => e,
        }
    }
}

impl From<Error> for CallbackError {
    fn from(e: Error) -> Self {
        CallbackError::Unexpected(e)
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackError::User(e) => write!(f, "{}", e),
            CallbackError::Unexpected(e) => write!(f, "unexpected: {}", e),
        }
    }
}
