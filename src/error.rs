//! Error types and error handling for the scenario simulator
//!
//! Four error kinds cover the whole crate: syntax errors (malformed or
//! unsupported scenario content, bad name references), semantic errors
//! (valid scenario, failed runtime precondition), map errors (lanelet
//! network load failures) and RPC errors (transport or deadline failures).

use thiserror::Error;

/// Main error type for the scenario simulator
#[derive(Error, Debug)]
pub enum Error {
    // Syntax errors
    /// Malformed scenario content
    #[error("SyntaxError: {message}")]
    Syntax { message: String },

    /// Element is valid OpenSCENARIO but not supported by this simulator
    #[error("SyntaxError: given class '{element}' is valid OpenSCENARIO element of class '{parent}', but is not supported")]
    UnsupportedElement { element: String, parent: String },

    /// Enumeration value outside the schema
    #[error("SyntaxError: an invalid value '{value}' was specified for type '{ty}'")]
    InvalidEnumeration { ty: String, value: String },

    /// Two or more objects with the same name are visible at one scope level
    #[error("SyntaxError: ambiguous reference to \"{name}\"")]
    AmbiguousReference { name: String },

    /// Name resolution exhausted every frame without a match
    #[error("SyntaxError: no such variable named \"{name}\"")]
    NoSuchName { name: String },

    /// Catalog entry lookup failed
    #[error("SyntaxError: catalog '{catalog}' has no entry named '{entry}'")]
    CatalogEntryNotFound { catalog: String, entry: String },

    /// Expression evaluation failed
    #[error("SyntaxError: failed to evaluate expression '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    // Semantic errors
    /// Scenario was well-formed but a runtime precondition failed
    #[error("SemanticError: {message}")]
    Semantic { message: String },

    // Map errors
    /// Lanelet network load or consistency failure
    #[error("MapError: {message}")]
    Map { message: String },

    // RPC errors
    /// Transport-level failure
    #[error("RpcError: {message}")]
    Rpc { message: String },

    /// The simulator could not apply the request; carries its message
    #[error("ExecutionFailed: {message}")]
    ExecutionFailed { message: String },

    /// File I/O failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>) -> Self {
        Error::Syntax {
            message: message.into(),
        }
    }

    /// Create an unsupported-element error
    pub fn unsupported_element(element: &str, parent: &str) -> Self {
        Error::UnsupportedElement {
            element: element.to_string(),
            parent: parent.to_string(),
        }
    }

    /// Create an invalid-enumeration error
    pub fn invalid_enumeration(ty: &str, value: &str) -> Self {
        Error::InvalidEnumeration {
            ty: ty.to_string(),
            value: value.to_string(),
        }
    }

    /// Create an ambiguous-reference error
    pub fn ambiguous_reference(name: impl Into<String>) -> Self {
        Error::AmbiguousReference { name: name.into() }
    }

    /// Create a no-such-name error
    pub fn no_such_name(name: impl Into<String>) -> Self {
        Error::NoSuchName { name: name.into() }
    }

    /// Create a catalog-entry-not-found error
    pub fn catalog_entry_not_found(catalog: &str, entry: &str) -> Self {
        Error::CatalogEntryNotFound {
            catalog: catalog.to_string(),
            entry: entry.to_string(),
        }
    }

    /// Create an expression error
    pub fn expression(expression: &str, reason: &str) -> Self {
        Error::Expression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a semantic error
    pub fn semantic(message: impl Into<String>) -> Self {
        Error::Semantic {
            message: message.into(),
        }
    }

    /// Create a map error
    pub fn map(message: impl Into<String>) -> Self {
        Error::Map {
            message: message.into(),
        }
    }

    /// Create an RPC transport error
    pub fn rpc(message: impl Into<String>) -> Self {
        Error::Rpc {
            message: message.into(),
        }
    }

    /// Create an execution-failed error
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Error::ExecutionFailed {
            message: message.into(),
        }
    }

    /// True for the error kinds that reject a scenario at load time
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            Error::Syntax { .. }
                | Error::UnsupportedElement { .. }
                | Error::InvalidEnumeration { .. }
                | Error::AmbiguousReference { .. }
                | Error::NoSuchName { .. }
                | Error::CatalogEntryNotFound { .. }
                | Error::Expression { .. }
        )
    }

    /// Add context to an error message
    pub fn with_context(mut self, context: &str) -> Self {
        match &mut self {
            Error::Syntax { message }
            | Error::Semantic { message }
            | Error::Map { message }
            | Error::Rpc { message }
            | Error::ExecutionFailed { message } => {
                *message = format!("{}: {}", context, message);
            }
            Error::Expression { reason, .. } => {
                *reason = format!("{}: {}", context, reason);
            }
            _ => {}
        }
        self
    }
}

/// Result type alias for the scenario simulator
pub type Result<T> = std::result::Result<T, Error>;
