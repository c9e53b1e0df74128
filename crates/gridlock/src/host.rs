//! The seam between the evaluator and a host document object graph.
//!
//! Snippets never hold host objects directly. They see opaque `ProxyId` handles, and every
//! property read, property write and method call on a handle is routed through a `HostBridge`.
//! The mutation tracker is itself a `HostBridge` that decorates the real one.

use crate::object::Object;

/// Stable host-managed handle identifier.
///
/// Handles are immediate values (not references into the evaluator's memory) so hosts can hand
/// out opaque handles without exposing host objects inside the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ProxyId(u32);

impl ProxyId {
    /// Creates a handle from a raw integer.
    #[must_use]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer identifier.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Errors a host reports for a failed operation.
///
/// Inside a snippet these surface as catchable `HostError` exceptions whose `code` property is
/// the variant's code string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("The requested resource doesn't exist: {0}")]
    ItemNotFound(String),
    #[error(
        "The property '{0}' is not available. Before reading the property's value, call the load method on the containing object and call \"context.sync()\" on the associated request context."
    )]
    PropertyNotLoaded(String),
    #[error("The argument is invalid or missing or has an incorrect format: {0}")]
    InvalidArgument(String),
    #[error("'{member}' is not a member of {type_name}")]
    UnknownMember { type_name: String, member: String },
    #[error("Cannot assign to read only property '{0}'")]
    ReadOnly(String),
    #[error("Invalid host handle #{0}")]
    InvalidHandle(u32),
    #[error("{0}")]
    Other(String),
}

impl HostError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ItemNotFound(_) => "ItemNotFound",
            Self::PropertyNotLoaded(_) => "PropertyNotLoaded",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::UnknownMember { .. } => "InvalidOperation",
            Self::ReadOnly(_) => "AccessDenied",
            Self::InvalidHandle(_) => "InvalidReference",
            Self::Other(_) => "GeneralException",
        }
    }
}

/// Operations the evaluator performs on host handles.
///
/// Reading a property the host does not know should return `Object::Undefined`, matching how
/// snippets test for optional members. Calls complete synchronously.
pub trait HostBridge {
    fn get(&mut self, proxy: ProxyId, property: &str) -> Result<Object, HostError>;

    fn set(&mut self, proxy: ProxyId, property: &str, value: Object) -> Result<(), HostError>;

    fn call(&mut self, proxy: ProxyId, method: &str, args: Vec<Object>) -> Result<Object, HostError>;

    /// Whether `name` is a method of the handle. Method names read as values become bound
    /// host methods instead of property reads.
    fn has_method(&self, proxy: ProxyId, name: &str) -> bool;

    /// A property value available without a round trip, such as a range's address.
    ///
    /// Unlike `get`, this never fails for properties that require a prior load.
    fn peek(&self, _proxy: ProxyId, _property: &str) -> Option<Object> {
        None
    }

    /// Type name used in error messages and when a handle is printed.
    fn type_name(&self, proxy: ProxyId) -> String;
}

/// A document that can open a host transaction.
pub trait HostDocument: HostBridge {
    /// Starts a transaction and returns the handle of its root entry point.
    fn open_context(&mut self) -> Result<ProxyId, HostError>;

    /// Ends the transaction started by `open_context`. Handles issued under it become invalid.
    fn close_context(&mut self, root: ProxyId);
}

/// A bridge with no objects, for evaluations that do not touch a document.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

impl HostBridge for NoHost {
    fn get(&mut self, proxy: ProxyId, _property: &str) -> Result<Object, HostError> {
        Err(HostError::InvalidHandle(proxy.raw()))
    }

    fn set(&mut self, proxy: ProxyId, _property: &str, _value: Object) -> Result<(), HostError> {
        Err(HostError::InvalidHandle(proxy.raw()))
    }

    fn call(&mut self, proxy: ProxyId, _method: &str, _args: Vec<Object>) -> Result<Object, HostError> {
        Err(HostError::InvalidHandle(proxy.raw()))
    }

    fn has_method(&self, _proxy: ProxyId, _name: &str) -> bool {
        false
    }

    fn type_name(&self, _proxy: ProxyId) -> String {
        "Object".to_owned()
    }
}
