//! Type-erased values that flow through the effect interpreter.
//!
//! Effect payloads and resume values are not known to the interpreter
//! ahead of time — any handler can be installed for any effect, and the
//! interpreter must be able to carry values whose concrete type it never
//! inspects. `Any` is the idiomatic substitute for the duck typing the
//! source relies on.

use std::any::Any;
use std::fmt;

/// A value whose concrete type is erased until a handler or combinator
/// that knows what it's looking for downcasts it back.
pub type AnyValue = Box<dyn Any + Send>;

/// Box a value for transport through the interpreter.
pub fn box_value<T: Send + 'static>(v: T) -> AnyValue {
    Box::new(v)
}

/// Recover a concrete value from an [`AnyValue`].
///
/// Returns the original box back on mismatch so callers can decide how to
/// report it (the interpreter treats a mismatch here as a handler/body
/// authoring bug, not a recoverable runtime condition).
pub fn downcast<T: 'static>(v: AnyValue) -> Result<T, AnyValue> {
    v.downcast::<T>().map(|b| *b)
}

/// Describe an [`AnyValue`] for diagnostics without requiring `Debug`.
pub(crate) struct Opaque<'a>(pub &'a AnyValue);

impl fmt::Debug for Opaque<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<opaque value>")
    }
}
