//! The effect descriptor: an immutable, name-matched request for a
//! handler to supply a value.

use std::fmt;
use std::sync::Arc;

use crate::value::AnyValue;

/// An effect's name. Backed by `Arc<str>` so that cloning a descriptor's
/// name (which happens on every dispatch attempt as handlers test it
/// against their predicate) is cheap, and so that default-handler
/// rewriting can move a descriptor's
/// other fields without re-allocating the name.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct EffectName(Arc<str>);

impl EffectName {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Effects named by the `"error:"` convention are the idiomatic
    /// failure channel consumed by `catch`/`catch_all`.
    pub fn strip_error_prefix(&self) -> Option<&str> {
        self.0.strip_prefix("error:")
    }

    /// The host-level error class a raised `"error:<class>"` effect
    /// surfaces as: the class with its first letter capitalized and an
    /// `Error` suffix appended, e.g. `"a"` -> `"AError"`. Falls back to
    /// the bare name (no prefix stripped) for an effect not named by the
    /// `"error:"` convention.
    pub fn error_class_name(&self) -> String {
        let raw = self.strip_error_prefix().unwrap_or_else(|| self.as_str());
        let mut chars = raw.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        format!("{capitalized}Error")
    }

    /// Effects named by the `"dependency:"` convention.
    pub fn strip_dependency_prefix(&self) -> Option<&str> {
        self.0.strip_prefix("dependency:")
    }
}

impl fmt::Debug for EffectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for EffectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EffectName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EffectName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A handler body invoked when no installed handler matched an effect,
/// shipped on the descriptor itself.
///
/// Takes the raw payloads and the same [`crate::computation::handlers::EffectCtx`]
/// shape any other handler receives; defined here as a type alias to
/// avoid a dependency cycle between `effect` and `computation::handlers`.
pub type DefaultHandlerFn =
    Arc<dyn Fn(crate::computation::handlers::EffectCtx, Vec<AnyValue>) + Send + Sync>;

/// An immutable, name-matched request for a value from a handler
/// installed somewhere up the combinator chain.
///
/// Two descriptors "match" when their names compare equal, or when a
/// predicate supplied to `handle` accepts the name. Equality on the
/// descriptor itself is by identity — nothing in this crate compares two
/// `Effect` values directly; only names are compared.
pub struct Effect {
    name: EffectName,
    payloads: Vec<AnyValue>,
    resumable: bool,
    default_handler: Option<DefaultHandlerFn>,
}

impl Effect {
    pub fn new(name: impl Into<EffectName>, payloads: Vec<AnyValue>) -> Self {
        Self {
            name: name.into(),
            payloads,
            resumable: true,
            default_handler: None,
        }
    }

    pub fn name(&self) -> &EffectName {
        &self.name
    }

    pub fn resumable(&self) -> bool {
        self.resumable
    }

    pub fn payload_count(&self) -> usize {
        self.payloads.len()
    }

    /// Mark this descriptor as unresumable: its only valid dispositions
    /// are `terminate` or passthrough to an enclosing handler.
    pub fn non_resumable(mut self) -> Self {
        self.resumable = false;
        self
    }

    pub fn with_default_handler(mut self, handler: DefaultHandlerFn) -> Self {
        self.default_handler = Some(handler);
        self
    }

    pub(crate) fn default_handler(&self) -> Option<&DefaultHandlerFn> {
        self.default_handler.as_ref()
    }

    /// Split the descriptor, consuming it, into its identity fields and
    /// its payloads — the shape every handler body invocation needs.
    pub(crate) fn into_parts(self) -> (EffectName, bool, Option<DefaultHandlerFn>, Vec<AnyValue>) {
        (self.name, self.resumable, self.default_handler, self.payloads)
    }

    /// Rebuild a descriptor around a composed default handler without
    /// ever exposing a mutation.
    pub(crate) fn rewrite_default_handler(self, handler: DefaultHandlerFn) -> Self {
        Self {
            name: self.name,
            payloads: self.payloads,
            resumable: self.resumable,
            default_handler: Some(handler),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.name)
            .field("payload_count", &self.payloads.len())
            .field("resumable", &self.resumable)
            .field("has_default_handler", &self.default_handler.is_some())
            .finish()
    }
}

/// A predicate an effect's name is tested against when a handler is
/// installed with something other than a literal name.
pub trait NamePredicate: Send + Sync {
    fn matches(&self, name: &EffectName) -> bool;
}

impl<F> NamePredicate for F
where
    F: Fn(&EffectName) -> bool + Send + Sync,
{
    fn matches(&self, name: &EffectName) -> bool {
        self(name)
    }
}

/// What a handler is installed to match against: an exact name, or an
/// arbitrary predicate over names.
#[derive(Clone)]
pub enum Matcher {
    Name(EffectName),
    Predicate(Arc<dyn NamePredicate>),
}

impl Matcher {
    pub fn matches(&self, name: &EffectName) -> bool {
        match self {
            Matcher::Name(n) => n == name,
            Matcher::Predicate(p) => p.matches(name),
        }
    }
}

impl From<&str> for Matcher {
    fn from(s: &str) -> Self {
        Matcher::Name(EffectName::new(s))
    }
}

impl From<String> for Matcher {
    fn from(s: String) -> Self {
        Matcher::Name(EffectName::new(s))
    }
}

impl From<EffectName> for Matcher {
    fn from(n: EffectName) -> Self {
        Matcher::Name(n)
    }
}

impl<F> From<F> for Matcher
where
    F: Fn(&EffectName) -> bool + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Matcher::Predicate(Arc::new(f))
    }
}
