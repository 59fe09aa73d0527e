//! The public error taxonomy surfaced at `run_sync`/`run_async` boundaries.
//!
//! Internal plumbing (handler lookup, default-handler rewriting,
//! intercept driving) favors `anyhow::Result`; it only converts into one
//! of these `thiserror` variants once an error reaches the caller.

use crate::effect::EffectName;
use thiserror::Error;

/// Errors a run can end with.
#[derive(Debug, Error)]
pub enum EffectError {
    /// An effect reached the outermost interpreter with no installed
    /// handler matching it and no default handler attached.
    #[error("unhandled effect {name}: {payload_count} payload(s)")]
    UnhandledEffect {
        name: EffectName,
        payload_count: usize,
    },

    /// A handler called `resume` on a context whose effect was marked
    /// `resumable = false`.
    #[error("effect {name} is not resumable but a handler called resume()")]
    NotResumable { name: EffectName },

    /// `run_sync` observed an async marker; only `run_async` can drive
    /// suspensions that cross a completion-callback boundary.
    #[error("computation suspended on an async marker under run_sync(); use run_async() instead")]
    AsyncUnderSync,

    /// A stepwise computation's `step` produced something other than an
    /// effect, an async marker, or completion.
    #[error("malformed yield from stepwise computation: {detail}")]
    MalformedYield { detail: String },

    /// A handler body (or a sub-computation it produced) panicked.
    #[error("handler for effect {name} panicked: {message}")]
    HandlerPanicked { name: EffectName, message: String },

    /// An effect's attached default handler panicked.
    #[error("default handler for effect {name} panicked: {message}")]
    DefaultHandlerPanicked { name: EffectName, message: String },

    /// A handler raised a host-level error via `catch_and_throw` /
    /// `catch_all_and_throw`.
    #[error("{class}: {message}")]
    Raised { class: String, message: String },

    /// A handler deferred resumption (returned without calling
    /// `resume`/`terminate`) and was then dropped without ever doing so.
    #[error("handler for effect {name} was dropped before resuming or terminating")]
    HandlerDropped { name: EffectName },
}
