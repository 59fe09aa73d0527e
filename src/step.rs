//! The stepwise computation protocol and the tagged `Step` sum
//! type the interpreter drives.
//!
//! Rather than distinguishing "yielded an effect" from "suspended on an
//! async completion" from "finished" by checking which optional field
//! happens to be set, `Step` makes the three cases an explicit enum.

use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

use crate::effect::Effect;
use crate::error::EffectError;
use crate::value::AnyValue;

/// A boxed, `'static` future — the shape every async suspension in this
/// crate eventually reduces to, whether it originated from `effectify`
/// or from a handler that deferred its disposition.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A label unique to one invocation of the `all` combinator, used to route an async completion back to
/// the sub-computation that produced it even after `all` has rotated
/// focus elsewhere. The source mints a fresh symbol; `Uuid::new_v4`
/// gives the same uniqueness guarantee without borrowing the host's
/// symbol table.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct InterruptLabel(Uuid);

impl InterruptLabel {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

/// What an async suspension eventually resolves to: the value to feed
/// back into `step` as the next resumption.
///
/// A deferred handler's eventual `resume`/`terminate` choice is *not*
/// carried here — a handler-installing combinator that suspends keeps
/// that disposition in its own frame state and only uses this outcome as
/// a wake-up signal (see `computation::handlers::HandleFrame`). Plain
/// `effectify` suspensions use it directly as the produced value.
pub(crate) struct AsyncOutcome(pub Option<AnyValue>);

/// The async marker: a one-shot completion callback, represented
/// natively as a future rather than as a registrable callback, since
/// Rust's `Future` already is that one-shot-completion contract.
pub struct AsyncMarker {
    pub(crate) on_complete: BoxFuture<Result<AsyncOutcome, EffectError>>,
    pub(crate) interrupt: Option<InterruptLabel>,
}

impl AsyncMarker {
    pub(crate) fn new(on_complete: BoxFuture<Result<AsyncOutcome, EffectError>>) -> Self {
        Self {
            on_complete,
            interrupt: None,
        }
    }

    pub(crate) fn tagged(mut self, label: InterruptLabel) -> Self {
        self.interrupt = Some(label);
        self
    }
}

/// What a single `step` call produces.
pub enum Step<T> {
    /// The computation yielded an effect descriptor awaiting a handler.
    Effect(Effect),
    /// The computation suspended pending an external completion.
    Async(AsyncMarker),
    /// The computation is finished; `None` means "completed without a
    /// return value".
    Done(Option<T>),
}

/// The value fed back into `step` on every call after the first.
pub enum Resumption {
    /// The very first call to a stepwise computation.
    Start,
    /// Resumption carrying a value — e.g. the result a handler resumed
    /// with, or an async completion's payload.
    Value(AnyValue),
    /// Resumption without a value (the previous yield was resumed with
    /// nothing).
    Unit,
}

/// Any object exposing `step(input?) -> Step`. Implementations may fail;
/// such failures propagate as fatal, using `Result`/`?` rather than host
/// exceptions.
pub trait Stepwise: Send {
    type Output: Send + 'static;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError>;
}

/// A type-erased, boxed stepwise computation — the shape every combinator
/// ultimately composes over.
pub(crate) type BoxStepwise<T> = Box<dyn Stepwise<Output = T> + Send>;

/// Lets a boxed `Stepwise` satisfy an `Inner: Stepwise` bound directly,
/// so combinator frames don't need a separate generic parameter for
/// "boxed" vs. "concrete" inner computations.
impl<S: Stepwise + ?Sized> Stepwise for Box<S> {
    type Output = S::Output;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        (**self).step(input)
    }
}
