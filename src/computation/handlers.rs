//! Handler installation and the at-most-once resume/terminate discipline.
//! This is the heart of the interpreter: every combinator that
//! installs a handler (`handle`, `resume`, `terminate`, `catch`,
//! `catch_all`, `catch_and_throw`, `catch_all_and_throw`, `provide`,
//! `provide_by`) is built on the single [`HandleFrame`] type here.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::effect::{DefaultHandlerFn, Effect, EffectName, Matcher};
use crate::error::EffectError;
use crate::step::{AsyncMarker, AsyncOutcome, BoxFuture, BoxStepwise, Resumption, Step, Stepwise};
use crate::value::{box_value, downcast, AnyValue};

/// The context object a handler body is invoked with. Exposes
/// `resume`/`terminate` as plain callables so a handler body can call
/// one of them either synchronously, inline, or from a task spawned
/// after the body itself has already returned.
#[derive(Clone)]
pub struct EffectCtx {
    name: EffectName,
    resumable: bool,
    sender: Arc<Mutex<Option<oneshot::Sender<HandlerResult>>>>,
}

pub(crate) enum HandlerResult {
    Resumed(Option<AnyValue>),
    Terminated(Option<AnyValue>),
    Rejected(EffectError),
}

impl EffectCtx {
    pub fn effect_name(&self) -> &EffectName {
        &self.name
    }

    pub fn resumable(&self) -> bool {
        self.resumable
    }

    /// Resume the suspended computation with `value`. Calling this on a
    /// non-resumable effect's context is a fatal error; calling
    /// it a second time (after `resume` or `terminate` already ran) is
    /// logged and ignored.
    pub fn resume(&self, value: Option<AnyValue>) {
        if !self.resumable {
            self.dispatch(HandlerResult::Rejected(EffectError::NotResumable {
                name: self.name.clone(),
            }));
            return;
        }
        self.dispatch(HandlerResult::Resumed(value));
    }

    /// Abandon the suspended computation, declaring `value` as the final
    /// result of the scope this handler was installed in.
    pub fn terminate(&self, value: Option<AnyValue>) {
        self.dispatch(HandlerResult::Terminated(value));
    }

    /// Abandon the suspended computation with a host-level failure
    /// rather than a value — the error class is derived from this
    /// effect's own name (`"a"` -> `"AError"`), matching the class a
    /// rethrown `"error:a"` effect is expected to surface as.
    pub fn raise(&self, message: impl Into<String>) {
        let class = self.name.error_class_name();
        self.dispatch(HandlerResult::Rejected(EffectError::Raised {
            class,
            message: message.into(),
        }));
    }

    fn dispatch(&self, result: HandlerResult) {
        let mut guard = self.sender.lock().expect("effect context mutex poisoned");
        match guard.take() {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => {
                tracing::warn!(
                    effect = %self.name,
                    "handler called resume/terminate more than once; second call ignored"
                );
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    let limit = crate::config::RuntimeConfig::active().panic_message_limit;
    if message.len() <= limit {
        message
    } else {
        let mut truncated = message;
        let mut end = limit;
        while !truncated.is_char_boundary(end) {
            end -= 1;
        }
        truncated.truncate(end);
        truncated.push_str("...");
        truncated
    }
}

/// What a handler body invocation produced beyond plain `ctx` use: either
/// nothing special (`None`, the common case — raw `handle` bodies always
/// return this), or a sub-computation installed as an intercept iterator,
/// used by the `resume`/`terminate` sugar when the body's own return
/// value is itself effectful.
pub(crate) enum HandlerBodyOutcome {
    None,
    Intercept {
        computation: BoxStepwise<AnyValue>,
        kind: PendingKind,
    },
}

#[derive(Clone, Copy)]
pub(crate) enum PendingKind {
    Resume,
    Terminate,
}

pub(crate) type HandlerBody =
    Arc<dyn Fn(EffectCtx, Vec<AnyValue>) -> HandlerBodyOutcome + Send + Sync>;

pub(crate) enum BodyInvocation {
    Immediate(HandlerResult),
    Deferred { future: BoxFuture<HandlerResult> },
    Intercept {
        computation: BoxStepwise<AnyValue>,
        kind: PendingKind,
    },
}

/// Call a handler body once, catching panics, and classify the outcome as resolved immediately,
/// deferred to a later asynchronous call, or handed off to an intercept
/// sub-computation.
pub(crate) fn invoke_handler_body(
    name: EffectName,
    resumable: bool,
    payloads: Vec<AnyValue>,
    body: &HandlerBody,
) -> Result<BodyInvocation, EffectError> {
    let (tx, mut rx) = oneshot::channel::<HandlerResult>();
    let ctx = EffectCtx {
        name: name.clone(),
        resumable,
        sender: Arc::new(Mutex::new(Some(tx))),
    };
    let name_for_panic = name.clone();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(ctx, payloads)))
        .map_err(|payload| EffectError::HandlerPanicked {
            name: name_for_panic,
            message: panic_message(payload),
        })?;

    match outcome {
        HandlerBodyOutcome::Intercept { computation, kind } => {
            Ok(BodyInvocation::Intercept { computation, kind })
        }
        HandlerBodyOutcome::None => match rx.try_recv() {
            Ok(result) => Ok(BodyInvocation::Immediate(result)),
            Err(oneshot::error::TryRecvError::Empty) => {
                let name_for_drop = name.clone();
                let future: BoxFuture<HandlerResult> = Box::pin(async move {
                    match rx.await {
                        Ok(result) => result,
                        Err(_) => HandlerResult::Rejected(EffectError::HandlerDropped {
                            name: name_for_drop,
                        }),
                    }
                });
                Ok(BodyInvocation::Deferred { future })
            }
            Err(oneshot::error::TryRecvError::Closed) => {
                // The body returned without ever calling resume/terminate
                // (and without cloning `ctx` into a deferred task) — the
                // `EffectCtx` was simply dropped. `catch_and_throw` sugars
                // rely on exactly this to mean "run the side effect, then
                // let the failure keep propagating".
                Ok(BodyInvocation::Immediate(HandlerResult::Rejected(
                    EffectError::HandlerDropped { name },
                )))
            }
        },
    }
}

/// Wrap `effect`'s own default handler (if it has one) so that, if it ends
/// up running as a same-layer fallback rather than at the top of the
/// runtime, that's visible in the trace — the descriptor itself is never
/// mutated in place, only replaced (the one rewriting the data model
/// allows).
fn instrument_default_handler(effect: Effect) -> Effect {
    match effect.default_handler().cloned() {
        Some(handler) => {
            let name = effect.name().clone();
            let instrumented: DefaultHandlerFn = Arc::new(move |ctx, payloads| {
                tracing::debug!(
                    effect = %name,
                    "falling back to default handler after the matching handler dropped the effect"
                );
                handler(ctx, payloads);
            });
            effect.rewrite_default_handler(instrumented)
        }
        None => effect,
    }
}

/// The general-purpose handler-installing combinator every sugar in this
/// module is built from. Wraps `inner`, intercepting effects matching
/// `matcher` and routing them to `body`; everything else passes through
/// unchanged.
pub(crate) struct HandleFrame<Inner: Stepwise> {
    inner: Inner,
    matcher: Matcher,
    body: HandlerBody,
    /// Set while waiting for a deferred handler's asynchronous
    /// resume/terminate call; populated by the async-marker future this
    /// frame handed upward.
    pending: Option<Arc<Mutex<Option<HandlerResult>>>>,
    /// Set while an intercept sub-computation (from the resume/terminate
    /// sugar) is driving steps before this frame's own disposition can be
    /// determined.
    intercept: Option<BoxStepwise<AnyValue>>,
    intercept_kind: Option<PendingKind>,
}

impl<Inner: Stepwise> HandleFrame<Inner> {
    pub(crate) fn new(inner: Inner, matcher: Matcher, body: HandlerBody) -> Self {
        Self {
            inner,
            matcher,
            body,
            pending: None,
            intercept: None,
            intercept_kind: None,
        }
    }

    /// Turn a resolved or deferred handler-body invocation into a step,
    /// installing `pending`/`intercept` state as needed. Shared between
    /// the normal dispatch path and the default-handler fallback path so
    /// both honor deferral and the resume/terminate intercept sugar
    /// identically.
    fn apply_invocation(&mut self, invocation: BodyInvocation) -> Result<Step<Inner::Output>, EffectError> {
        match invocation {
            BodyInvocation::Immediate(result) => self.apply_handler_result(result),
            BodyInvocation::Deferred { future } => {
                let shared = Arc::new(Mutex::new(None));
                let shared_for_future = shared.clone();
                self.pending = Some(shared);
                let marker_future: BoxFuture<Result<AsyncOutcome, EffectError>> = Box::pin(async move {
                    let result = future.await;
                    *shared_for_future.lock().expect("handler-result cell poisoned") = Some(result);
                    Ok(AsyncOutcome(None))
                });
                Ok(Step::Async(AsyncMarker::new(marker_future)))
            }
            BodyInvocation::Intercept { computation, kind } => {
                self.intercept = Some(computation);
                self.intercept_kind = Some(kind);
                self.step(Resumption::Start)
            }
        }
    }

    fn apply_handler_result(&mut self, result: HandlerResult) -> Result<Step<Inner::Output>, EffectError> {
        match result {
            HandlerResult::Resumed(v) => {
                let next = v.map(Resumption::Value).unwrap_or(Resumption::Unit);
                self.inner.step(next)
            }
            HandlerResult::Terminated(v) => {
                let value = v
                    .map(|boxed| {
                        downcast::<Inner::Output>(boxed).map_err(|_| EffectError::MalformedYield {
                            detail: "terminate() value did not match the computation's output type"
                                .to_string(),
                        })
                    })
                    .transpose()?;
                Ok(Step::Done(value))
            }
            HandlerResult::Rejected(e) => Err(e),
        }
    }
}

impl<Inner: Stepwise> Stepwise for HandleFrame<Inner> {
    type Output = Inner::Output;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        if let Some(shared) = self.pending.take() {
            let result = shared
                .lock()
                .expect("handler-result cell poisoned")
                .take()
                .expect("async marker resolved before its handler result was recorded");
            return self.apply_handler_result(result);
        }

        if let Some(intercept) = self.intercept.as_mut() {
            return match intercept.step(input)? {
                Step::Effect(e) => Ok(Step::Effect(e)),
                Step::Async(a) => Ok(Step::Async(a)),
                Step::Done(v) => {
                    self.intercept = None;
                    let kind = self
                        .intercept_kind
                        .take()
                        .expect("intercept_kind set alongside intercept");
                    let result = match kind {
                        PendingKind::Resume => HandlerResult::Resumed(v),
                        PendingKind::Terminate => HandlerResult::Terminated(v),
                    };
                    self.apply_handler_result(result)
                }
            };
        }

        match self.inner.step(input)? {
            Step::Done(v) => Ok(Step::Done(v)),
            Step::Async(a) => Ok(Step::Async(a)),
            Step::Effect(effect) => {
                if !self.matcher.matches(effect.name()) {
                    return Ok(Step::Effect(effect));
                }
                let effect = instrument_default_handler(effect);
                let (name, resumable, default_handler, payloads) = effect.into_parts();
                let invocation = invoke_handler_body(name.clone(), resumable, payloads, &self.body)?;
                match (invocation, default_handler) {
                    (
                        BodyInvocation::Immediate(HandlerResult::Rejected(EffectError::HandlerDropped { .. })),
                        Some(handler),
                    ) => {
                        // The matching handler dropped the effect instead of
                        // resuming/terminating it — fall back to the
                        // descriptor's own default handler right here rather
                        // than bubbling a spurious `HandlerDropped`,
                        // preserving the layer this handler occupies. The
                        // payloads the dropped call owned are gone with it;
                        // the fallback runs with none, the shape a
                        // zero-payload default already expects.
                        let wrapped: HandlerBody = Arc::new(move |ctx, payloads| {
                            handler(ctx, payloads);
                            HandlerBodyOutcome::None
                        });
                        let invocation = invoke_handler_body(name, resumable, Vec::new(), &wrapped)?;
                        self.apply_invocation(invocation)
                    }
                    (invocation, _) => self.apply_invocation(invocation),
                }
            }
        }
    }
}

/// Wrap a `Stepwise<Output = T>` so its `Done` values are boxed into
/// `AnyValue`, the shape an intercept iterator must present regardless
/// of what type its sub-computation actually produces.
pub(crate) struct BoxOutput<Inner>(pub(crate) Inner);

impl<Inner: Stepwise> Stepwise for BoxOutput<Inner> {
    type Output = AnyValue;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        match self.0.step(input)? {
            Step::Effect(e) => Ok(Step::Effect(e)),
            Step::Async(a) => Ok(Step::Async(a)),
            Step::Done(v) => Ok(Step::Done(v.map(box_value))),
        }
    }
}

/// The outcome a `resume`/`terminate` sugar body produces: either a
/// plain value, or a sub-computation whose eventual result becomes the
/// value — if the body returns a sub-computation instead of a plain
/// value, it runs to completion and its result becomes the resume (or
/// terminate) value.
pub enum BodyResult<T> {
    Value(T),
    Sub(crate::computation::Computation<T>),
}

impl<T> From<T> for BodyResult<T> {
    fn from(v: T) -> Self {
        BodyResult::Value(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::effect_with_default;
    use crate::computation::Computation;

    #[test]
    fn second_resume_call_is_ignored_value_from_first_wins() {
        let program: Computation<i32> = crate::builder::effect::<i32, ()>("ping", ()).handle("ping", |ctx, _payloads| {
            ctx.resume(Some(box_value(1_i32)));
            ctx.resume(Some(box_value(2_i32)));
        });

        assert_eq!(program.run_sync().unwrap(), Some(1));
    }

    #[test]
    fn a_dropped_handler_falls_back_to_the_effect_default() {
        let program: Computation<i32> = effect_with_default::<i32, (), i32, _>("greet", (), |_payloads| 99)
            .handle("greet", |_ctx, _payloads| {
                // Neither resume nor terminate: the context is simply dropped.
            });

        assert_eq!(program.run_sync().unwrap(), Some(99));
    }
}
