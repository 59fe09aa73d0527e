//! The top-level interpreter driver:
//! the loop that turns a `Stepwise` tree into a final value.
//!
//! Named `runtime` rather than `interpreter` to avoid colliding with
//! this crate's legacy DSL executor module (`src/interpreter/`),
//! removed once every module this crate now implements has a home.

use std::sync::Arc;

use tracing::debug;

use crate::computation::handlers::{invoke_handler_body, BodyInvocation, HandlerBody, HandlerBodyOutcome, HandlerResult};
use crate::error::EffectError;
use crate::step::{BoxStepwise, Resumption, Step};
use crate::value::{downcast, AnyValue};

fn terminate_value<T: 'static>(v: Option<AnyValue>) -> Result<Option<T>, EffectError> {
    v.map(|boxed| {
        downcast::<T>(boxed).map_err(|_| EffectError::MalformedYield {
            detail: "default handler's terminate value did not match the computation's output type".to_string(),
        })
    })
    .transpose()
}

/// Invoke an effect's default handler, or fail with
/// [`EffectError::UnhandledEffect`] if it doesn't have one — reached
/// only once an effect has bubbled past every installed handler.
fn invoke_default(effect: crate::effect::Effect) -> Result<BodyInvocation, EffectError> {
    let (name, resumable, default_handler, payloads) = effect.into_parts();
    let handler = default_handler.ok_or_else(|| EffectError::UnhandledEffect {
        name: name.clone(),
        payload_count: payloads.len(),
    })?;
    debug!(effect = %name, "falling back to default handler");
    let wrapped: HandlerBody = Arc::new(move |ctx, payloads| {
        handler(ctx, payloads);
        HandlerBodyOutcome::None
    });
    invoke_handler_body(name, resumable, payloads, &wrapped)
}

/// Drive `stepwise` to completion without ever awaiting. An `Async`
/// yield reaching this runner — the computation (or a deferred default
/// handler) suspended expecting something to complete later — is a
/// programmer error here.
pub fn run_sync<T: Send + 'static>(mut stepwise: BoxStepwise<T>) -> Result<Option<T>, EffectError> {
    let mut input = Resumption::Start;
    loop {
        match stepwise.step(input)? {
            Step::Done(v) => return Ok(v),
            Step::Async(_) => return Err(EffectError::AsyncUnderSync),
            Step::Effect(effect) => match invoke_default(effect)? {
                BodyInvocation::Immediate(HandlerResult::Resumed(v)) => {
                    input = v.map(Resumption::Value).unwrap_or(Resumption::Unit);
                }
                BodyInvocation::Immediate(HandlerResult::Terminated(v)) => return terminate_value(v),
                BodyInvocation::Immediate(HandlerResult::Rejected(e)) => return Err(e),
                BodyInvocation::Deferred { .. } => return Err(EffectError::AsyncUnderSync),
                BodyInvocation::Intercept { .. } => {
                    return Err(EffectError::MalformedYield {
                        detail: "default handlers cannot use the resume/terminate sugar's intercept form"
                            .to_string(),
                    })
                }
            },
        }
    }
}

/// Drive `stepwise` to completion, awaiting every `Async` yield as it
/// comes — both the computation's own suspensions and any deferred
/// default handler's.
pub async fn run_async<T: Send + 'static>(mut stepwise: BoxStepwise<T>) -> Result<Option<T>, EffectError> {
    let mut input = Resumption::Start;
    loop {
        match stepwise.step(input)? {
            Step::Done(v) => return Ok(v),
            Step::Async(marker) => {
                let outcome = marker.on_complete.await?;
                input = outcome.0.map(Resumption::Value).unwrap_or(Resumption::Unit);
            }
            Step::Effect(effect) => match invoke_default(effect)? {
                BodyInvocation::Immediate(HandlerResult::Resumed(v)) => {
                    input = v.map(Resumption::Value).unwrap_or(Resumption::Unit);
                }
                BodyInvocation::Immediate(HandlerResult::Terminated(v)) => return terminate_value(v),
                BodyInvocation::Immediate(HandlerResult::Rejected(e)) => return Err(e),
                BodyInvocation::Deferred { future } => match future.await {
                    HandlerResult::Resumed(v) => {
                        input = v.map(Resumption::Value).unwrap_or(Resumption::Unit);
                    }
                    HandlerResult::Terminated(v) => return terminate_value(v),
                    HandlerResult::Rejected(e) => return Err(e),
                },
                BodyInvocation::Intercept { .. } => {
                    return Err(EffectError::MalformedYield {
                        detail: "default handlers cannot use the resume/terminate sugar's intercept form"
                            .to_string(),
                    })
                }
            },
        }
    }
}
