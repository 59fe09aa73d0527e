//! Constructors for effect-yielding computations: `effect`, `error`,
//! `dependency`.
//!
//! An effect computation's payloads are produced fresh on every run
//! from a `Clone` tuple rather than from a pre-boxed `Vec<AnyValue>` —
//! the same reasoning as `Computation::of`'s `Clone` bound: a
//! `Computation` may be run more than once, and `Box<dyn Any>` itself
//! has no way to be cloned generically.

use std::sync::Arc;

use crate::computation::Computation;
use crate::effect::{DefaultHandlerFn, Effect, EffectName};
use crate::error::EffectError;
use crate::step::{Resumption, Step, Stepwise};
use crate::value::{box_value, downcast, AnyValue};

/// A tuple of payload values an effect can be built from. Implemented
/// for arities 0 through 3, which covers every payload shape the
/// concrete scenarios in this crate's tests use.
pub trait EffectPayloads: Clone + Send + 'static {
    fn into_any_vec(self) -> Vec<AnyValue>;
}

impl EffectPayloads for () {
    fn into_any_vec(self) -> Vec<AnyValue> {
        Vec::new()
    }
}

impl<A: Clone + Send + 'static> EffectPayloads for (A,) {
    fn into_any_vec(self) -> Vec<AnyValue> {
        vec![box_value(self.0)]
    }
}

impl<A: Clone + Send + 'static, B: Clone + Send + 'static> EffectPayloads for (A, B) {
    fn into_any_vec(self) -> Vec<AnyValue> {
        vec![box_value(self.0), box_value(self.1)]
    }
}

impl<A: Clone + Send + 'static, B: Clone + Send + 'static, C: Clone + Send + 'static> EffectPayloads for (A, B, C) {
    fn into_any_vec(self) -> Vec<AnyValue> {
        vec![box_value(self.0), box_value(self.1), box_value(self.2)]
    }
}

/// A leaf computation that yields exactly one effect descriptor, then
/// completes with whatever value it's resumed with.
struct YieldOnce<T> {
    name: EffectName,
    payloads: Option<Vec<AnyValue>>,
    resumable: bool,
    default_handler: Option<DefaultHandlerFn>,
}

impl<T: Send + 'static> Stepwise for YieldOnce<T> {
    type Output = T;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        match self.payloads.take() {
            Some(payloads) => {
                let mut effect = Effect::new(self.name.clone(), payloads);
                if !self.resumable {
                    effect = effect.non_resumable();
                }
                if let Some(handler) = self.default_handler.clone() {
                    effect = effect.with_default_handler(handler);
                }
                Ok(Step::Effect(effect))
            }
            None => match input {
                Resumption::Value(v) => {
                    let value = downcast::<T>(v).map_err(|_| EffectError::MalformedYield {
                        detail: format!(
                            "resume value for effect \"{}\" did not match the type this computation expects",
                            self.name
                        ),
                    })?;
                    Ok(Step::Done(Some(value)))
                }
                Resumption::Unit => Ok(Step::Done(None)),
                Resumption::Start => unreachable!("YieldOnce yields on its first step; Start never recurs"),
            },
        }
    }
}

fn build<T, P>(
    name: EffectName,
    payloads: P,
    resumable: bool,
    default_handler: Option<DefaultHandlerFn>,
) -> Computation<T>
where
    T: Send + 'static,
    P: EffectPayloads,
{
    Computation::from_boxed_factory(move || {
        Box::new(YieldOnce::<T> {
            name: name.clone(),
            payloads: Some(payloads.clone().into_any_vec()),
            resumable,
            default_handler: default_handler.clone(),
        })
    })
}

/// `effect(name, payloads)`: yield a bare effect descriptor and
/// complete with whatever a handler resumes it with.
pub fn effect<T, P>(name: impl Into<EffectName>, payloads: P) -> Computation<T>
where
    T: Send + 'static,
    P: EffectPayloads,
{
    build(name.into(), payloads, true, None)
}

/// `effect(name, payloads, default)`: like
/// [`effect`] but falls back to `default` — run with the same
/// [`crate::computation::EffectCtx`] any other handler gets — when
/// nothing up the chain matches.
pub fn effect_with_default<T, P, R, D>(name: impl Into<EffectName>, payloads: P, default: D) -> Computation<T>
where
    T: Send + 'static,
    P: EffectPayloads,
    R: Send + 'static,
    D: Fn(Vec<AnyValue>) -> R + Send + Sync + 'static,
{
    let default = Arc::new(default);
    let handler: DefaultHandlerFn = Arc::new(move |ctx, payloads| {
        let value = (default)(payloads);
        ctx.resume(Some(box_value(value)));
    });
    build(name.into(), payloads, true, Some(handler))
}

/// `error(class, payloads)`: an effect named by the `"error:"`
/// convention `catch`/`catch_all` recognize. Non-resumable — raising an
/// error ends the scope a handler recovers it into rather than handing
/// a value back to the raise site.
pub fn error<T, P>(class: &str, payloads: P) -> Computation<T>
where
    T: Send + 'static,
    P: EffectPayloads,
{
    build(EffectName::new(format!("error:{class}")), payloads, false, None)
}

/// `dependency(name, payloads)`: an effect named by the
/// `"dependency:"` convention `provide`/`provide_by` recognize.
pub fn dependency<T, P>(name: &str, payloads: P) -> Computation<T>
where
    T: Send + 'static,
    P: EffectPayloads,
{
    build(EffectName::new(format!("dependency:{name}")), payloads, true, None)
}

/// A zero-cost marker scoping a handler fragment to one effect/resume-type
/// pair, for call sites that want the pairing checked at the type level
/// even though dispatch itself is purely by name at runtime.
pub struct HandlerFor<E, R> {
    _marker: std::marker::PhantomData<fn() -> (E, R)>,
}

/// `define_handler_for::<E, R>()`: names the effect/resume types a
/// handler fragment is written against, purely for the reader and the
/// type checker — `.with(transform)` hands `transform` straight back.
pub fn define_handler_for<E, R>() -> HandlerFor<E, R> {
    HandlerFor {
        _marker: std::marker::PhantomData,
    }
}

impl<E, R> HandlerFor<E, R> {
    pub fn with<F: Fn(R) -> R>(self, transform: F) -> F {
        transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computation::BodyResult;
    use crate::error::EffectError;

    #[test]
    fn effect_resumes_with_the_sum() {
        let program: Computation<i32> = effect::<i32, (i32, i32)>("add", (40, 2)).resume(
            "add",
            |payloads: Vec<AnyValue>| {
                let mut values = payloads.into_iter();
                let a = downcast::<i32>(values.next().unwrap()).unwrap();
                let b = downcast::<i32>(values.next().unwrap()).unwrap();
                BodyResult::Value(a + b)
            },
        );

        assert_eq!(program.run_sync().unwrap(), Some(42));
    }

    #[test]
    fn catch_recovers_from_a_non_resumable_error() {
        let program: Computation<i32> = error::<i32, (String,)>("division", ("divide by zero".to_string(),))
            .catch("division", |_payloads| BodyResult::Value(-1));

        assert_eq!(program.run_sync().unwrap(), Some(-1));
    }

    #[test]
    fn provide_satisfies_a_dependency_effect() {
        let program: Computation<String> =
            dependency::<String, ()>("clock", ()).provide("clock", "2026-07-27".to_string());

        assert_eq!(program.run_sync().unwrap(), Some("2026-07-27".to_string()));
    }

    #[test]
    fn an_effect_with_no_handler_and_no_default_is_unhandled() {
        let program: Computation<i32> = effect::<i32, ()>("nothing_listens", ());

        match program.run_sync() {
            Err(EffectError::UnhandledEffect { name, payload_count }) => {
                assert_eq!(name.as_str(), "nothing_listens");
                assert_eq!(payload_count, 0);
            }
            other => panic!("expected UnhandledEffect, got {other:?}"),
        }
    }
}
