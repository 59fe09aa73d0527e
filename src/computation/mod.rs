//! [`Computation`] — the public value type and all of its
//! combinator methods. The actual stepping logic lives in the sibling
//! `combinators`, `handlers`, and `aggregate` modules; this module is
//! the glue that builds the right `Stepwise` tree and wraps it back up.

pub mod aggregate;
pub mod combinators;
pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use crate::effect::{EffectName, Matcher};
use crate::error::EffectError;
use crate::step::{BoxStepwise, Stepwise};
use crate::value::{box_value, AnyValue};

use aggregate::{AllFrame, AllSeqFrame};
use combinators::{AndThenFrame, FlatMapCombine, FromLeaf, MapFrame, OfLeaf, TapCombine, ZipFrame};
pub use handlers::{BodyResult, EffectCtx};
use handlers::{BoxOutput, HandleFrame, HandlerBody, HandlerBodyOutcome, PendingKind};

/// An algebraic-effects computation that produces a `T` when run.
///
/// A `Computation` is a recipe, not a running thing: cloning it is cheap
/// (an `Arc` bump) and running it (`run_sync`/`run_async`) never
/// consumes it — the same `Computation` can be run many times, each run
/// building its own fresh `Stepwise` tree from scratch.
pub struct Computation<T> {
    factory: Arc<dyn Fn() -> BoxStepwise<T> + Send + Sync>,
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
        }
    }
}

fn error_matcher(class: &str) -> Matcher {
    Matcher::Name(EffectName::new(format!("error:{class}")))
}

fn error_matcher_all() -> Matcher {
    Matcher::from(|name: &EffectName| name.strip_error_prefix().is_some())
}

fn dependency_matcher(name: &str) -> Matcher {
    Matcher::Name(EffectName::new(format!("dependency:{name}")))
}

impl<T: Send + 'static> Computation<T> {
    pub(crate) fn from_boxed_factory(factory: impl Fn() -> BoxStepwise<T> + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }

    pub(crate) fn make_stepwise(&self) -> BoxStepwise<T> {
        (self.factory)()
    }

    /// `effected(factory)`: build a computation directly from a
    /// user-supplied stepwise-computation factory, for callers that
    /// implement their own `Stepwise` leaf instead of composing one
    /// from the constructors and combinators above.
    pub fn effected<S>(factory: impl Fn() -> S + Send + Sync + 'static) -> Self
    where
        S: Stepwise<Output = T> + Send + 'static,
    {
        Self::from_boxed_factory(move || Box::new(factory()) as BoxStepwise<T>)
    }

    /// `from(f)`: builds a value by calling `f` lazily, once per
    /// run, the first time the computation is stepped.
    pub fn from(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let f = Arc::new(f);
        Self::from_boxed_factory(move || {
            let f = f.clone();
            Box::new(FromLeaf::new(move || f()))
        })
    }

    /// `map(f)`: transform the completed value. `f` only runs if
    /// the computation reaches `Done`.
    pub fn map<U, F>(&self, f: F) -> Computation<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let inner_factory = self.factory.clone();
        let f = Arc::new(f);
        Computation::from_boxed_factory(move || {
            let f = f.clone();
            Box::new(MapFrame {
                inner: (inner_factory)(),
                f: Some(move |v: T| (f)(v)),
            })
        })
    }

    /// `as(value)`, spelled `as_value` since `as` is a Rust
    /// keyword: discard the computed value and replace it with a fixed
    /// one.
    pub fn as_value<U>(&self, value: U) -> Computation<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.map(move |_| value.clone())
    }

    /// `as_void()`: discard the computed value entirely.
    pub fn as_void(&self) -> Computation<()> {
        self.map(|_| ())
    }

    fn sequence<U, S, G, C>(&self, g: G, combine: impl Fn() -> C + Send + Sync + 'static) -> Computation<U>
    where
        T: Clone + Send + 'static,
        U: Send + 'static,
        S: Send + 'static,
        G: Fn(T) -> Computation<S> + Send + Sync + 'static,
        C: combinators::Combine<T, U, S> + Send + 'static,
    {
        let inner_factory = self.factory.clone();
        let g = Arc::new(g);
        Computation::from_boxed_factory(move || {
            let g = g.clone();
            Box::new(AndThenFrame::new(
                (inner_factory)(),
                move |v: T| (g)(v).make_stepwise(),
                combine(),
            ))
        })
    }

    /// `flat_map(g)`: run `g`'s computation after this one
    /// completes, keeping `g`'s result.
    pub fn flat_map<U, G>(&self, g: G) -> Computation<U>
    where
        T: Clone + Send + 'static,
        U: Send + 'static,
        G: Fn(T) -> Computation<U> + Send + Sync + 'static,
    {
        self.sequence(g, || FlatMapCombine)
    }

    /// `and_then(g)`: alias for [`Self::flat_map`].
    pub fn and_then<U, G>(&self, g: G) -> Computation<U>
    where
        T: Clone + Send + 'static,
        U: Send + 'static,
        G: Fn(T) -> Computation<U> + Send + Sync + 'static,
    {
        self.flat_map(g)
    }

    /// `tap(g)`: run `g`'s computation for its effects only,
    /// keeping this computation's own result.
    pub fn tap<S, G>(&self, g: G) -> Computation<T>
    where
        T: Clone + Send + 'static,
        S: Send + 'static,
        G: Fn(T) -> Computation<S> + Send + Sync + 'static,
    {
        self.sequence(g, || TapCombine)
    }

    /// `zip(b)`: run both computations in sequence — `a` fully,
    /// then `b` — and return both results as a pair.
    pub fn zip<B>(&self, b: &Computation<B>) -> Computation<(Option<T>, Option<B>)>
    where
        B: Send + 'static,
    {
        self.zip_with(b, |a, b| (a, b))
    }

    /// `zip(b, f)`: like [`Self::zip`] but combines both results
    /// with `f` instead of pairing them.
    pub fn zip_with<B, R, F>(&self, b: &Computation<B>, f: F) -> Computation<R>
    where
        B: Send + 'static,
        R: Send + 'static,
        F: Fn(Option<T>, Option<B>) -> R + Send + Sync + 'static,
    {
        let a_factory = self.factory.clone();
        let b_factory = b.factory.clone();
        let f = Arc::new(f);
        Computation::from_boxed_factory(move || {
            let f = f.clone();
            Box::new(ZipFrame::new((a_factory)(), (b_factory)(), move |a, b| {
                (f)(a, b)
            }))
        })
    }

    /// `with(f)` / `pipe(f)`: trivial function application over
    /// the computation value itself, for composing external helpers
    /// without breaking a combinator chain.
    pub fn with<R>(&self, f: impl FnOnce(&Computation<T>) -> R) -> R {
        f(self)
    }

    /// `pipe(f)`: owning counterpart of [`Self::with`].
    pub fn pipe<R>(self, f: impl FnOnce(Computation<T>) -> R) -> R {
        f(self)
    }

    fn resume_sugar<R, F>(&self, matcher: impl Into<Matcher>, body: F, kind: PendingKind) -> Computation<T>
    where
        R: Send + 'static,
        F: Fn(Vec<AnyValue>) -> BodyResult<R> + Send + Sync + 'static,
    {
        let inner_factory = self.factory.clone();
        let matcher = matcher.into();
        let body = Arc::new(body);
        let handler_body: HandlerBody = Arc::new(move |ctx, payloads| match body(payloads) {
            BodyResult::Value(v) => {
                let boxed = box_value(v);
                match kind {
                    PendingKind::Resume => ctx.resume(Some(boxed)),
                    PendingKind::Terminate => ctx.terminate(Some(boxed)),
                }
                HandlerBodyOutcome::None
            }
            BodyResult::Sub(sub) => HandlerBodyOutcome::Intercept {
                computation: Box::new(BoxOutput(sub.make_stepwise())),
                kind,
            },
        });
        Computation::from_boxed_factory(move || {
            Box::new(HandleFrame::new((inner_factory)(), matcher.clone(), handler_body.clone()))
        })
    }

    /// `handle(match, body)`: install a raw handler.
    /// `body` is responsible for calling `ctx.resume`/`ctx.terminate`
    /// itself, synchronously or from a spawned task.
    pub fn handle(
        &self,
        matcher: impl Into<Matcher>,
        body: impl Fn(EffectCtx, Vec<AnyValue>) + Send + Sync + 'static,
    ) -> Computation<T> {
        let inner_factory = self.factory.clone();
        let matcher = matcher.into();
        let handler_body: HandlerBody = Arc::new(move |ctx, payloads| {
            body(ctx, payloads);
            HandlerBodyOutcome::None
        });
        Computation::from_boxed_factory(move || {
            Box::new(HandleFrame::new((inner_factory)(), matcher.clone(), handler_body.clone()))
        })
    }

    /// `resume(match, body)`: install a handler whose body
    /// computes the resume value directly, instead of calling `ctx`
    /// itself. If `body` returns a sub-computation, its result becomes
    /// the resume value once it completes.
    pub fn resume<R, F>(&self, matcher: impl Into<Matcher>, body: F) -> Computation<T>
    where
        R: Send + 'static,
        F: Fn(Vec<AnyValue>) -> BodyResult<R> + Send + Sync + 'static,
    {
        self.resume_sugar(matcher, body, PendingKind::Resume)
    }

    /// `terminate(match, body)`: like [`Self::resume`] but ends
    /// the enclosing scope with `body`'s value instead of resuming it.
    pub fn terminate<R, F>(&self, matcher: impl Into<Matcher>, body: F) -> Computation<T>
    where
        R: Send + 'static,
        F: Fn(Vec<AnyValue>) -> BodyResult<R> + Send + Sync + 'static,
    {
        self.resume_sugar(matcher, body, PendingKind::Terminate)
    }

    /// `catch(class, body)`: recover from `"error:<class>"`
    /// by ending the scope with `body`'s value — the same type this
    /// computation already produces — instead of the error.
    pub fn catch<F>(&self, class: &str, body: F) -> Computation<T>
    where
        T: Send + 'static,
        F: Fn(Vec<AnyValue>) -> BodyResult<T> + Send + Sync + 'static,
    {
        self.resume_sugar(error_matcher(class), body, PendingKind::Terminate)
    }

    /// `catch_all(body)`: like [`Self::catch`] but matches
    /// any `"error:*"` effect.
    pub fn catch_all<F>(&self, body: F) -> Computation<T>
    where
        T: Send + 'static,
        F: Fn(Vec<AnyValue>) -> BodyResult<T> + Send + Sync + 'static,
    {
        self.resume_sugar(error_matcher_all(), body, PendingKind::Terminate)
    }

    /// `catch_and_throw(class, body)`: run `body` to produce
    /// a failure message, then end the computation with
    /// [`EffectError::Raised`] instead of recovering — the effect's
    /// class becomes the error's class.
    pub fn catch_and_throw(
        &self,
        class: &str,
        body: impl Fn(Vec<AnyValue>) -> String + Send + Sync + 'static,
    ) -> Computation<T> {
        let inner_factory = self.factory.clone();
        let matcher = error_matcher(class);
        let handler_body: HandlerBody = Arc::new(move |ctx, payloads| {
            ctx.raise(body(payloads));
            HandlerBodyOutcome::None
        });
        Computation::from_boxed_factory(move || {
            Box::new(HandleFrame::new((inner_factory)(), matcher.clone(), handler_body.clone()))
        })
    }

    /// `catch_all_and_throw(body)`: like
    /// [`Self::catch_and_throw`] but matches any `"error:*"` effect.
    pub fn catch_all_and_throw(&self, body: impl Fn(Vec<AnyValue>) -> String + Send + Sync + 'static) -> Computation<T> {
        let inner_factory = self.factory.clone();
        let matcher = error_matcher_all();
        let handler_body: HandlerBody = Arc::new(move |ctx, payloads| {
            ctx.raise(body(payloads));
            HandlerBodyOutcome::None
        });
        Computation::from_boxed_factory(move || {
            Box::new(HandleFrame::new((inner_factory)(), matcher.clone(), handler_body.clone()))
        })
    }

    /// `provide(name, value)`: satisfy `"dependency:<name>"`
    /// with a fixed, cloneable value.
    pub fn provide<R>(&self, name: &str, value: R) -> Computation<T>
    where
        R: Clone + Send + 'static,
    {
        self.resume_sugar(
            dependency_matcher(name),
            move |_payloads| BodyResult::Value(value.clone()),
            PendingKind::Resume,
        )
    }

    /// `provide_by(name, f)`: satisfy `"dependency:<name>"`
    /// by calling `f` each time it's requested.
    pub fn provide_by<R, F>(&self, name: &str, f: F) -> Computation<T>
    where
        R: Send + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.resume_sugar(
            dependency_matcher(name),
            move |_payloads| BodyResult::Value(f()),
            PendingKind::Resume,
        )
    }
}

impl<T: Clone + Send + 'static> Computation<T> {
    /// `of(value)`: completes immediately with a clone of
    /// `value` on every run.
    pub fn of(value: T) -> Self {
        Self::from_boxed_factory(move || Box::new(OfLeaf(Some(value.clone()))))
    }
}

impl<T: Send + 'static> Computation<T> {
    /// Run to completion without ever awaiting. `Ok(None)` means the
    /// computation reached `Done` without ever producing a value, as
    /// opposed to `Ok(Some(_))` for one that did.
    pub fn run_sync(&self) -> Result<Option<T>, EffectError> {
        crate::runtime::run_sync(self.make_stepwise())
    }

    pub async fn run_async(&self) -> Result<Option<T>, EffectError> {
        crate::runtime::run_async(self.make_stepwise()).await
    }

    /// `run_sync_unsafe`:
    /// identical to `run_sync` — there is no separate static
    /// unhandled-effect analysis for this to skip.
    pub fn run_sync_unsafe(&self) -> Result<Option<T>, EffectError> {
        self.run_sync()
    }

    pub async fn run_async_unsafe(&self) -> Result<Option<T>, EffectError> {
        self.run_async().await
    }
}

/// `all_seq(items)`: run each computation to
/// completion in order, collecting their results positionally.
pub fn all_seq<T: Send + 'static>(items: Vec<Computation<T>>) -> Computation<Vec<T>> {
    Computation::from_boxed_factory(move || {
        let stepwise_items: Vec<BoxStepwise<T>> = items.iter().map(Computation::make_stepwise).collect();
        Box::new(AllSeqFrame::new(stepwise_items))
    })
}

/// `all(items)`: interleave the
/// computations, rotating focus on suspension, collecting their results
/// positionally.
pub fn all<T: Send + 'static>(items: Vec<Computation<T>>) -> Computation<Vec<T>> {
    Computation::from_boxed_factory(move || {
        let stepwise_items: Vec<BoxStepwise<T>> = items.iter().map(Computation::make_stepwise).collect();
        Box::new(AllFrame::new(stepwise_items))
    })
}

/// `all_seq` over a name-keyed mapping rather than a list: built by
/// zipping the keys back onto the positional engine's result.
pub fn all_seq_map<T: Send + 'static>(items: Vec<(String, Computation<T>)>) -> Computation<HashMap<String, T>> {
    let (keys, comps): (Vec<String>, Vec<Computation<T>>) = items.into_iter().unzip();
    all_seq(comps).map(move |values| keys.iter().cloned().zip(values).collect())
}

/// `all` over a name-keyed mapping rather than a list (see
/// [`all_seq_map`]).
pub fn all_map<T: Send + 'static>(items: Vec<(String, Computation<T>)>) -> Computation<HashMap<String, T>> {
    let (keys, comps): (Vec<String>, Vec<Computation<T>>) = items.into_iter().unzip();
    all(comps).map(move |values| keys.iter().cloned().zip(values).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::error as error_effect;
    use crate::value::downcast;

    #[test]
    fn of_and_from_both_complete_with_their_value() {
        assert_eq!(Computation::of(5).run_sync().unwrap(), Some(5));
        assert_eq!(Computation::from(|| 7).run_sync().unwrap(), Some(7));
    }

    #[test]
    fn map_respects_functor_composition() {
        let chained = Computation::of(3).map(|x| x + 1).map(|x| x * 2);
        let composed = Computation::of(3).map(|x| (x + 1) * 2);

        assert_eq!(chained.run_sync().unwrap(), composed.run_sync().unwrap());
    }

    #[test]
    fn flat_map_is_associative() {
        let f = |x: i32| Computation::of(x + 1);
        let g = |x: i32| Computation::of(x * 2);

        let left = Computation::of(3).flat_map(f).flat_map(g);
        let right = Computation::of(3).flat_map(move |x| f(x).flat_map(g));

        assert_eq!(left.run_sync().unwrap(), right.run_sync().unwrap());
    }

    #[test]
    fn catch_all_recovers_from_any_error_class() {
        let program: Computation<i32> =
            error_effect::<i32, (String,)>("b", ("whatever".to_string(),)).catch_all(|_payloads| BodyResult::Value(-7));

        assert_eq!(program.run_sync().unwrap(), Some(-7));
    }

    #[test]
    fn catch_all_and_throw_rethrows_with_the_expected_message() {
        let program: Computation<i32> = error_effect::<i32, (String,)>("a", ("x".to_string(),)).catch_all_and_throw(
            |payloads| {
                let detail = downcast::<String>(payloads.into_iter().next().unwrap()).unwrap();
                format!("a:{detail}")
            },
        );

        let err = program.run_sync().unwrap_err();
        assert_eq!(err.to_string(), "AError: a:x");
    }

    #[test]
    fn all_map_preserves_keys_via_maplit() {
        let items = maplit::hashmap! {
            "a".to_string() => Computation::of(1),
            "b".to_string() => Computation::of(2),
        };
        let program = all_map(items.into_iter().collect());

        let result = program.run_sync().unwrap().unwrap();
        assert_eq!(result.get("a"), Some(&1));
        assert_eq!(result.get("b"), Some(&2));
    }

    #[test]
    fn all_seq_map_preserves_keys_via_maplit() {
        let items = maplit::hashmap! {
            "x".to_string() => Computation::of(10),
            "y".to_string() => Computation::of(20),
        };
        let program = all_seq_map(items.into_iter().collect());

        let result = program.run_sync().unwrap().unwrap();
        assert_eq!(result.get("x"), Some(&10));
        assert_eq!(result.get("y"), Some(&20));
    }
}
