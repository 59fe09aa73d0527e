//! Constructors and the value/sequencing transformers: `of`, `from`,
//! `map`, `flat_map`/`and_then`, `tap`, `zip`.

use std::marker::PhantomData;

use crate::error::EffectError;
use crate::step::{Resumption, Step, Stepwise};

/// `of(v)`: completes immediately with a clone of `v` on every
/// run. Requires `Clone` because the same `Computation` can be run more
/// than once, and each run needs its own independent value.
pub(crate) struct OfLeaf<T>(pub(crate) Option<T>);

impl<T: Send + 'static> Stepwise for OfLeaf<T> {
    type Output = T;

    fn step(&mut self, _input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        Ok(Step::Done(self.0.take()))
    }
}

/// `from(f)`: calls `f` lazily, once, the first time the run
/// steps this computation.
pub(crate) struct FromLeaf<T, F> {
    pub(crate) f: Option<F>,
    _marker: PhantomData<T>,
}

impl<T, F> FromLeaf<T, F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f: Some(f),
            _marker: PhantomData,
        }
    }
}

impl<T, F> Stepwise for FromLeaf<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send,
{
    type Output = T;

    fn step(&mut self, _input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        match self.f.take() {
            Some(f) => Ok(Step::Done(Some(f()))),
            None => Ok(Step::Done(None)),
        }
    }
}

/// `map(f)`: `f` must be pure, applied only once the inner
/// computation completes.
pub(crate) struct MapFrame<Inner, F> {
    pub(crate) inner: Inner,
    pub(crate) f: Option<F>,
}

impl<Inner, F, U> Stepwise for MapFrame<Inner, F>
where
    Inner: Stepwise,
    F: FnOnce(Inner::Output) -> U + Send,
    U: Send + 'static,
{
    type Output = U;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        match self.inner.step(input)? {
            Step::Effect(e) => Ok(Step::Effect(e)),
            Step::Async(a) => Ok(Step::Async(a)),
            Step::Done(v) => {
                let f = self
                    .f
                    .take()
                    .expect("MapFrame stepped again after completion");
                Ok(Step::Done(v.map(f)))
            }
        }
    }
}

/// How a sequencing combinator (`flat_map`/`and_then`/`tap`) turns the
/// original value and the sub-computation's result into its own output.
/// `tap` keeps the original and discards the sub-result; `flat_map`/
/// `and_then` do the reverse.
pub(crate) trait Combine<T, U, S>: Send {
    fn finish(&self, original: Option<T>, sub_result: Option<S>) -> Option<U>;
}

pub(crate) struct FlatMapCombine;
impl<T, U: Send + 'static> Combine<T, U, U> for FlatMapCombine {
    fn finish(&self, _original: Option<T>, sub_result: Option<U>) -> Option<U> {
        sub_result
    }
}

pub(crate) struct TapCombine;
impl<T: Send + 'static, S> Combine<T, T, S> for TapCombine {
    fn finish(&self, original: Option<T>, _sub_result: Option<S>) -> Option<T> {
        original
    }
}

enum SequencePhase<Inner, Sub> {
    RunningInner(Inner),
    RunningSub(Sub),
}

/// Backs `flat_map`, `and_then`, and `tap` — all three run a
/// sub-computation after the inner one completes and differ only in
/// which of the two resulting values they keep (see [`Combine`]).
pub(crate) struct AndThenFrame<Inner, G, T, U, S, C, Sub> {
    phase: Option<SequencePhase<Inner, Sub>>,
    g: Option<G>,
    original: Option<T>,
    combine: C,
    _marker: PhantomData<(U, S)>,
}

impl<Inner, G, T, U, S, C, Sub> AndThenFrame<Inner, G, T, U, S, C, Sub>
where
    Inner: Stepwise<Output = T>,
{
    pub(crate) fn new(inner: Inner, g: G, combine: C) -> Self {
        Self {
            phase: Some(SequencePhase::RunningInner(inner)),
            g: Some(g),
            original: None,
            combine,
            _marker: PhantomData,
        }
    }
}

impl<Inner, G, T, U, S, C, Sub> Stepwise for AndThenFrame<Inner, G, T, U, S, C, Sub>
where
    Inner: Stepwise<Output = T>,
    Sub: Stepwise<Output = S>,
    T: Clone + Send + 'static,
    U: Send + 'static,
    S: Send + 'static,
    G: FnOnce(T) -> Sub + Send,
    C: Combine<T, U, S>,
{
    type Output = U;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        loop {
            match self
                .phase
                .take()
                .expect("AndThenFrame stepped after completion")
            {
                SequencePhase::RunningInner(mut inner) => match inner.step(input)? {
                    Step::Effect(e) => {
                        self.phase = Some(SequencePhase::RunningInner(inner));
                        return Ok(Step::Effect(e));
                    }
                    Step::Async(a) => {
                        self.phase = Some(SequencePhase::RunningInner(inner));
                        return Ok(Step::Async(a));
                    }
                    Step::Done(v) => {
                        self.original = v.clone();
                        let g = self.g.take().expect("g consumed once");
                        let value =
                            v.expect("sequencing combinator requires the inner computation to produce a value");
                        let sub = g(value);
                        self.phase = Some(SequencePhase::RunningSub(sub));
                        return self.step(Resumption::Start);
                    }
                },
                SequencePhase::RunningSub(mut sub) => match sub.step(input)? {
                    Step::Effect(e) => {
                        self.phase = Some(SequencePhase::RunningSub(sub));
                        return Ok(Step::Effect(e));
                    }
                    Step::Async(a) => {
                        self.phase = Some(SequencePhase::RunningSub(sub));
                        return Ok(Step::Async(a));
                    }
                    Step::Done(sub_value) => {
                        let out = self.combine.finish(self.original.take(), sub_value);
                        return Ok(Step::Done(out));
                    }
                },
            }
        }
    }
}

enum ZipState<A, B, Va> {
    A(A, B),
    B(B, Option<Va>),
}

/// `zip(b)` / `zip(b, f)`: strictly sequential — `a`'s effects are
/// all observed before `b`'s.
pub(crate) struct ZipFrame<A, B, Va, F, R> {
    state: Option<ZipState<A, B, Va>>,
    f: F,
    _marker: PhantomData<R>,
}

impl<A, B, Va, F, R> ZipFrame<A, B, Va, F, R> {
    pub(crate) fn new(a: A, b: B, f: F) -> Self {
        Self {
            state: Some(ZipState::A(a, b)),
            f,
            _marker: PhantomData,
        }
    }
}

impl<A, B, Va, Vb, F, R> Stepwise for ZipFrame<A, B, Va, F, R>
where
    A: Stepwise<Output = Va>,
    B: Stepwise<Output = Vb>,
    Va: Send + 'static,
    Vb: Send + 'static,
    F: Fn(Option<Va>, Option<Vb>) -> R + Send,
    R: Send + 'static,
{
    type Output = R;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        loop {
            match self.state.take().expect("ZipFrame stepped after completion") {
                ZipState::A(mut a, b) => match a.step(input)? {
                    Step::Effect(e) => {
                        self.state = Some(ZipState::A(a, b));
                        return Ok(Step::Effect(e));
                    }
                    Step::Async(marker) => {
                        self.state = Some(ZipState::A(a, b));
                        return Ok(Step::Async(marker));
                    }
                    Step::Done(va) => {
                        self.state = Some(ZipState::B(b, va));
                        return self.step(Resumption::Start);
                    }
                },
                ZipState::B(mut b, va) => match b.step(input)? {
                    Step::Effect(e) => {
                        self.state = Some(ZipState::B(b, va));
                        return Ok(Step::Effect(e));
                    }
                    Step::Async(marker) => {
                        self.state = Some(ZipState::B(b, va));
                        return Ok(Step::Async(marker));
                    }
                    Step::Done(vb) => return Ok(Step::Done(Some((self.f)(va, vb)))),
                },
            }
        }
    }
}
