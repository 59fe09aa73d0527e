//! The `all_seq` and `all` aggregators. Both preserve positional shape; they differ
//! in whether sub-computations are driven strictly one after another or
//! interleaved with rotation on suspension.
//!
//! Name-keyed variants (`all_seq` / `all` over a mapping rather than a
//! list) are built in `computation::mod` on top of the list engines here
//! by zipping keys back onto a positional result — the engines
//! themselves only ever need to reason about indices.

use std::future::poll_fn;
use std::sync::{Arc, Mutex};
use std::task::Poll;

use crate::error::EffectError;
use crate::step::{AsyncMarker, AsyncOutcome, BoxFuture, BoxStepwise, InterruptLabel, Resumption, Step, Stepwise};

/// `all_seq(items)`: steps each inner computation to completion in
/// order before moving to the next; an inner's own effects and async
/// markers pass straight through.
pub(crate) struct AllSeqFrame<T> {
    items: Vec<BoxStepwise<T>>,
    index: usize,
    results: Vec<T>,
}

impl<T: Send + 'static> AllSeqFrame<T> {
    pub(crate) fn new(items: Vec<BoxStepwise<T>>) -> Self {
        Self {
            items,
            index: 0,
            results: Vec::new(),
        }
    }
}

impl<T: Send + 'static> Stepwise for AllSeqFrame<T> {
    type Output = Vec<T>;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        let mut current = input;
        loop {
            if self.index >= self.items.len() {
                return Ok(Step::Done(Some(std::mem::take(&mut self.results))));
            }
            match self.items[self.index].step(current)? {
                Step::Effect(e) => return Ok(Step::Effect(e)),
                Step::Async(a) => return Ok(Step::Async(a)),
                Step::Done(v) => {
                    self.results
                        .push(v.expect("all_seq() item completed without a value"));
                    self.index += 1;
                    current = Resumption::Start;
                }
            }
        }
    }
}

type PendingFuture = (usize, BoxFuture<Result<AsyncOutcome, EffectError>>);
type WakeResult = (usize, Result<AsyncOutcome, EffectError>, Vec<PendingFuture>);

/// Poll a dynamic set of futures concurrently and return the first to
/// resolve along with the untouched remainder, so none of the losing
/// futures' in-flight work is discarded. A hand-rolled replacement for
/// `futures::future::select_all` that needs no extra dependency beyond
/// what the interpreter already pulls in for its oneshot channels.
async fn select_first(mut pending: Vec<PendingFuture>) -> WakeResult {
    let (winner_index, winner_outcome) = poll_fn(|cx| {
        for i in 0..pending.len() {
            if let Poll::Ready(outcome) = pending[i].1.as_mut().poll(cx) {
                let (idx, _) = pending.remove(i);
                return Poll::Ready((idx, outcome));
            }
        }
        Poll::Pending
    })
    .await;
    (winner_index, winner_outcome, pending)
}

enum Slot<T> {
    Active(BoxStepwise<T>),
    Done(Option<T>),
}

/// `all(items)`: rotates among idle
/// sub-computations, parking any that suspend and resuming whichever
/// completes first.
pub(crate) struct AllFrame<T> {
    slots: Vec<Slot<T>>,
    awaiting: std::collections::HashSet<usize>,
    in_flight: Vec<PendingFuture>,
    woken: Option<Arc<Mutex<Option<WakeResult>>>>,
    focus: usize,
    label: InterruptLabel,
}

impl<T: Send + 'static> AllFrame<T> {
    pub(crate) fn new(items: Vec<BoxStepwise<T>>) -> Self {
        Self {
            slots: items.into_iter().map(Slot::Active).collect(),
            awaiting: std::collections::HashSet::new(),
            in_flight: Vec::new(),
            woken: None,
            focus: 0,
            label: InterruptLabel::fresh(),
        }
    }

    fn find_idle(&self) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        let n = self.slots.len();
        for offset in 0..n {
            let idx = (self.focus + offset) % n;
            if let Slot::Active(_) = &self.slots[idx] {
                if !self.awaiting.contains(&idx) {
                    return Some(idx);
                }
            }
        }
        None
    }

    fn apply_outcome(
        &mut self,
        idx: usize,
        outcome: Result<AsyncOutcome, EffectError>,
        current: &mut Resumption,
    ) -> Result<(), EffectError> {
        self.awaiting.remove(&idx);
        let AsyncOutcome(value) = outcome?;
        self.focus = idx;
        *current = value.map(Resumption::Value).unwrap_or(Resumption::Unit);
        Ok(())
    }

    fn suspend(&mut self) -> Result<Step<Vec<T>>, EffectError> {
        let pending = std::mem::take(&mut self.in_flight);
        let cell: Arc<Mutex<Option<WakeResult>>> = Arc::new(Mutex::new(None));
        let cell_for_future = cell.clone();
        let future: BoxFuture<Result<AsyncOutcome, EffectError>> = Box::pin(async move {
            let result = select_first(pending).await;
            *cell_for_future.lock().expect("wake-result cell poisoned") = Some(result);
            Ok(AsyncOutcome(None))
        });
        self.woken = Some(cell);
        Ok(Step::Async(AsyncMarker::new(future).tagged(self.label)))
    }
}

impl<T: Send + 'static> Stepwise for AllFrame<T> {
    type Output = Vec<T>;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        let mut current = input;

        if let Some(cell) = self.woken.take() {
            let (idx, outcome, remaining) = cell
                .lock()
                .expect("wake-result cell poisoned")
                .take()
                .expect("async marker resolved before its wake result was recorded");
            self.in_flight = remaining;
            self.apply_outcome(idx, outcome, &mut current)?;
        }

        loop {
            if self.slots.iter().all(|s| matches!(s, Slot::Done(_))) {
                let results = std::mem::take(&mut self.slots)
                    .into_iter()
                    .map(|s| match s {
                        Slot::Done(v) => v.expect("all() item completed without a value"),
                        Slot::Active(_) => unreachable!("checked all slots are Done above"),
                    })
                    .collect();
                return Ok(Step::Done(Some(results)));
            }

            let Some(idx) = self.find_idle() else {
                return self.suspend();
            };
            self.focus = idx;
            let Slot::Active(stepwise) = &mut self.slots[idx] else {
                unreachable!("find_idle only returns Active slots")
            };
            match stepwise.step(std::mem::replace(&mut current, Resumption::Start))? {
                Step::Effect(e) => return Ok(Step::Effect(e)),
                Step::Async(marker) => {
                    self.awaiting.insert(idx);
                    self.in_flight.push((idx, marker.on_complete));
                }
                Step::Done(v) => {
                    self.slots[idx] = Slot::Done(v);
                }
            }
            self.focus = (idx + 1) % self.slots.len().max(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_bridge::effectify;
    use crate::computation::Computation;

    fn slow(id: i32, delay_ms: u64) -> Computation<i32> {
        effectify(move || async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            id
        })
    }

    #[tokio::test]
    async fn all_seq_preserves_positional_shape_and_order() {
        let program = crate::computation::all_seq(vec![slow(1, 15), slow(2, 5), slow(3, 10)]);

        assert_eq!(program.run_async().await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn all_preserves_positional_order_despite_out_of_order_completion() {
        let program = crate::computation::all(vec![slow(1, 10), slow(2, 20), slow(3, 5)]);

        let result = tokio_test::block_on(program.run_async());
        assert_eq!(result.unwrap(), Some(vec![1, 2, 3]));
    }
}
