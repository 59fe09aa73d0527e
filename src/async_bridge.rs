//! Lifting ordinary async Rust futures into the effect protocol.

use std::future::Future;
use std::sync::Arc;

use crate::computation::Computation;
use crate::error::EffectError;
use crate::step::{AsyncMarker, AsyncOutcome, BoxFuture, Resumption, Step, Stepwise};
use crate::value::{box_value, downcast};

struct AsyncLeaf<T> {
    future: Option<BoxFuture<T>>,
}

impl<T: Send + 'static> Stepwise for AsyncLeaf<T> {
    type Output = T;

    fn step(&mut self, input: Resumption) -> Result<Step<Self::Output>, EffectError> {
        match self.future.take() {
            Some(future) => {
                let marker_future: BoxFuture<Result<AsyncOutcome, EffectError>> = Box::pin(async move {
                    let value = future.await;
                    Ok(AsyncOutcome(Some(box_value(value))))
                });
                Ok(Step::Async(AsyncMarker::new(marker_future)))
            }
            None => match input {
                Resumption::Value(v) => {
                    let value = downcast::<T>(v).map_err(|_| EffectError::MalformedYield {
                        detail: "effectify's completion value did not match its computation's output type"
                            .to_string(),
                    })?;
                    Ok(Step::Done(Some(value)))
                }
                Resumption::Unit => Ok(Step::Done(None)),
                Resumption::Start => unreachable!("AsyncLeaf yields on its first step; Start never recurs"),
            },
        }
    }
}

/// `effectify(make_future)`: lift an async value into the effect
/// protocol as a single async suspension, driven by the interpreter the
/// same way any handler-deferred suspension is.
///
/// Takes a future *factory* rather than a bare future — a `Future` has
/// no way to be replayed, but a `Computation` is an immutable recipe
/// that may be run more than once, so each run needs its own fresh
/// poll of its own fresh future.
pub fn effectify<T, Fut, F>(make_future: F) -> Computation<T>
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
{
    let make_future = Arc::new(make_future);
    Computation::from_boxed_factory(move || {
        let make_future = make_future.clone();
        Box::new(AsyncLeaf {
            future: Some(Box::pin(async move { (make_future)().await })),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn effectified_future_completes_under_run_async() {
        let program = effectify(|| async { 9 });

        assert_eq!(program.run_async().await.unwrap(), Some(9));
    }

    #[test]
    fn effectified_future_refuses_to_run_under_run_sync() {
        let program = effectify(|| async { 9 });

        match program.run_sync() {
            Err(EffectError::AsyncUnderSync) => {}
            other => panic!("expected AsyncUnderSync, got {other:?}"),
        }
    }
}
