//! An algebraic-effects runtime: a stepwise effect interpreter with
//! handler composition, async suspension, and parallel interleaving.
//!
//! The central type is [`Computation`](computation::Computation) — an
//! immutable, replayable value built from [`builder::effect`] and
//! friends, composed with combinators like `map`/`flat_map`/`handle`,
//! and driven to completion with `run_sync`/`run_async`.

pub mod async_bridge;
pub mod builder;
pub mod computation;
pub mod config;
pub mod effect;
pub mod error;
mod runtime;
pub mod step;
pub mod value;

// Re-export the surface most callers need without reaching into
// submodules.
pub use async_bridge::effectify;
pub use builder::{define_handler_for, dependency, effect, effect_with_default, error as error_effect, HandlerFor};
pub use computation::{all, all_map, all_seq, all_seq_map, BodyResult, Computation, EffectCtx};
pub use effect::{EffectName, Matcher};
pub use error::EffectError;
pub use step::{InterruptLabel, Resumption, Step, Stepwise};
pub use value::{box_value, downcast, AnyValue};
