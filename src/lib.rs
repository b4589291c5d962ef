#![allow(clippy::excessive_nesting)]

//! # nebula-pool
//!
//! A generic, in-process object pool: a borrow/return state machine, idle
//! eviction, abandoned-borrow detection, and a keyed multiplexer over a
//! dynamic set of per-key sub-pools.
//!
//! The primary entry points are [`SinglePool`] (one factory, one set of
//! tunables) and [`KeyedPool`] (a dynamic map of sub-pools sharing a
//! global cap). Both are built around the [`Factory`] trait, which is the
//! only thing a caller needs to implement.

mod abandoned;
pub mod config;
pub mod counters;
pub mod error;
pub mod events;
pub mod eviction;
pub mod factory;
pub mod guard;
pub mod idle;
pub mod keyed;
pub mod log_writer;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod record;
pub mod single;

pub use config::{Cap, ExhaustedAction, KeyedPoolConfig, Ordering, PoolConfig, PoolConfigBuilder};
pub use counters::{CounterSnapshot, Counters};
pub use error::{FieldViolation, PoolError, PoolResult};
pub use events::{EventBus, PoolEvent};
pub use eviction::EvictionRunner;
pub use factory::{DestroyReason, Factory};
pub use guard::BorrowGuard;
pub use idle::{DequeIdleStore, IdleStore, MemoryPressureOracle, WeakIdleStore};
pub use keyed::KeyedPool;
pub use log_writer::{format_abandonment_record, LogWriter, TracingLogWriter};
pub use record::{PooledObject, State};
pub use single::SinglePool;
