//! The external factory contract (spec §4.7).
//!
//! The factory is the pool's only collaborator for producing, checking,
//! and disposing of instances. It is invoked outside the pool's locks
//! wherever feasible (spec §5) so a slow or misbehaving factory cannot
//! stall unrelated pool operations.

use async_trait::async_trait;

/// Why a factory's `destroy` is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    /// Ordinary invalidation by the caller or a failed return-time check.
    Normal,
    /// Reclaimed by the abandonment detector.
    Abandoned,
    /// Removed by an eviction sweep.
    Eviction,
    /// Failed `validate` (on borrow, return, or during eviction).
    ValidationFailed,
    /// Failed `passivate` on return.
    PassivationFailed,
}

impl std::fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Abandoned => "abandoned",
            Self::Eviction => "eviction",
            Self::ValidationFailed => "validation_failed",
            Self::PassivationFailed => "passivation_failed",
        };
        f.write_str(s)
    }
}

/// External factory contract: create, destroy, validate, activate, passivate.
///
/// Every method may fail. `validate` MUST NOT mutate `item` — it is a pure
/// health check the pool may call at several points in the lifecycle.
#[async_trait]
pub trait Factory: Send + Sync + 'static {
    /// The pooled item type.
    type Item: Send + 'static;
    /// The error type surfaced to callers as [`crate::PoolError::Factory`].
    type Error: std::error::Error + Send + Sync + 'static;

    /// Produce a fresh instance.
    async fn create(&self) -> Result<Self::Item, Self::Error>;

    /// Permanently dispose of an instance. Errors are always swallowed by
    /// the pool (logged, never propagated) because reclamation must not
    /// be blocked by factory misbehaviour (spec §4.3.3, §7).
    async fn destroy(&self, item: Self::Item, reason: DestroyReason) -> Result<(), Self::Error>;

    /// Pure validity check; must not mutate `item`. Default: always valid.
    async fn validate(&self, _item: &Self::Item) -> bool {
        true
    }

    /// Called on the `Idle -> Allocated` transition, before validation.
    /// Default: no-op.
    async fn activate(&self, _item: &mut Self::Item) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called on the `Allocated -> Idle` transition, after the caller is
    /// done. Default: no-op.
    async fn passivate(&self, _item: &mut Self::Item) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Swallow a factory destroy error, logging it rather than propagating —
/// the shared discipline named in spec §4.3.3, §4.4 and §4.5: eviction and
/// abandonment sweeps must never abort because one record's factory call
/// misbehaved.
pub(crate) async fn destroy_swallowing_errors<F: Factory>(
    factory: &F,
    item: F::Item,
    reason: DestroyReason,
) {
    if let Err(_err) = factory.destroy(item, reason).await {
        #[cfg(feature = "tracing")]
        tracing::warn!(%reason, error = %_err, "factory destroy failed; swallowing");
    }
}
