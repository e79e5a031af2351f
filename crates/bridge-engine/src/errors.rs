use bridge_chain::{L1Error, L2Error};
use bridge_store::StoreError;
use thiserror::Error;

/// Invariant violations that abort the process. Operational recovery
/// requires inspecting the tracking store directly; these are never
/// retried automatically.
#[derive(Debug, Error)]
pub enum FatalError {
    /// A record in `InProgress`/`Failed` was read back without a `nonce`.
    #[error("record {0} in a post-pending state has no nonce assigned")]
    MissingNonce(String),
    /// The single-writer reentrancy guard around deposit submission was
    /// violated.
    #[error("reentrant deposit submission detected")]
    ReentrantSubmission,
    /// A record was read back with a state value the state machine does
    /// not recognize.
    #[error("unexpected state value for record {0}")]
    UnexpectedState(String),
}

/// The top-level error type for the deposit and settlement engines.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The tracking store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The L1 chain client failed.
    #[error(transparent)]
    L1(#[from] L1Error),
    /// The L2 RPC client failed.
    #[error(transparent)]
    L2(#[from] L2Error),
    /// A bundle's instance array, hex payload, or withdraw array did not
    /// decode. Permanent for that one bundle: logged and skipped, not
    /// retried, per §8's "reportable error, bundle not advanced".
    #[error("failed to decode settlement bundle: {0}")]
    Decode(String),
    /// An invariant violation that must abort the process.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}
