use thiserror::Error;

/// Errors from the L1 chain client. All variants are transient per the
/// bridging engine's failure taxonomy: callers retry with bounded attempts
/// and fall back to `failed`/skip-and-continue semantics, never abort.
#[derive(Debug, Error)]
pub enum L1Error {
    /// The underlying JSON-RPC transport failed.
    #[error("L1 transport error: {0}")]
    Transport(String),
    /// `eth_getLogs` failed for a requested block range.
    #[error("L1 getLogs failed for range {from}..={to}: {source}")]
    GetLogs {
        /// Inclusive start of the requested range.
        from: u64,
        /// Inclusive end of the requested range.
        to: u64,
        /// Underlying transport error.
        #[source]
        source: Box<L1Error>,
    },
    /// A log matched the `TopUp` topic but its data did not decode to the
    /// expected event shape. Permanent for that one log: skipped, not
    /// retried.
    #[error("failed to decode TopUp event in tx {tx_hash}: {reason}")]
    DecodeEvent {
        /// Transaction hash of the offending log.
        tx_hash: String,
        /// Human-readable decode failure.
        reason: String,
    },
    /// `allTokens()` could not be read from the settlement contract.
    #[error("failed to read token list: {0}")]
    TokenList(String),
    /// Submitting or awaiting a settlement transaction failed.
    #[error("settlement submission failed: {0}")]
    Settlement(String),
}

/// Errors from the L2 application RPC client.
#[derive(Debug, Error)]
pub enum L2Error {
    /// The HTTP transport failed or returned a non-2xx status.
    #[error("L2 transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body did not parse as the expected JSON shape.
    #[error("L2 response decode error: {0}")]
    Decode(String),
    /// The L2 application returned an application-level error payload.
    #[error("L2 RPC error: {0}")]
    Rpc(String),
}
