//! Error types surfaced by the Obol engine.
//!
//! Every failed operation aborts with exactly one [`EngineError`] kind and
//! commits nothing (interest accrual excepted, see `engine`). Errors are
//! never caught or retried internally; they propagate to the caller verbatim.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = core::result::Result<T, EngineError>;

/// Failure reported by a token implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The debited account does not hold the requested amount.
    #[error("insufficient token balance")]
    InsufficientBalance,
    /// The caller is not on the token's mint/burn whitelist or lacks
    /// operator rights over the debited account.
    #[error("token operation not authorized")]
    NotAuthorized,
    /// Any other token-side failure.
    #[error("token call failed: {0}")]
    Other(String),
}

/// Failure reported by the price oracle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The feed has no usable price for the asset.
    #[error("no price feed for asset")]
    Unavailable,
    /// The freshest price is older than the feed tolerates.
    #[error("price feed is stale")]
    Stale,
}

/// Errors that can abort an engine operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No active vault exists for the (collateral, owner) pair.
    #[error("vault not found")]
    VaultNotFound,

    /// An active vault already exists where none may.
    #[error("vault already exists")]
    VaultAlreadyExists,

    /// The operation would leave the vault at or below its chosen MCR.
    #[error("vault collateral ratio at or below its MCR")]
    VaultBelowMcr,

    /// The operation would leave the vault below the collateral's minimum
    /// net debt.
    #[error("vault debt below the collateral minimum")]
    VaultBelowMinDebt,

    /// The collateral's total debt would exceed its mint cap.
    #[error("collateral mint cap exceeded")]
    MintCapExceeded,

    /// The chosen MCR is outside the collateral's permitted range.
    #[error("chosen MCR outside the permitted range")]
    InvalidMcr,

    /// The collateral asset is not registered with the engine.
    #[error("unknown collateral asset")]
    InvalidCollateral,

    /// The collateral asset is registered but not currently accepted.
    #[error("collateral asset is not active")]
    InactiveCollateral,

    /// A parameter or argument violates its bound. The message names the
    /// violated constraint.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Redemption was requested against a collateral with no active vaults.
    #[error("no vaults to redeem against")]
    NoVaultsToRedeem,

    /// Liquidation requires a non-empty stability pool.
    #[error("stability pool is empty")]
    StabilityPoolEmpty,

    /// Withdrawal from the stability pool without a prior deposit.
    #[error("no stability pool deposit for this account")]
    InsufficientDeposit,

    /// A required amount was zero.
    #[error("amount must be non-zero")]
    ZeroAmount,

    /// The stability-pool asset list is not strictly ascending.
    #[error("asset list must be strictly ascending")]
    ArrayNotAscending,

    /// The price oracle failed; the whole operation aborts.
    #[error("oracle failure: {0}")]
    OracleFailure(#[from] OracleError),

    /// A token transfer, mint or burn failed; the whole operation aborts.
    #[error("token transfer failed: {0}")]
    TokenTransferFailed(#[from] TokenError),

    /// A user-facing mutator was re-entered mid-operation.
    #[error("reentrancy blocked")]
    ReentrancyBlocked,

    /// The caller lacks the owner capability required by this operation.
    #[error("caller is not authorized")]
    NotAuthorized,

    /// The engine's external addresses have not been wired yet.
    #[error("engine not initialized")]
    NotInitialized,
}
