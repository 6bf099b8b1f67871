//! External collaborator seams: tokens, the price oracle and the host clock.
//!
//! The engine owns no token or price logic. The host wires implementations
//! of these traits into [`crate::engine::Obol`] at construction /
//! `set_addresses` time; the engine only ever calls through them. All
//! implementations are expected to behave synchronously and without calling
//! back into the engine (the engine additionally carries a reentrancy flag).

use primitive_types::{H160, U256};

use crate::errors::{OracleError, TokenError};

/// An account or contract address. Vaults are keyed by `(AssetId, Address)`.
pub type Address = H160;

/// A collateral (or the oUSD) token address.
pub type AssetId = H160;

/// Engine-assigned vault handle, stable for the vault's lifetime and used as
/// the node key of the sorted redemption index. Zero is never assigned.
pub type VaultId = u64;

/// The fungible-token surface required of every collateral token.
///
/// `transfer_from` moves value between arbitrary accounts; implementations
/// must grant the engine operator rights over the accounts it manages (its
/// collateral vault account and the stability-pool account) and reject
/// anything else with [`TokenError::NotAuthorized`].
pub trait FungibleToken {
    /// Moves `amount` from the implementation's own account to `to`.
    fn transfer(&mut self, to: Address, amount: U256) -> Result<(), TokenError>;

    /// Moves `amount` from `from` to `to`.
    fn transfer_from(&mut self, from: Address, to: Address, amount: U256)
        -> Result<(), TokenError>;

    /// Current balance of `addr`.
    fn balance_of(&self, addr: Address) -> U256;
}

/// The oUSD surface: a fungible token whose supply the engine manages.
/// Mint and burn authority is the token's own whitelist concern; the engine
/// must be on it.
pub trait StableToken: FungibleToken {
    /// Mints `amount` to `to`.
    fn mint(&mut self, to: Address, amount: U256) -> Result<(), TokenError>;

    /// Burns `amount` held by `from`.
    fn burn(&mut self, from: Address, amount: U256) -> Result<(), TokenError>;
}

/// A single price feed per asset.
pub trait PriceOracle {
    /// Price of one whole unit of `asset` in oUSD, scaled to 1e18.
    /// Staleness and missing feeds surface as [`OracleError`].
    fn fetch_price(&self, asset: AssetId) -> Result<U256, OracleError>;
}

/// Monotonic wall-clock seconds supplied by the host. Interest accrual is
/// anchored to this clock; it must never go backwards.
pub trait Clock {
    fn now(&self) -> u64;
}
