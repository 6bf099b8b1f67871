//! # Obol Protocol Crate
//!
//! This crate contains the core engine of the Obol protocol, a decentralized
//! borrowing protocol that allows users to mint the oUSD stablecoin by
//! depositing collateral into Collateralized Debt Positions (vaults).
//!
//! The primary goal is to provide a stablecoin pegged to the US Dollar,
//! generated in a decentralized manner. Each vault owner chooses their own
//! Minimum Collateral Ratio inside the collateral's permitted range; riskier
//! choices pay a higher interest rate and are redeemed against first.
//!
//! ## Modules
//!
//! The crate is organized into the following modules:
//!
//! - `engine`: Defines [`engine::Obol`], the orchestrator that manages vault
//!   lifecycle, oUSD minting/burning, liquidations, redemptions, interest
//!   accrual and distribution, the stability-pool entry points, and the
//!   owner-gated admin surface. This is the heart of the protocol's logic.
//! - `vault_store`: Pure vault and parameter state plus the risk math —
//!   collateral ratios, the adjusted risk score, the MCR-priced interest
//!   curve, and the per-vault invariant check.
//! - `sorted_index`: The per-collateral redemption ordering — a hint-based
//!   doubly-linked list of vault ids over an arena, ordered by descending
//!   adjusted risk score.
//! - `stability_pool`: Pools of oUSD contributed by users, the first line of
//!   defense in absorbing debt during liquidations. Uses product/sum
//!   snapshots so each liquidation is O(1) regardless of depositor count.
//! - `interfaces`: The external collaborator seams — fungible-token, oUSD,
//!   price-oracle and clock traits wired in by the host.
//! - `shared_structs`: Data structures shared across modules, such as
//!   [`shared_structs::Vault`] and [`shared_structs::CollateralParams`].
//! - `events`: Typed events recorded by the engine for every committed
//!   state transition, allowing hosts to track state changes.
//! - `errors`: One distinct abort kind per failure mode.
//! - `math`: 1e18 fixed-point arithmetic on 256-bit integers.

pub mod engine;
pub mod errors;
pub mod events;
pub mod interfaces;
pub mod math;
pub mod shared_structs;
pub mod sorted_index;
pub mod stability_pool;
pub mod vault_store;

pub use engine::Obol;
pub use errors::{EngineError, OracleError, Result, TokenError};
pub use interfaces::{Address, AssetId, Clock, FungibleToken, PriceOracle, StableToken, VaultId};
