//! Events emitted by the Obol engine.
//!
//! Every committed state transition pushes one event into the engine's
//! buffer (drained by the host via `drain_events`) and mirrors it to the
//! `log` facade at debug level.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::interfaces::{Address, AssetId, VaultId};

/// Event emitted when a new vault is opened.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventNewVault {
    pub owner: Address,
    pub asset: AssetId,
    pub vault_id: VaultId,
    pub collateral: U256,
    pub debt: U256,
    pub mcr: U256,
}

/// Event emitted when an existing vault changes shape: collateral or debt
/// adjusted, MCR re-chosen, or a partial redemption/liquidation touch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventUpdateVault {
    pub owner: Address,
    pub asset: AssetId,
    pub vault_id: VaultId,
    pub collateral: U256,
    pub debt: U256,
    pub mcr: U256,
}

/// Event emitted when a vault is fully repaid and closed by its owner.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventCloseVault {
    pub owner: Address,
    pub asset: AssetId,
    pub vault_id: VaultId,
}

/// Event emitted when a vault record moves to a new owner.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventTransferVault {
    pub asset: AssetId,
    pub vault_id: VaultId,
    pub from: Address,
    pub to: Address,
}

/// Event emitted when a vault is liquidated against the stability pool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventLiquidateVault {
    pub owner: Address,
    pub asset: AssetId,
    pub vault_id: VaultId,
    /// Debt cancelled against the pool.
    pub debt_offset: U256,
    /// Collateral handed to the pool, penalty included.
    pub collateral_to_pool: U256,
    /// Collateral returned to the owner (full liquidations only).
    pub surplus: U256,
    /// Whether the vault was fully liquidated and removed.
    pub full: bool,
}

/// Event emitted once per redemption call, after the tail-first walk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventRedeemVaults {
    pub asset: AssetId,
    pub redeemer: Address,
    /// oUSD burned from the redeemer.
    pub debt_redeemed: U256,
    /// Collateral paid to the redeemer, net of the redemption fee.
    pub collateral_redeemed: U256,
    /// Number of vaults touched by the walk.
    pub vaults_touched: u32,
}

/// Event emitted when `update_vault_interest` applies accrued interest.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventAccrueInterest {
    pub owner: Address,
    pub asset: AssetId,
    pub accrued: U256,
    pub new_debt: U256,
}

/// Event emitted when accrued interest is minted out to the recipients.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventMintInterest {
    /// The newly recorded accrued-interest delta.
    pub minted: U256,
    /// Portion delivered to the default recipient (zero when unset; the
    /// shortfall is then retained unminted).
    pub to_default: U256,
}

/// Event emitted when a collateral asset is registered.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventAddCollateral {
    pub asset: AssetId,
    pub decimals: u8,
    pub index: u32,
}

/// Event emitted when a collateral's parameters change.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventChangeCollateral {
    pub asset: AssetId,
}

/// Event emitted when an account contributes oUSD to the stability pool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventStabilityContribution {
    pub depositor: Address,
    pub amount: U256,
    /// Collateral gains paid out alongside the deposit, per asset.
    pub gains: Vec<(AssetId, U256)>,
}

/// Event emitted when an account withdraws from the stability pool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventStabilityWithdrawal {
    pub depositor: Address,
    /// oUSD returned (min of the request and the compounded deposit).
    pub amount: U256,
    pub gains: Vec<(AssetId, U256)>,
}

/// Event emitted when liquidated debt is offset against the pool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EventDebtOffset {
    pub asset: AssetId,
    pub debt_offset: U256,
    pub collateral_added: U256,
    pub epoch: u64,
    pub scale: u64,
}

/// Every event the engine can record, in commit order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    NewVault(EventNewVault),
    UpdateVault(EventUpdateVault),
    CloseVault(EventCloseVault),
    TransferVault(EventTransferVault),
    LiquidateVault(EventLiquidateVault),
    RedeemVaults(EventRedeemVaults),
    AccrueInterest(EventAccrueInterest),
    MintInterest(EventMintInterest),
    AddCollateral(EventAddCollateral),
    ChangeCollateral(EventChangeCollateral),
    StabilityContribution(EventStabilityContribution),
    StabilityWithdrawal(EventStabilityWithdrawal),
    DebtOffset(EventDebtOffset),
}
