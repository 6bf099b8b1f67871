//! Data structs shared across the engine's modules and its read surface.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::interfaces::{Address, AssetId};

/// One collateralized debt position. Exactly one may exist per
/// `(asset, owner)` pair.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Vault {
    /// The account the position belongs to.
    pub owner: Address,
    /// The collateral asset backing the position.
    pub asset: AssetId,
    /// Units of the collateral token held by the engine for this vault.
    pub collateral: U256,
    /// oUSD debt principal, inclusive of interest accrued up to `last_update`.
    pub debt: U256,
    /// The owner-chosen Minimum Collateral Ratio, 1e18 per percent
    /// (`110e18` == 110%). Drives both the liquidation threshold and the
    /// vault's interest rate.
    pub mcr: U256,
    /// Timestamp of the last interest-accrual application. Zero only for
    /// records that no longer exist.
    pub last_update: u64,
}

/// Per-collateral configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CollateralParams {
    /// Whether new debt may be taken against this collateral.
    pub active: bool,
    /// Token decimals, recorded for host-side adapters. Engine math assumes
    /// 18-decimal amounts.
    pub decimals: u8,
    /// Position in the engine's collateral registry, stable for the asset's
    /// lifetime. Keys the stability pool's per-asset error bucket.
    pub index: u32,
    /// Lower bound on the owner-chosen MCR, 1e18 per percent.
    pub min_range: U256,
    /// Upper bound on the owner-chosen MCR, 1e18 per percent.
    pub max_range: U256,
    /// Weight of the MCR inside the adjusted risk score, scaled 1e18.
    pub mcr_factor: U256,
    /// Per-annum interest rate charged at `mcr == max_range`, scaled 1e18.
    pub base_fee: U256,
    /// Per-annum interest rate charged at `mcr == min_range`, scaled 1e18.
    pub max_fee: U256,
    /// Smallest debt an active vault may carry.
    pub min_net_debt: U256,
    /// Upper bound on the summed debt of all vaults for this collateral.
    pub mint_cap: U256,
    /// Extra collateral fraction seized on liquidation, scaled 1e18 and
    /// capped at 30%.
    pub liquidation_penalty: U256,
}

/// One interest-mint beneficiary: `bps` ten-thousandths of every minted
/// interest batch go to `recipient`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MintRecipient {
    pub recipient: Address,
    pub bps: u16,
}

/// Global pause switches for the four operation classes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtocolStops {
    /// Stops `create_vault`.
    pub openings: bool,
    /// Stops vault adjustment, MCR changes, closing and ownership transfer.
    pub adjustments: bool,
    /// Stops `liquidate_vault`.
    pub liquidations: bool,
    /// Stops `redeem_vault`.
    pub redemptions: bool,
}

/// Snapshot view of one vault, as returned by the engine's getters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VaultInfoReturn {
    pub owner: Address,
    pub asset: AssetId,
    pub collateral: U256,
    pub debt: U256,
    pub mcr: U256,
    pub last_update: u64,
    /// Price-independent nominal collateral ratio (`U256::MAX` when the
    /// vault carries no debt).
    pub nominal_ratio: U256,
    /// The redemption-ordering key.
    pub adjusted_risk_score: U256,
}

/// Snapshot view of one collateral's configuration and aggregates.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CollateralInfoReturn {
    pub asset: AssetId,
    pub params: CollateralParams,
    /// Summed debt of all active vaults for this collateral.
    pub total_debt: U256,
    /// Summed collateral of all active vaults for this collateral.
    pub total_collateral: U256,
    /// Number of active vaults, equal to the sorted index size.
    pub vault_count: u64,
}

/// Snapshot view of the stability pool's compound-accounting state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StabilityPoolInfoReturn {
    /// oUSD currently deposited and not yet consumed by offsets.
    pub total_deposits: U256,
    /// The running product `P`, scaled 1e18.
    pub p: U256,
    /// Precision-rescaling counter.
    pub current_scale: u64,
    /// Pool-depletion counter.
    pub current_epoch: u64,
}
