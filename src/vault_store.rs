//! Vault records, per-collateral parameters and protocol aggregates.
//!
//! `VaultStore` is pure state plus the risk math derived from it: the
//! collateral ratio family (CR, NCR, ARS), the MCR-interpolated interest
//! rate curve, interest accrual, and the invariant check every mutation
//! must pass. It never talks to tokens, the oracle, the sorted index or
//! the stability pool; the engine coordinates those.

use std::collections::HashMap;

use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::interfaces::{Address, AssetId, VaultId};
use crate::math::{dec_pow, mul_div, NCR_SCALE, ONE, SECONDS_IN_YEAR};
use crate::shared_structs::{CollateralParams, Vault};

/// Lowest permitted `min_range`: a 100% MCR.
pub const MIN_RANGE_FLOOR: U256 = NCR_SCALE;

/// Highest permitted `max_fee`: 100% per annum.
pub const MAX_FEE_CEILING: U256 = ONE;

/// Hard cap on the liquidation penalty: 30%.
pub const MAX_LIQUIDATION_PENALTY: U256 = U256([300_000_000_000_000_000, 0, 0, 0]);

/// Hard cap on the redemption fee: 10%.
pub const MAX_REDEMPTION_FEE: U256 = U256([100_000_000_000_000_000, 0, 0, 0]);

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct VaultStore {
    vaults: HashMap<VaultId, Vault>,
    lookup: HashMap<(AssetId, Address), VaultId>,
    params: HashMap<AssetId, CollateralParams>,
    valid_collateral: Vec<AssetId>,
    vault_counter: u64,
    active_vaults: u64,
    total_protocol_debt: U256,
    total_accrued_debt: U256,
    last_recorded_accrued_debt: U256,
    total_debt: HashMap<AssetId, U256>,
    total_collateral: HashMap<AssetId, U256>,
    redemption_fee: U256,
}

impl VaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- collateral parameter management -------------------------------------

    /// Registers a collateral asset with zeroed, inactive parameters and
    /// assigns its registry index.
    pub fn add_collateral(&mut self, asset: AssetId, decimals: u8) -> Result<u32> {
        if self.params.contains_key(&asset) {
            return Err(EngineError::InvalidParameter("collateral already registered"));
        }
        let index = self.valid_collateral.len() as u32;
        self.valid_collateral.push(asset);
        self.params.insert(
            asset,
            CollateralParams {
                active: false,
                decimals,
                index,
                min_range: U256::zero(),
                max_range: U256::zero(),
                mcr_factor: U256::zero(),
                base_fee: U256::zero(),
                max_fee: U256::zero(),
                min_net_debt: U256::zero(),
                mint_cap: U256::zero(),
                liquidation_penalty: U256::zero(),
            },
        );
        self.total_debt.insert(asset, U256::zero());
        self.total_collateral.insert(asset, U256::zero());
        Ok(index)
    }

    /// Replaces every tunable parameter of a collateral in one call,
    /// enforcing all bounds. Does not change the active flag.
    #[allow(clippy::too_many_arguments)]
    pub fn set_parameters(
        &mut self,
        asset: AssetId,
        min_range: U256,
        max_range: U256,
        mcr_factor: U256,
        base_fee: U256,
        max_fee: U256,
        min_net_debt: U256,
        mint_cap: U256,
        liquidation_penalty: U256,
    ) -> Result<()> {
        if min_range < MIN_RANGE_FLOOR {
            return Err(EngineError::InvalidParameter("min_range below 100%"));
        }
        if max_range < min_range {
            return Err(EngineError::InvalidParameter("max_range below min_range"));
        }
        if base_fee > max_fee {
            return Err(EngineError::InvalidParameter("base fee above max fee"));
        }
        if max_fee > MAX_FEE_CEILING {
            return Err(EngineError::InvalidParameter("max fee above 100%"));
        }
        if liquidation_penalty > MAX_LIQUIDATION_PENALTY {
            return Err(EngineError::InvalidParameter("liquidation penalty above 30%"));
        }
        let params = self.params_mut(asset)?;
        params.min_range = min_range;
        params.max_range = max_range;
        params.mcr_factor = mcr_factor;
        params.base_fee = base_fee;
        params.max_fee = max_fee;
        params.min_net_debt = min_net_debt;
        params.mint_cap = mint_cap;
        params.liquidation_penalty = liquidation_penalty;
        Ok(())
    }

    pub fn set_min_range(&mut self, asset: AssetId, min_range: U256) -> Result<()> {
        if min_range < MIN_RANGE_FLOOR {
            return Err(EngineError::InvalidParameter("min_range below 100%"));
        }
        let params = self.params_mut(asset)?;
        if min_range > params.max_range {
            return Err(EngineError::InvalidParameter("min_range above max_range"));
        }
        params.min_range = min_range;
        Ok(())
    }

    pub fn set_max_fee(&mut self, asset: AssetId, max_fee: U256) -> Result<()> {
        if max_fee > MAX_FEE_CEILING {
            return Err(EngineError::InvalidParameter("max fee above 100%"));
        }
        let params = self.params_mut(asset)?;
        if max_fee < params.base_fee {
            return Err(EngineError::InvalidParameter("max fee below base fee"));
        }
        params.max_fee = max_fee;
        Ok(())
    }

    pub fn set_liquidation_penalty(&mut self, asset: AssetId, penalty: U256) -> Result<()> {
        if penalty > MAX_LIQUIDATION_PENALTY {
            return Err(EngineError::InvalidParameter("liquidation penalty above 30%"));
        }
        self.params_mut(asset)?.liquidation_penalty = penalty;
        Ok(())
    }

    pub fn set_is_active(&mut self, asset: AssetId, active: bool) -> Result<()> {
        self.params_mut(asset)?.active = active;
        Ok(())
    }

    pub fn set_redemption_fee(&mut self, fee: U256) -> Result<()> {
        if fee > MAX_REDEMPTION_FEE {
            return Err(EngineError::InvalidParameter("redemption fee above 10%"));
        }
        self.redemption_fee = fee;
        Ok(())
    }

    pub fn redemption_fee(&self) -> U256 {
        self.redemption_fee
    }

    pub fn params(&self, asset: AssetId) -> Result<&CollateralParams> {
        self.params.get(&asset).ok_or(EngineError::InvalidCollateral)
    }

    fn params_mut(&mut self, asset: AssetId) -> Result<&mut CollateralParams> {
        self.params.get_mut(&asset).ok_or(EngineError::InvalidCollateral)
    }

    pub fn valid_collateral(&self) -> &[AssetId] {
        &self.valid_collateral
    }

    // -- vault records --------------------------------------------------------

    pub fn vault_id(&self, asset: AssetId, owner: Address) -> Option<VaultId> {
        self.lookup.get(&(asset, owner)).copied()
    }

    /// The record behind `id`.
    ///
    /// # Panics
    /// Panics on an unknown id; ids are handed out by this store and
    /// invalidated on removal, so a miss is an engine bug.
    pub fn vault(&self, id: VaultId) -> &Vault {
        self.vaults.get(&id).expect("vault record missing")
    }

    fn vault_mut(&mut self, id: VaultId) -> &mut Vault {
        self.vaults.get_mut(&id).expect("vault record missing")
    }

    /// Writes a fresh record and indexes it, returning its allocated id.
    /// Aggregates are the caller's to update.
    pub fn create_record(&mut self, vault: Vault) -> VaultId {
        debug_assert!(self.vault_id(vault.asset, vault.owner).is_none());
        self.vault_counter += 1;
        let id = self.vault_counter;
        self.lookup.insert((vault.asset, vault.owner), id);
        self.vaults.insert(id, vault);
        self.active_vaults += 1;
        id
    }

    /// Clears a record entirely; the `(asset, owner)` slot becomes free.
    pub fn remove_record(&mut self, id: VaultId) {
        let vault = self.vaults.remove(&id).expect("vault record missing");
        self.lookup.remove(&(vault.asset, vault.owner));
        self.active_vaults -= 1;
    }

    /// Rewrites a vault's collateral and debt in place.
    pub fn update_record(&mut self, id: VaultId, collateral: U256, debt: U256) {
        let vault = self.vault_mut(id);
        vault.collateral = collateral;
        vault.debt = debt;
    }

    pub fn update_record_mcr(&mut self, id: VaultId, mcr: U256) {
        self.vault_mut(id).mcr = mcr;
    }

    /// Moves a record to a new owner, keeping everything else verbatim.
    pub fn transfer_record(&mut self, id: VaultId, recipient: Address) {
        let vault = self.vault_mut(id);
        let asset = vault.asset;
        let previous = vault.owner;
        vault.owner = recipient;
        self.lookup.remove(&(asset, previous));
        self.lookup.insert((asset, recipient), id);
    }

    // -- aggregates -----------------------------------------------------------

    pub fn active_vaults(&self) -> u64 {
        self.active_vaults
    }

    pub fn total_debt(&self, asset: AssetId) -> U256 {
        self.total_debt.get(&asset).copied().unwrap_or_default()
    }

    pub fn total_collateral(&self, asset: AssetId) -> U256 {
        self.total_collateral.get(&asset).copied().unwrap_or_default()
    }

    pub fn total_protocol_debt(&self) -> U256 {
        self.total_protocol_debt
    }

    pub fn total_accrued_debt(&self) -> U256 {
        self.total_accrued_debt
    }

    pub fn last_recorded_accrued_debt(&self) -> U256 {
        self.last_recorded_accrued_debt
    }

    pub fn set_last_recorded_accrued_debt(&mut self, value: U256) {
        self.last_recorded_accrued_debt = value;
    }

    /// Adds newly minted debt to the per-asset and protocol totals.
    pub fn add_debt(&mut self, asset: AssetId, amount: U256) {
        *self.total_debt.entry(asset).or_default() += amount;
        self.total_protocol_debt += amount;
    }

    /// Removes repaid, offset or redeemed debt from the totals.
    pub fn remove_debt(&mut self, asset: AssetId, amount: U256) {
        let entry = self.total_debt.entry(asset).or_default();
        *entry -= amount;
        self.total_protocol_debt -= amount;
    }

    pub fn add_collateral_amount(&mut self, asset: AssetId, amount: U256) {
        *self.total_collateral.entry(asset).or_default() += amount;
    }

    pub fn remove_collateral_amount(&mut self, asset: AssetId, amount: U256) {
        *self.total_collateral.entry(asset).or_default() -= amount;
    }

    /// Verifies the collateral's mint cap against its current total debt.
    pub fn ensure_mint_cap(&self, asset: AssetId, prospective_debt_added: U256) -> Result<()> {
        let cap = self.params(asset)?.mint_cap;
        if self.total_debt(asset) + prospective_debt_added > cap {
            return Err(EngineError::MintCapExceeded);
        }
        Ok(())
    }

    // -- interest accrual -----------------------------------------------------

    /// Applies compound interest to the vault of `(asset, owner)` up to
    /// `now` and re-anchors it, returning `(collateral, debt, mcr)`.
    ///
    /// Returns zeros without writing anything when no vault exists; callers
    /// use that as the existence probe. Accrued interest feeds the per-asset
    /// total, the protocol total and the accrued-interest ledger. Calling
    /// twice at the same timestamp is a no-op after the first.
    pub fn accrue_interest(
        &mut self,
        asset: AssetId,
        owner: Address,
        now: u64,
    ) -> Result<(U256, U256, U256)> {
        let params = self.params(asset)?.clone();
        let Some(id) = self.vault_id(asset, owner) else {
            return Ok((U256::zero(), U256::zero(), U256::zero()));
        };

        let accrued = {
            let vault = self.vaults.get_mut(&id).expect("vault record missing");
            let elapsed = now.saturating_sub(vault.last_update);
            let mut accrued = U256::zero();
            if elapsed > 0 && !vault.debt.is_zero() {
                let rate = interest_rate(vault.mcr, &params);
                let per_second = ONE + rate / U256::from(SECONDS_IN_YEAR);
                let factor = dec_pow(per_second, elapsed);
                let new_debt = mul_div(vault.debt, factor, ONE);
                accrued = new_debt - vault.debt;
                vault.debt = new_debt;
            }
            vault.last_update = now;
            accrued
        };

        if !accrued.is_zero() {
            self.total_accrued_debt += accrued;
            self.add_debt(asset, accrued);
        }

        let vault = self.vault(id);
        Ok((vault.collateral, vault.debt, vault.mcr))
    }

    // -- risk math ------------------------------------------------------------

    /// The adjusted risk score of a listed vault, used as the sorted-index
    /// ordering oracle.
    pub fn ars_by_id(&self, id: VaultId) -> U256 {
        let vault = self.vault(id);
        let params = self.params.get(&vault.asset).expect("collateral params missing");
        adjusted_risk_score(vault.collateral, vault.debt, vault.mcr, params)
    }

    /// Validates the full per-vault invariant: active collateral, MCR inside
    /// its range, CR strictly above the MCR, debt at least the minimum.
    pub fn check_vault_state(
        &self,
        vault: &Vault,
        params: &CollateralParams,
        price: U256,
    ) -> Result<()> {
        if !params.active {
            return Err(EngineError::InactiveCollateral);
        }
        if vault.mcr < params.min_range || vault.mcr > params.max_range {
            return Err(EngineError::InvalidMcr);
        }
        if vault.debt < params.min_net_debt {
            return Err(EngineError::VaultBelowMinDebt);
        }
        if current_ratio(vault.collateral, vault.debt, price) <= vault.mcr {
            return Err(EngineError::VaultBelowMcr);
        }
        Ok(())
    }
}

/// Current collateral ratio `collateral * price * 100 / debt`, scaled so
/// `110e18` reads as 110%. A zero-debt vault is infinitely collateralized.
pub fn current_ratio(collateral: U256, debt: U256, price: U256) -> U256 {
    if debt.is_zero() {
        return U256::MAX;
    }
    let wide = collateral.full_mul(price) * U512::from(100u64) / U512::from(debt);
    U256::try_from(wide).expect("collateral ratio exceeds 256 bits")
}

/// Nominal (price-independent) collateral ratio `collateral * 1e20 / debt`.
pub fn nominal_ratio(collateral: U256, debt: U256) -> U256 {
    if debt.is_zero() {
        return U256::MAX;
    }
    mul_div(collateral, NCR_SCALE, debt)
}

/// The redemption-ordering key: NCR plus the MCR contribution, so that of
/// two equally collateralized vaults the higher-MCR one sorts closer to the
/// head and the riskier one is redeemed first.
pub fn adjusted_risk_score(
    collateral: U256,
    debt: U256,
    mcr: U256,
    params: &CollateralParams,
) -> U256 {
    let ncr = nominal_ratio(collateral, debt);
    if ncr == U256::MAX || params.mcr_factor.is_zero() {
        return ncr;
    }
    ncr.saturating_add(mul_div(params.mcr_factor, mcr, ONE))
}

/// Per-annum interest rate for a vault, linear in the chosen MCR between
/// the collateral's fee endpoints: the maximum fee at `min_range`, the base
/// fee at `max_range` and above.
pub fn interest_rate(mcr: U256, params: &CollateralParams) -> U256 {
    if mcr.is_zero() {
        return U256::zero();
    }
    if mcr >= params.max_range {
        return params.base_fee;
    }
    if mcr <= params.min_range {
        return params.max_fee;
    }
    let slope = mul_div(params.max_fee - params.base_fee, ONE, params.max_range - params.min_range);
    params.base_fee + mul_div(slope, params.max_range - mcr, ONE)
}
