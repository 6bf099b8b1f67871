//! # The Obol core engine
//!
//! `Obol` is the protocol orchestrator. It owns the vault records
//! ([`VaultStore`]), the per-collateral redemption ordering
//! ([`SortedIndex`]) and the stability pool ledger ([`StabilityPool`]),
//! and coordinates them with the external collaborators (the oUSD token,
//! the collateral tokens, the price oracle and the host clock) behind the
//! traits in [`crate::interfaces`].
//!
//! ## Overview
//! Users interact with the engine to manage their loans:
//! - **Open a vault:** deposit accepted collateral, choose an MCR inside
//!   the collateral's permitted range, and mint oUSD (`create_vault`).
//!   The chosen MCR is both the liquidation threshold and the interest
//!   price: lower MCRs pay a higher per-annum rate.
//! - **Manage a vault:** add or withdraw collateral and mint or repay debt
//!   (`adjust_vault`), re-choose the MCR (`adjust_vault_mcr`), or hand the
//!   whole position to another account (`transfer_vault_ownership`).
//! - **Close a vault:** repay the full debt and retrieve the collateral
//!   (`close_vault`).
//! - **Liquidation:** a vault whose collateral ratio falls below its MCR is
//!   liquidated against the stability pool (`liquidate_vault`); depositors
//!   absorb the debt and receive the collateral plus the penalty.
//! - **Redemption:** oUSD trades for collateral at the oracle price, minus
//!   a fee, draining the riskiest (lowest ARS) vaults first
//!   (`redeem_vault`).
//! - **Interest:** debt compounds continuously per vault; every entry point
//!   settles interest first, and `mint_vaults_interest` distributes the
//!   accrued amount to the configured recipients.
//!
//! ## Execution model
//! The engine is single-threaded and non-reentrant: every public operation
//! either commits fully or aborts with one [`EngineError`] (interest
//! settlement, an independent transition, may commit first). Mutators run
//! under a reentrancy flag and follow a strict phase order — checks, then
//! caller-funded token pulls, then state commit, then engine-funded pushes
//! — so a failed pull aborts before any state is written.

use std::collections::HashMap;

use primitive_types::U256;

use crate::errors::{EngineError, Result};
use crate::events::*;
use crate::interfaces::{Address, AssetId, Clock, FungibleToken, PriceOracle, StableToken, VaultId};
use crate::math::{mul_div, ONE};
use crate::shared_structs::{
    CollateralInfoReturn, MintRecipient, ProtocolStops, StabilityPoolInfoReturn, Vault,
    VaultInfoReturn,
};
use crate::sorted_index::SortedIndex;
use crate::stability_pool::StabilityPool;
use crate::vault_store::{adjusted_risk_score, current_ratio, nominal_ratio, VaultStore};

/// Sum of mint-recipient shares may not exceed this.
const BPS_DENOMINATOR: u64 = 10_000;

/// One planned touch of the tail-first redemption walk.
struct RedemptionStep {
    id: VaultId,
    owner: Address,
    to_redeem: U256,
    coll_out: U256,
    /// Collateral pushed back to the owner when the vault drains.
    surplus: U256,
    drains: bool,
}

/// The Obol protocol engine. See the module docs for the operation surface.
pub struct Obol {
    store: VaultStore,
    index: SortedIndex,
    pool: StabilityPool,
    stable: Option<Box<dyn StableToken>>,
    oracle: Option<Box<dyn PriceOracle>>,
    collateral_tokens: HashMap<AssetId, Box<dyn FungibleToken>>,
    clock: Box<dyn Clock>,
    owner: Address,
    engine_address: Address,
    pool_address: Address,
    treasury: Option<Address>,
    mint_recipients: Vec<MintRecipient>,
    default_interest_recipient: Option<Address>,
    stops: ProtocolStops,
    entered: bool,
    events: Vec<Event>,
}

impl Obol {
    /// Builds an engine with no external addresses wired yet. Every
    /// user-facing operation fails with [`EngineError::NotInitialized`]
    /// until the owner calls [`Obol::set_addresses`] exactly once.
    ///
    /// `engine_address` is the account at which the engine holds active
    /// collateral; `pool_address` holds the stability pool's oUSD and its
    /// liquidation proceeds. The token implementations must grant the
    /// engine operator rights over both.
    pub fn new(
        owner: Address,
        engine_address: Address,
        pool_address: Address,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            store: VaultStore::new(),
            index: SortedIndex::new(),
            pool: StabilityPool::new(),
            stable: None,
            oracle: None,
            collateral_tokens: HashMap::new(),
            clock,
            owner,
            engine_address,
            pool_address,
            treasury: None,
            mint_recipients: vec![],
            default_interest_recipient: None,
            stops: ProtocolStops::default(),
            entered: false,
            events: vec![],
        }
    }

    // ------------------------------------------------------------------
    // Admin surface (owner-gated)
    // ------------------------------------------------------------------

    /// One-shot wiring of the external collaborators.
    ///
    /// # Errors
    /// `NotAuthorized` unless `caller` is the owner; `InvalidParameter`
    /// when called a second time.
    pub fn set_addresses(
        &mut self,
        caller: Address,
        stable: Box<dyn StableToken>,
        oracle: Box<dyn PriceOracle>,
        treasury: Address,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        if self.stable.is_some() {
            return Err(EngineError::InvalidParameter("addresses already set"));
        }
        self.stable = Some(stable);
        self.oracle = Some(oracle);
        self.treasury = Some(treasury);
        Ok(())
    }

    /// Registers a collateral asset and its token handle. The asset starts
    /// inactive with zeroed parameters; configure it with
    /// [`Obol::set_collateral_parameters`] and activate it with
    /// [`Obol::set_is_active`].
    pub fn add_new_collateral(
        &mut self,
        caller: Address,
        asset: AssetId,
        decimals: u8,
        token: Box<dyn FungibleToken>,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        self.ensure_initialized()?;
        let index = self.store.add_collateral(asset, decimals)?;
        self.pool.register_asset(asset, index);
        self.collateral_tokens.insert(asset, token);
        self.emit(Event::AddCollateral(EventAddCollateral { asset, decimals, index }));
        Ok(())
    }

    /// Sets every tunable parameter of a collateral in one call. Bounds:
    /// `min_range >= 100%`, `max_range >= min_range`,
    /// `base_fee <= max_fee <= 100%`, `liquidation_penalty <= 30%`.
    #[allow(clippy::too_many_arguments)]
    pub fn set_collateral_parameters(
        &mut self,
        caller: Address,
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
        self.ensure_owner(caller)?;
        self.store.set_parameters(
            asset,
            min_range,
            max_range,
            mcr_factor,
            base_fee,
            max_fee,
            min_net_debt,
            mint_cap,
            liquidation_penalty,
        )?;
        self.emit(Event::ChangeCollateral(EventChangeCollateral { asset }));
        Ok(())
    }

    pub fn set_min_range(&mut self, caller: Address, asset: AssetId, min_range: U256) -> Result<()> {
        self.ensure_owner(caller)?;
        self.store.set_min_range(asset, min_range)?;
        self.emit(Event::ChangeCollateral(EventChangeCollateral { asset }));
        Ok(())
    }

    pub fn set_max_fee(&mut self, caller: Address, asset: AssetId, max_fee: U256) -> Result<()> {
        self.ensure_owner(caller)?;
        self.store.set_max_fee(asset, max_fee)?;
        self.emit(Event::ChangeCollateral(EventChangeCollateral { asset }));
        Ok(())
    }

    pub fn set_liquidation_penalty(
        &mut self,
        caller: Address,
        asset: AssetId,
        penalty: U256,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        self.store.set_liquidation_penalty(asset, penalty)?;
        self.emit(Event::ChangeCollateral(EventChangeCollateral { asset }));
        Ok(())
    }

    pub fn set_is_active(&mut self, caller: Address, asset: AssetId, active: bool) -> Result<()> {
        self.ensure_owner(caller)?;
        self.store.set_is_active(asset, active)?;
        self.emit(Event::ChangeCollateral(EventChangeCollateral { asset }));
        Ok(())
    }

    /// Sets the flat redemption fee, capped at 10%.
    pub fn set_redemption_fee(&mut self, caller: Address, fee: U256) -> Result<()> {
        self.ensure_owner(caller)?;
        self.store.set_redemption_fee(fee)
    }

    /// Configures the interest-mint beneficiaries. Shares are in basis
    /// points and may sum to less than 10000; the shortfall goes to the
    /// default recipient (or stays unminted).
    pub fn set_mint_recipients(
        &mut self,
        caller: Address,
        recipients: Vec<MintRecipient>,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        let total: u64 = recipients.iter().map(|r| r.bps as u64).sum();
        if total > BPS_DENOMINATOR {
            return Err(EngineError::InvalidParameter("mint recipient shares above 100%"));
        }
        self.mint_recipients = recipients;
        Ok(())
    }

    pub fn set_default_interest_recipient(
        &mut self,
        caller: Address,
        recipient: Option<Address>,
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        self.default_interest_recipient = recipient;
        Ok(())
    }

    /// Pauses or resumes whole operation classes.
    pub fn set_stops(&mut self, caller: Address, stops: ProtocolStops) -> Result<()> {
        self.ensure_owner(caller)?;
        self.stops = stops;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Vault operations
    // ------------------------------------------------------------------

    /// Opens a vault for `(asset, caller)`, pulling `collateral_amount` of
    /// the collateral token from the caller and minting `debt_amount` oUSD
    /// to them.
    ///
    /// `(prev_hint, next_hint)` are optional neighbor vault ids for the
    /// sorted-index insertion; stale or absent hints only cost a walk.
    ///
    /// # Errors
    /// * `VaultAlreadyExists` — the caller already has a vault for `asset`.
    /// * `ZeroAmount` — zero collateral or debt requested.
    /// * `InactiveCollateral`, `InvalidMcr`, `VaultBelowMinDebt`,
    ///   `VaultBelowMcr` — the opening state violates the vault invariant.
    /// * `MintCapExceeded` — the collateral's total debt would pass its cap.
    /// * `OracleFailure`, `TokenTransferFailed` — collaborator failures.
    ///
    /// # Logic
    /// 1. Validate amounts and the absence of an existing vault.
    /// 2. Fetch the price and check the full vault invariant and mint cap.
    /// 3. Pull the collateral from the caller.
    /// 4. Write the record, update aggregates, insert into the index at the
    ///    fresh ARS.
    /// 5. Mint the debt to the caller.
    pub fn create_vault(
        &mut self,
        caller: Address,
        asset: AssetId,
        collateral_amount: U256,
        debt_amount: U256,
        mcr: U256,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
    ) -> Result<VaultId> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if engine.stops.openings {
                return Err(EngineError::InvalidParameter("vault openings are stopped"));
            }
            if collateral_amount.is_zero() || debt_amount.is_zero() {
                return Err(EngineError::ZeroAmount);
            }
            let params = engine.store.params(asset)?.clone();
            if engine.store.vault_id(asset, caller).is_some() {
                return Err(EngineError::VaultAlreadyExists);
            }

            let price = engine.price(asset)?;
            let vault = Vault {
                owner: caller,
                asset,
                collateral: collateral_amount,
                debt: debt_amount,
                mcr,
                last_update: engine.clock.now(),
            };
            engine.store.check_vault_state(&vault, &params, price)?;
            engine.store.ensure_mint_cap(asset, debt_amount)?;

            let engine_address = engine.engine_address;
            engine
                .collateral_token(asset)?
                .transfer_from(caller, engine_address, collateral_amount)?;

            let id = engine.store.create_record(vault);
            engine.store.add_debt(asset, debt_amount);
            engine.store.add_collateral_amount(asset, collateral_amount);
            engine.index_insert(asset, id, prev_hint, next_hint);

            engine.stable_token()?.mint(caller, debt_amount)?;

            engine.emit(Event::NewVault(EventNewVault {
                owner: caller,
                asset,
                vault_id: id,
                collateral: collateral_amount,
                debt: debt_amount,
                mcr,
            }));
            Ok(id)
        })
    }

    /// Adjusts the caller's vault by up to one collateral delta and one
    /// debt delta. Within each pair only one direction may be non-zero,
    /// and at least one of the four amounts must be non-zero.
    ///
    /// Collateral additions and repayments are pulled from the caller;
    /// withdrawals and fresh debt are pushed to them. The vault invariant
    /// is re-checked on the resulting state and the vault re-ranked.
    pub fn adjust_vault(
        &mut self,
        caller: Address,
        asset: AssetId,
        add_collateral: U256,
        withdraw_collateral: U256,
        add_debt: U256,
        repay_debt: U256,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
    ) -> Result<()> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if engine.stops.adjustments {
                return Err(EngineError::InvalidParameter("vault adjustments are stopped"));
            }
            if !add_collateral.is_zero() && !withdraw_collateral.is_zero() {
                return Err(EngineError::InvalidParameter("both collateral directions set"));
            }
            if !add_debt.is_zero() && !repay_debt.is_zero() {
                return Err(EngineError::InvalidParameter("both debt directions set"));
            }
            if add_collateral.is_zero()
                && withdraw_collateral.is_zero()
                && add_debt.is_zero()
                && repay_debt.is_zero()
            {
                return Err(EngineError::ZeroAmount);
            }

            let params = engine.store.params(asset)?.clone();
            let id = engine.store.vault_id(asset, caller).ok_or(EngineError::VaultNotFound)?;
            let (collateral, debt, mcr) = engine.accrue(asset, caller)?;

            if withdraw_collateral > collateral {
                return Err(EngineError::InvalidParameter("withdrawal exceeds collateral"));
            }
            if repay_debt > debt {
                return Err(EngineError::InvalidParameter("repayment exceeds debt"));
            }
            let new_collateral = collateral + add_collateral - withdraw_collateral;
            let new_debt = debt + add_debt - repay_debt;

            let prospective = Vault {
                owner: caller,
                asset,
                collateral: new_collateral,
                debt: new_debt,
                mcr,
                last_update: engine.clock.now(),
            };
            let price = engine.price(asset)?;
            engine.store.check_vault_state(&prospective, &params, price)?;
            if !add_debt.is_zero() {
                engine.store.ensure_mint_cap(asset, add_debt)?;
            }

            if !add_collateral.is_zero() {
                let engine_address = engine.engine_address;
                engine
                    .collateral_token(asset)?
                    .transfer_from(caller, engine_address, add_collateral)?;
            }
            if !repay_debt.is_zero() {
                engine.stable_token()?.burn(caller, repay_debt)?;
            }

            engine.store.update_record(id, new_collateral, new_debt);
            if !add_debt.is_zero() {
                engine.store.add_debt(asset, add_debt);
            }
            if !repay_debt.is_zero() {
                engine.store.remove_debt(asset, repay_debt);
            }
            if !add_collateral.is_zero() {
                engine.store.add_collateral_amount(asset, add_collateral);
            }
            if !withdraw_collateral.is_zero() {
                engine.store.remove_collateral_amount(asset, withdraw_collateral);
            }
            engine.index_re_insert(asset, id, prev_hint, next_hint);

            if !withdraw_collateral.is_zero() {
                let engine_address = engine.engine_address;
                engine
                    .collateral_token(asset)?
                    .transfer_from(engine_address, caller, withdraw_collateral)?;
            }
            if !add_debt.is_zero() {
                engine.stable_token()?.mint(caller, add_debt)?;
            }

            engine.emit(Event::UpdateVault(EventUpdateVault {
                owner: caller,
                asset,
                vault_id: id,
                collateral: new_collateral,
                debt: new_debt,
                mcr,
            }));
            Ok(())
        })
    }

    /// Re-chooses the caller's MCR. The interest rate follows immediately
    /// and the vault is re-ranked at its new ARS.
    pub fn adjust_vault_mcr(
        &mut self,
        caller: Address,
        asset: AssetId,
        new_mcr: U256,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
    ) -> Result<()> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if engine.stops.adjustments {
                return Err(EngineError::InvalidParameter("vault adjustments are stopped"));
            }
            let params = engine.store.params(asset)?.clone();
            let id = engine.store.vault_id(asset, caller).ok_or(EngineError::VaultNotFound)?;
            let (collateral, debt, mcr) = engine.accrue(asset, caller)?;
            if new_mcr == mcr {
                return Err(EngineError::InvalidParameter("MCR unchanged"));
            }

            let prospective = Vault {
                owner: caller,
                asset,
                collateral,
                debt,
                mcr: new_mcr,
                last_update: engine.clock.now(),
            };
            let price = engine.price(asset)?;
            engine.store.check_vault_state(&prospective, &params, price)?;

            engine.store.update_record_mcr(id, new_mcr);
            engine.index_re_insert(asset, id, prev_hint, next_hint);

            engine.emit(Event::UpdateVault(EventUpdateVault {
                owner: caller,
                asset,
                vault_id: id,
                collateral,
                debt,
                mcr: new_mcr,
            }));
            Ok(())
        })
    }

    /// Closes the caller's vault: burns its full debt from the caller and
    /// returns all collateral.
    pub fn close_vault(&mut self, caller: Address, asset: AssetId) -> Result<()> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if engine.stops.adjustments {
                return Err(EngineError::InvalidParameter("vault adjustments are stopped"));
            }
            engine.store.params(asset)?;
            let id = engine.store.vault_id(asset, caller).ok_or(EngineError::VaultNotFound)?;
            let (collateral, debt, _) = engine.accrue(asset, caller)?;

            engine.stable_token()?.burn(caller, debt)?;

            engine.store.remove_debt(asset, debt);
            engine.store.remove_collateral_amount(asset, collateral);
            engine.index.remove(asset, id);
            engine.store.remove_record(id);

            let engine_address = engine.engine_address;
            engine
                .collateral_token(asset)?
                .transfer_from(engine_address, caller, collateral)?;

            engine.emit(Event::CloseVault(EventCloseVault { owner: caller, asset, vault_id: id }));
            Ok(())
        })
    }

    /// Moves the caller's whole vault record to `recipient`, interest
    /// anchor included. The position must be healthy and the recipient must
    /// not already have a vault for this collateral.
    pub fn transfer_vault_ownership(
        &mut self,
        caller: Address,
        asset: AssetId,
        recipient: Address,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
    ) -> Result<()> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if engine.stops.adjustments {
                return Err(EngineError::InvalidParameter("vault adjustments are stopped"));
            }
            if recipient == caller {
                return Err(EngineError::InvalidParameter("recipient is the caller"));
            }
            engine.store.params(asset)?;
            let id = engine.store.vault_id(asset, caller).ok_or(EngineError::VaultNotFound)?;
            if engine.store.vault_id(asset, recipient).is_some() {
                return Err(EngineError::VaultAlreadyExists);
            }
            let (collateral, debt, mcr) = engine.accrue(asset, caller)?;

            let price = engine.price(asset)?;
            if current_ratio(collateral, debt, price) <= mcr {
                return Err(EngineError::VaultBelowMcr);
            }

            // The ARS is owner-independent; re-seat the node at the score
            // computed before removal.
            engine.index.remove(asset, id);
            engine.store.transfer_record(id, recipient);
            engine.index_insert(asset, id, prev_hint, next_hint);

            engine.emit(Event::TransferVault(EventTransferVault {
                asset,
                vault_id: id,
                from: caller,
                to: recipient,
            }));
            Ok(())
        })
    }

    /// Liquidates an undercollateralized vault against the stability pool.
    ///
    /// # Errors
    /// * `VaultNotFound` — no vault for `(asset, owner)`.
    /// * `InvalidParameter` — the vault's CR is not below its MCR.
    /// * `StabilityPoolEmpty` — no deposits to offset against.
    ///
    /// # Logic
    /// 1. Settle interest, fetch the price, verify `CR < MCR`.
    /// 2. Cap the offset at the pool size; split the collateral into the
    ///    pool's share (debt plus penalty, truncated at the whole vault)
    ///    and the owner surplus.
    /// 3. Full liquidation removes the record and returns the surplus to
    ///    the owner; a partial one (pool smaller than the debt) leaves the
    ///    remainder in place and re-ranks it.
    /// 4. Offset the pool (P/S update), burn the offset oUSD from the pool
    ///    account and move the seized collateral to it.
    pub fn liquidate_vault(
        &mut self,
        caller: Address,
        asset: AssetId,
        owner: Address,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
    ) -> Result<()> {
        let _ = caller;
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if engine.stops.liquidations {
                return Err(EngineError::InvalidParameter("liquidations are stopped"));
            }
            let params = engine.store.params(asset)?.clone();
            let id = engine.store.vault_id(asset, owner).ok_or(EngineError::VaultNotFound)?;
            let (collateral, debt, mcr) = engine.accrue(asset, owner)?;

            let price = engine.price(asset)?;
            if current_ratio(collateral, debt, price) >= mcr {
                return Err(EngineError::InvalidParameter("vault is not below its MCR"));
            }
            if engine.pool.total_deposits().is_zero() {
                return Err(EngineError::StabilityPoolEmpty);
            }

            let debt_to_offset = debt.min(engine.pool.total_deposits());
            let (pool_collateral, surplus) = liquidation_distribution(
                collateral,
                debt_to_offset,
                params.liquidation_penalty,
                price,
            );
            let full = debt_to_offset == debt;

            if full {
                engine.store.remove_debt(asset, debt);
                engine.store.remove_collateral_amount(asset, collateral);
                engine.index.remove(asset, id);
                engine.store.remove_record(id);
            } else {
                engine
                    .store
                    .update_record(id, collateral - pool_collateral, debt - debt_to_offset);
                engine.store.remove_debt(asset, debt_to_offset);
                engine.store.remove_collateral_amount(asset, pool_collateral);
                engine.index_re_insert(asset, id, prev_hint, next_hint);
            }

            engine.pool.offset_debt(debt_to_offset, asset, pool_collateral)?;

            let pool_address = engine.pool_address;
            let engine_address = engine.engine_address;
            engine.stable_token()?.burn(pool_address, debt_to_offset)?;
            engine
                .collateral_token(asset)?
                .transfer_from(engine_address, pool_address, pool_collateral)?;
            if full && !surplus.is_zero() {
                engine
                    .collateral_token(asset)?
                    .transfer_from(engine_address, owner, surplus)?;
            }

            let pool_info = engine.pool.info();
            engine.emit(Event::DebtOffset(EventDebtOffset {
                asset,
                debt_offset: debt_to_offset,
                collateral_added: pool_collateral,
                epoch: pool_info.current_epoch,
                scale: pool_info.current_scale,
            }));
            engine.emit(Event::LiquidateVault(EventLiquidateVault {
                owner,
                asset,
                vault_id: id,
                debt_offset: debt_to_offset,
                collateral_to_pool: pool_collateral,
                surplus: if full { surplus } else { U256::zero() },
                full,
            }));
            Ok(())
        })
    }

    /// Redeems up to `amount_requested` oUSD for collateral at the oracle
    /// price, walking vaults from the lowest ARS upward.
    ///
    /// Fully drained vaults are cleared and their leftover collateral is
    /// pushed to their owners; the final partially-touched vault stays in
    /// place, re-ranked with the caller's hints. The walk stops when the
    /// request is filled or no vaults remain; the caller's oUSD is burned
    /// for exactly the amount redeemed.
    ///
    /// # Errors
    /// * `ZeroAmount` — nothing requested.
    /// * `NoVaultsToRedeem` — nothing with debt to redeem against.
    /// * `InvalidParameter` — a touched vault's collateral cannot cover its
    ///   redemption at the current price.
    pub fn redeem_vault(
        &mut self,
        caller: Address,
        asset: AssetId,
        amount_requested: U256,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
    ) -> Result<()> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if engine.stops.redemptions {
                return Err(EngineError::InvalidParameter("redemptions are stopped"));
            }
            if amount_requested.is_zero() {
                return Err(EngineError::ZeroAmount);
            }
            engine.store.params(asset)?;
            if engine.index.is_empty(asset) {
                return Err(EngineError::NoVaultsToRedeem);
            }

            let price = engine.price(asset)?;
            let fee_rate = engine.store.redemption_fee();

            // Plan the whole walk first so any failure aborts before
            // anything irreversible. Interest settlement per touched vault
            // commits as usual.
            let now = engine.clock.now();
            let mut steps: Vec<RedemptionStep> = vec![];
            let mut remaining = amount_requested;
            let mut total_debt_redeemed = U256::zero();
            let mut total_coll_redeemed = U256::zero();
            let mut current = engine.index.tail(asset);

            while let Some(id) = current {
                if remaining.is_zero() {
                    break;
                }
                let owner = engine.store.vault(id).owner;
                let (collateral, debt, _) = engine.store.accrue_interest(asset, owner, now)?;
                if debt.is_zero() {
                    // Zero-debt vaults (left by an exact redemption) hold
                    // nothing redeemable.
                    current = engine.index.prev(asset, id);
                    continue;
                }

                let to_redeem = debt.min(remaining);
                let fee = mul_div(to_redeem, fee_rate, ONE);
                let collateral_out = mul_div(to_redeem - fee, ONE, price);
                if collateral_out > collateral {
                    return Err(EngineError::InvalidParameter(
                        "redemption exceeds vault collateral",
                    ));
                }

                remaining -= to_redeem;
                total_debt_redeemed += to_redeem;
                total_coll_redeemed += collateral_out;
                let drains = !remaining.is_zero();
                steps.push(RedemptionStep {
                    id,
                    owner,
                    to_redeem,
                    coll_out: collateral_out,
                    surplus: if drains { collateral - collateral_out } else { U256::zero() },
                    drains,
                });
                current = engine.index.prev(asset, id);
            }

            if total_debt_redeemed.is_zero() {
                return Err(EngineError::NoVaultsToRedeem);
            }

            // Pull: burn the redeemed oUSD from the caller.
            engine.stable_token()?.burn(caller, total_debt_redeemed)?;

            // Commit.
            for step in &steps {
                if step.drains {
                    engine.store.remove_debt(asset, step.to_redeem);
                    engine
                        .store
                        .remove_collateral_amount(asset, step.coll_out + step.surplus);
                    engine.index.remove(asset, step.id);
                    engine.store.remove_record(step.id);
                } else {
                    let vault = engine.store.vault(step.id);
                    let new_collateral = vault.collateral - step.coll_out;
                    let new_debt = vault.debt - step.to_redeem;
                    engine.store.update_record(step.id, new_collateral, new_debt);
                    engine.store.remove_debt(asset, step.to_redeem);
                    engine.store.remove_collateral_amount(asset, step.coll_out);
                    engine.index_re_insert(asset, step.id, prev_hint, next_hint);
                }
            }

            // Push: collateral to the redeemer, surpluses to drained owners.
            let engine_address = engine.engine_address;
            engine
                .collateral_token(asset)?
                .transfer_from(engine_address, caller, total_coll_redeemed)?;
            for step in &steps {
                if step.drains && !step.surplus.is_zero() {
                    engine
                        .collateral_token(asset)?
                        .transfer_from(engine_address, step.owner, step.surplus)?;
                }
            }

            let touched = steps.len() as u32;
            engine.emit(Event::RedeemVaults(EventRedeemVaults {
                asset,
                redeemer: caller,
                debt_redeemed: total_debt_redeemed,
                collateral_redeemed: total_coll_redeemed,
                vaults_touched: touched,
            }));
            Ok(())
        })
    }

    /// Settles compound interest on one vault without changing anything
    /// else. Anyone may poke any vault; calling twice at the same timestamp
    /// is a no-op after the first.
    pub fn update_vault_interest(&mut self, asset: AssetId, owner: Address) -> Result<U256> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            let id = engine.store.vault_id(asset, owner).ok_or(EngineError::VaultNotFound)?;
            let debt_before = engine.store.vault(id).debt;
            let (_, debt, _) = engine.accrue(asset, owner)?;
            let accrued = debt - debt_before;
            if !accrued.is_zero() {
                engine.emit(Event::AccrueInterest(EventAccrueInterest {
                    owner,
                    asset,
                    accrued,
                    new_debt: debt,
                }));
            }
            Ok(accrued)
        })
    }

    /// Mints the interest accrued since the previous call and distributes
    /// it to the configured recipients by their basis-point shares, any
    /// shortfall going to the default recipient (or staying unminted).
    ///
    /// # Errors
    /// `ZeroAmount` when nothing has accrued since the last mint.
    pub fn mint_vaults_interest(&mut self) -> Result<U256> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            let accrued = engine.store.total_accrued_debt();
            let delta = accrued - engine.store.last_recorded_accrued_debt();
            if delta.is_zero() {
                return Err(EngineError::ZeroAmount);
            }
            engine.store.set_last_recorded_accrued_debt(accrued);

            let mut remaining = delta;
            let recipients = engine.mint_recipients.clone();
            for recipient in &recipients {
                let amount =
                    mul_div(delta, U256::from(recipient.bps), U256::from(BPS_DENOMINATOR));
                if !amount.is_zero() {
                    engine.stable_token()?.mint(recipient.recipient, amount)?;
                    remaining -= amount;
                }
            }

            let mut to_default = U256::zero();
            if !remaining.is_zero() {
                if let Some(default_recipient) = engine.default_interest_recipient {
                    engine.stable_token()?.mint(default_recipient, remaining)?;
                    to_default = remaining;
                }
            }

            engine.emit(Event::MintInterest(EventMintInterest { minted: delta, to_default }));
            Ok(delta)
        })
    }

    // ------------------------------------------------------------------
    // Stability pool operations
    // ------------------------------------------------------------------

    /// Deposits `amount` oUSD into the stability pool, paying out the
    /// caller's pending collateral gains for the listed assets.
    ///
    /// `assets` must be strictly ascending and is expected to name every
    /// collateral the caller has gains in: the deposit snapshot is
    /// refreshed wholesale, so unlisted gains are forfeited to the pool.
    pub fn pool_deposit(
        &mut self,
        caller: Address,
        amount: U256,
        assets: &[AssetId],
    ) -> Result<Vec<(AssetId, U256)>> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if amount.is_zero() {
                return Err(EngineError::ZeroAmount);
            }
            engine.pool.check_assets(assets)?;

            let pool_address = engine.pool_address;
            engine.stable_token()?.transfer_from(caller, pool_address, amount)?;

            let payout = engine.pool.deposit(caller, amount, assets)?;
            for (gain_asset, gain) in &payout.gains {
                engine
                    .collateral_token(*gain_asset)?
                    .transfer_from(pool_address, caller, *gain)?;
            }

            engine.emit(Event::StabilityContribution(EventStabilityContribution {
                depositor: caller,
                amount,
                gains: payout.gains.clone(),
            }));
            Ok(payout.gains)
        })
    }

    /// Withdraws `min(amount, compounded deposit)` oUSD plus the pending
    /// gains for the listed assets. `amount == 0` claims gains only.
    pub fn pool_withdraw(
        &mut self,
        caller: Address,
        amount: U256,
        assets: &[AssetId],
    ) -> Result<(U256, Vec<(AssetId, U256)>)> {
        self.non_reentrant(|engine| {
            engine.ensure_initialized()?;
            if !engine.pool.has_deposit(caller) {
                return Err(EngineError::InsufficientDeposit);
            }
            engine.pool.check_assets(assets)?;

            let payout = engine.pool.withdraw(caller, amount, assets)?;

            let pool_address = engine.pool_address;
            if !payout.stable.is_zero() {
                engine.stable_token()?.transfer_from(pool_address, caller, payout.stable)?;
            }
            for (gain_asset, gain) in &payout.gains {
                engine
                    .collateral_token(*gain_asset)?
                    .transfer_from(pool_address, caller, *gain)?;
            }

            engine.emit(Event::StabilityWithdrawal(EventStabilityWithdrawal {
                depositor: caller,
                amount: payout.stable,
                gains: payout.gains.clone(),
            }));
            Ok((payout.stable, payout.gains))
        })
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    /// The engine owner (admin capability holder).
    pub fn protocol_owner(&self) -> Address {
        self.owner
    }

    pub fn treasury(&self) -> Option<Address> {
        self.treasury
    }

    pub fn stops(&self) -> ProtocolStops {
        self.stops
    }

    /// The vault handle for `(asset, owner)`, usable as a sorted-index hint.
    pub fn vault_id(&self, asset: AssetId, owner: Address) -> Option<VaultId> {
        self.store.vault_id(asset, owner)
    }

    /// Full view of one vault, including its current risk scores.
    pub fn vault_info(&self, asset: AssetId, owner: Address) -> Result<VaultInfoReturn> {
        let params = self.store.params(asset)?;
        let id = self.store.vault_id(asset, owner).ok_or(EngineError::VaultNotFound)?;
        let vault = self.store.vault(id);
        Ok(VaultInfoReturn {
            owner: vault.owner,
            asset: vault.asset,
            collateral: vault.collateral,
            debt: vault.debt,
            mcr: vault.mcr,
            last_update: vault.last_update,
            nominal_ratio: nominal_ratio(vault.collateral, vault.debt),
            adjusted_risk_score: adjusted_risk_score(
                vault.collateral,
                vault.debt,
                vault.mcr,
                params,
            ),
        })
    }

    /// The vault's live collateral ratio at the current oracle price.
    pub fn current_vault_ratio(&self, asset: AssetId, owner: Address) -> Result<U256> {
        let id = self.store.vault_id(asset, owner).ok_or(EngineError::VaultNotFound)?;
        let vault = self.store.vault(id);
        let price = self.price(asset)?;
        Ok(current_ratio(vault.collateral, vault.debt, price))
    }

    /// Every registered collateral, in registry-index order.
    pub fn valid_collateral(&self) -> &[AssetId] {
        self.store.valid_collateral()
    }

    pub fn collateral_info(&self, asset: AssetId) -> Result<CollateralInfoReturn> {
        let params = self.store.params(asset)?;
        Ok(CollateralInfoReturn {
            asset,
            params: params.clone(),
            total_debt: self.store.total_debt(asset),
            total_collateral: self.store.total_collateral(asset),
            vault_count: self.index.len(asset),
        })
    }

    /// The next `count` vaults in redemption order (lowest ARS first),
    /// with their current debts.
    pub fn next_redemptions(&self, asset: AssetId, count: usize) -> Vec<(Address, U256)> {
        let mut out = vec![];
        let mut current = self.index.tail(asset);
        while let Some(id) = current {
            if out.len() >= count {
                break;
            }
            let vault = self.store.vault(id);
            out.push((vault.owner, vault.debt));
            current = self.index.prev(asset, id);
        }
        out
    }

    pub fn active_vaults(&self) -> u64 {
        self.store.active_vaults()
    }

    pub fn total_debt(&self, asset: AssetId) -> U256 {
        self.store.total_debt(asset)
    }

    pub fn total_collateral(&self, asset: AssetId) -> U256 {
        self.store.total_collateral(asset)
    }

    pub fn total_protocol_debt(&self) -> U256 {
        self.store.total_protocol_debt()
    }

    pub fn total_accrued_debt(&self) -> U256 {
        self.store.total_accrued_debt()
    }

    pub fn redemption_fee(&self) -> U256 {
        self.store.redemption_fee()
    }

    pub fn sorted_vault_count(&self, asset: AssetId) -> u64 {
        self.index.len(asset)
    }

    pub fn pool_info(&self) -> StabilityPoolInfoReturn {
        self.pool.info()
    }

    /// A depositor's stability deposit compounded through all offsets.
    pub fn compounded_deposit(&self, depositor: Address) -> U256 {
        self.pool.compounded_deposit(depositor)
    }

    /// A depositor's unclaimed collateral gain for one asset.
    pub fn depositor_collateral_gain(&self, depositor: Address, asset: AssetId) -> U256 {
        self.pool.collateral_gain(depositor, asset)
    }

    /// Drains the buffered events in commit order.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn non_reentrant<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.entered {
            return Err(EngineError::ReentrancyBlocked);
        }
        self.entered = true;
        let result = f(self);
        self.entered = false;
        result
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.stable.is_none() {
            return Err(EngineError::NotInitialized);
        }
        Ok(())
    }

    fn ensure_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner {
            return Err(EngineError::NotAuthorized);
        }
        Ok(())
    }

    fn stable_token(&mut self) -> Result<&mut (dyn StableToken + '_)> {
        match self.stable.as_mut() {
            Some(token) => Ok(token.as_mut()),
            None => Err(EngineError::NotInitialized),
        }
    }

    fn collateral_token(&mut self, asset: AssetId) -> Result<&mut (dyn FungibleToken + '_)> {
        match self.collateral_tokens.get_mut(&asset) {
            Some(token) => Ok(token.as_mut()),
            None => Err(EngineError::InvalidCollateral),
        }
    }

    fn price(&self, asset: AssetId) -> Result<U256> {
        let oracle = self.oracle.as_deref().ok_or(EngineError::NotInitialized)?;
        Ok(oracle.fetch_price(asset)?)
    }

    /// Settles interest on `(asset, owner)` up to now. Zeros mean no vault.
    fn accrue(&mut self, asset: AssetId, owner: Address) -> Result<(U256, U256, U256)> {
        let now = self.clock.now();
        self.store.accrue_interest(asset, owner, now)
    }

    fn index_insert(
        &mut self,
        asset: AssetId,
        id: VaultId,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
    ) {
        let ars = self.store.ars_by_id(id);
        let Self { store, index, .. } = self;
        index.insert(asset, id, ars, prev_hint, next_hint, |v| store.ars_by_id(v));
    }

    fn index_re_insert(
        &mut self,
        asset: AssetId,
        id: VaultId,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
    ) {
        let ars = self.store.ars_by_id(id);
        let Self { store, index, .. } = self;
        index.re_insert(asset, id, ars, prev_hint, next_hint, |v| store.ars_by_id(v));
    }

    fn emit(&mut self, event: Event) {
        log::debug!(target: "obol", "{event:?}");
        self.events.push(event);
    }
}

/// Splits a liquidated vault's collateral between the stability pool and
/// the owner: the pool covers the offset debt plus the penalty, truncated
/// at the whole vault when the collateral cannot cover it.
fn liquidation_distribution(
    collateral: U256,
    debt_to_offset: U256,
    penalty: U256,
    price: U256,
) -> (U256, U256) {
    let payable = debt_to_offset + mul_div(debt_to_offset, penalty, ONE);
    let collateral_value = mul_div(collateral, price, ONE);
    if payable >= collateral_value {
        (collateral, U256::zero())
    } else {
        let pool_collateral = mul_div(payable, ONE, price);
        (pool_collateral, collateral - pool_collateral)
    }
}
