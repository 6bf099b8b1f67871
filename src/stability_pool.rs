//! The stability pool: oUSD deposits earmarked to absorb liquidated debt.
//!
//! Bookkeeping follows the product/sum scheme: a running product `P` tracks
//! how every deposit has been compounded down by liquidations, and one
//! running sum `S` per collateral asset tracks the collateral awarded per
//! unit staked. A depositor only stores `(deposit, P, S[·], scale, epoch)`
//! snapshots, so each liquidation costs O(1) state writes per asset and
//! depositor bookkeeping accrues lazily.
//!
//! `P` is rescaled by 1e9 whenever it would lose nine digits of precision
//! (`scale` increments) and resets to 1e18 when the pool is fully emptied
//! (`epoch` increments, wiping every live deposit). Truncation errors are
//! carried in per-asset and debt-side error buckets so they never
//! accumulate across liquidations.
//!
//! The pool is a pure ledger: the engine moves the actual tokens and is the
//! only caller of [`StabilityPool::offset_debt`].

use std::collections::HashMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::interfaces::{Address, AssetId};
use crate::math::{mul_div, ONE, SCALE_FACTOR};
use crate::shared_structs::StabilityPoolInfoReturn;

/// A depositor's entry snapshot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
struct DepositSnapshot {
    p: U256,
    scale: u64,
    epoch: u64,
    /// `S` per asset at snapshot time.
    sums: HashMap<AssetId, U256>,
}

/// Outcome of a deposit or withdrawal, consumed by the engine's token leg.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolPayout {
    /// oUSD owed to the depositor (withdrawals only).
    pub stable: U256,
    /// Collateral gains owed to the depositor, per asset, zero entries
    /// filtered out.
    pub gains: Vec<(AssetId, U256)>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StabilityPool {
    p: U256,
    current_scale: u64,
    current_epoch: u64,
    total_deposits: U256,
    deposits: HashMap<Address, U256>,
    snapshots: HashMap<Address, DepositSnapshot>,
    /// `epochToScaleToSum`: per asset, per `(epoch, scale)`.
    sums: HashMap<AssetId, HashMap<(u64, u64), U256>>,
    /// Collateral-side truncation carry, keyed by the collateral's registry
    /// index.
    last_asset_error: HashMap<u32, U256>,
    last_debt_loss_error: U256,
    /// Registered collaterals and their registry indices.
    asset_indices: HashMap<AssetId, u32>,
}

impl Default for StabilityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StabilityPool {
    pub fn new() -> Self {
        Self {
            p: ONE,
            current_scale: 0,
            current_epoch: 0,
            total_deposits: U256::zero(),
            deposits: HashMap::new(),
            snapshots: HashMap::new(),
            sums: HashMap::new(),
            last_asset_error: HashMap::new(),
            last_debt_loss_error: U256::zero(),
            asset_indices: HashMap::new(),
        }
    }

    /// Registers a collateral so the pool can track gains for it. Called by
    /// the engine when a collateral is added.
    pub fn register_asset(&mut self, asset: AssetId, index: u32) {
        self.asset_indices.insert(asset, index);
    }

    pub fn total_deposits(&self) -> U256 {
        self.total_deposits
    }

    pub fn info(&self) -> StabilityPoolInfoReturn {
        StabilityPoolInfoReturn {
            total_deposits: self.total_deposits,
            p: self.p,
            current_scale: self.current_scale,
            current_epoch: self.current_epoch,
        }
    }

    /// Validates a caller-supplied asset list: strictly ascending (which
    /// also rules out duplicates) and every entry registered.
    pub fn check_assets(&self, assets: &[AssetId]) -> Result<()> {
        for pair in assets.windows(2) {
            if pair[0] >= pair[1] {
                return Err(EngineError::ArrayNotAscending);
            }
        }
        for asset in assets {
            if !self.asset_indices.contains_key(asset) {
                return Err(EngineError::InvalidCollateral);
            }
        }
        Ok(())
    }

    pub fn has_deposit(&self, depositor: Address) -> bool {
        self.deposits.contains_key(&depositor)
    }

    /// The depositor's deposit compounded through every liquidation since
    /// their snapshot.
    pub fn compounded_deposit(&self, depositor: Address) -> U256 {
        let Some(initial) = self.deposits.get(&depositor).copied() else {
            return U256::zero();
        };
        let snapshot = self.snapshots.get(&depositor).expect("deposit without snapshot");
        self.compound(initial, snapshot)
    }

    /// The depositor's unclaimed collateral gain for `asset`.
    pub fn collateral_gain(&self, depositor: Address, asset: AssetId) -> U256 {
        let Some(initial) = self.deposits.get(&depositor).copied() else {
            return U256::zero();
        };
        let snapshot = self.snapshots.get(&depositor).expect("deposit without snapshot");
        self.pending_gain(initial, snapshot, asset)
    }

    /// Books a deposit: realizes pending gains for the listed assets,
    /// compounds the existing deposit, adds `amount` and refreshes the
    /// snapshot. Returns the gains the engine must pay out.
    ///
    /// The oUSD transfer into the pool is the engine's side of the call.
    pub fn deposit(
        &mut self,
        depositor: Address,
        amount: U256,
        assets: &[AssetId],
    ) -> Result<PoolPayout> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        self.check_assets(assets)?;

        let (compounded, gains) = self.settle(depositor, assets);
        let new_deposit = compounded + amount;
        let snapshot = self.snapshot_now();
        self.deposits.insert(depositor, new_deposit);
        self.snapshots.insert(depositor, snapshot);
        self.total_deposits += amount;

        Ok(PoolPayout { stable: U256::zero(), gains })
    }

    /// Books a withdrawal of `min(amount, compounded deposit)` plus pending
    /// gains for the listed assets; `amount == 0` claims gains only.
    /// Returns what the engine must pay out.
    pub fn withdraw(
        &mut self,
        depositor: Address,
        amount: U256,
        assets: &[AssetId],
    ) -> Result<PoolPayout> {
        if !self.has_deposit(depositor) {
            return Err(EngineError::InsufficientDeposit);
        }
        self.check_assets(assets)?;

        let (compounded, gains) = self.settle(depositor, assets);
        let to_withdraw = amount.min(compounded);
        let remaining = compounded - to_withdraw;

        if remaining.is_zero() {
            self.deposits.remove(&depositor);
            self.snapshots.remove(&depositor);
        } else {
            let snapshot = self.snapshot_now();
            self.deposits.insert(depositor, remaining);
            self.snapshots.insert(depositor, snapshot);
        }
        self.total_deposits -= to_withdraw;

        Ok(PoolPayout { stable: to_withdraw, gains })
    }

    /// Cancels `debt_to_offset` of liquidated debt against the pool and
    /// credits `coll_added` of `asset` to depositors, in O(1) state writes.
    ///
    /// The caller has already capped `debt_to_offset` at the pool size and
    /// performs the burn and the collateral transfer. Rounding on the debt
    /// side is carried upward so it always favors the pool.
    pub(crate) fn offset_debt(
        &mut self,
        debt_to_offset: U256,
        asset: AssetId,
        coll_added: U256,
    ) -> Result<()> {
        if self.total_deposits.is_zero() || debt_to_offset.is_zero() {
            return Ok(());
        }
        assert!(debt_to_offset <= self.total_deposits, "offset exceeds pool deposits");

        let index = *self.asset_indices.get(&asset).ok_or(EngineError::InvalidCollateral)?;

        // Per-unit amounts, with the truncation carry folded back in.
        let asset_error = self.last_asset_error.get(&index).copied().unwrap_or_default();
        let coll_numerator = coll_added * ONE + asset_error;

        let debt_loss_per_unit = if debt_to_offset == self.total_deposits {
            self.last_debt_loss_error = U256::zero();
            ONE
        } else {
            let loss_numerator = debt_to_offset * ONE - self.last_debt_loss_error;
            // Round up: the pool must never under-shrink.
            let per_unit = loss_numerator / self.total_deposits + 1;
            self.last_debt_loss_error = per_unit * self.total_deposits - loss_numerator;
            per_unit
        };

        let coll_gain_per_unit = coll_numerator / self.total_deposits;
        self.last_asset_error
            .insert(index, coll_numerator - coll_gain_per_unit * self.total_deposits);

        // Fold the gain into S at the current P so later depositors are
        // excluded, then shrink P by the loss factor.
        let marginal_gain = coll_gain_per_unit * self.p;
        let sum_key = (self.current_epoch, self.current_scale);
        let entry = self
            .sums
            .entry(asset)
            .or_default()
            .entry(sum_key)
            .or_insert_with(U256::zero);
        *entry += marginal_gain;

        let product_factor = ONE - debt_loss_per_unit;
        if product_factor.is_zero() {
            // Pool emptied: every live deposit compounds to zero.
            self.current_epoch += 1;
            self.current_scale = 0;
            self.p = ONE;
        } else {
            let shrunk = self.p * product_factor;
            if shrunk / ONE < SCALE_FACTOR {
                self.p = shrunk * SCALE_FACTOR / ONE;
                self.current_scale += 1;
            } else {
                self.p = shrunk / ONE;
            }
            assert!(!self.p.is_zero(), "stability pool product underflowed");
        }

        self.total_deposits -= debt_to_offset;
        Ok(())
    }

    // -- internals ------------------------------------------------------------

    /// Realizes the depositor's pending state: compounded deposit plus the
    /// gains for the listed assets.
    fn settle(&self, depositor: Address, assets: &[AssetId]) -> (U256, Vec<(AssetId, U256)>) {
        let Some(initial) = self.deposits.get(&depositor).copied() else {
            return (U256::zero(), vec![]);
        };
        let snapshot = self.snapshots.get(&depositor).expect("deposit without snapshot");

        let mut gains = vec![];
        for asset in assets {
            let gain = self.pending_gain(initial, snapshot, *asset);
            if !gain.is_zero() {
                gains.push((*asset, gain));
            }
        }
        (self.compound(initial, snapshot), gains)
    }

    fn compound(&self, initial: U256, snapshot: &DepositSnapshot) -> U256 {
        // The pool was emptied after this deposit was placed.
        if snapshot.epoch < self.current_epoch {
            return U256::zero();
        }

        let scale_diff = self.current_scale - snapshot.scale;
        let compounded = match scale_diff {
            0 => mul_div(initial, self.p, snapshot.p),
            1 => mul_div(initial, self.p, snapshot.p) / SCALE_FACTOR,
            _ => U256::zero(),
        };

        // Below a billionth of the original deposit it is treated as dust.
        if compounded < initial / SCALE_FACTOR {
            return U256::zero();
        }
        compounded
    }

    fn pending_gain(&self, initial: U256, snapshot: &DepositSnapshot, asset: AssetId) -> U256 {
        if snapshot.p.is_zero() {
            return U256::zero();
        }
        let s_snapshot = snapshot.sums.get(&asset).copied().unwrap_or_default();
        let first_portion = self.sum_at(asset, snapshot.epoch, snapshot.scale) - s_snapshot;
        let second_portion = self.sum_at(asset, snapshot.epoch, snapshot.scale + 1) / SCALE_FACTOR;
        mul_div(initial, first_portion + second_portion, snapshot.p * ONE)
    }

    fn sum_at(&self, asset: AssetId, epoch: u64, scale: u64) -> U256 {
        self.sums
            .get(&asset)
            .and_then(|per_asset| per_asset.get(&(epoch, scale)))
            .copied()
            .unwrap_or_default()
    }

    fn snapshot_now(&self) -> DepositSnapshot {
        let sums = self
            .asset_indices
            .keys()
            .map(|asset| (*asset, self.sum_at(*asset, self.current_epoch, self.current_scale)))
            .collect();
        DepositSnapshot {
            p: self.p,
            scale: self.current_scale,
            epoch: self.current_epoch,
            sums,
        }
    }
}
