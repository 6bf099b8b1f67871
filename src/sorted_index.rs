//! Per-collateral redemption ordering.
//!
//! Each collateral keeps a doubly-linked list of its active vault ids,
//! ordered head-to-tail by non-increasing adjusted risk score (ARS). The
//! head is the safest vault, the tail the first to be redeemed against.
//!
//! Nodes live in an id-keyed arena and hold only their neighbor links; the
//! ordering key is always read live through a caller-supplied `ars_of`
//! oracle, so a hint computed before an interest accrual is simply detected
//! as invalid and discarded. Inserting with a valid `(prev, next)` hint is
//! O(1); without one the list is walked from the nearest anchor.

use std::collections::HashMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::interfaces::{AssetId, VaultId};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
struct Node {
    prev: Option<VaultId>,
    next: Option<VaultId>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
struct AssetList {
    head: Option<VaultId>,
    tail: Option<VaultId>,
    size: u64,
    nodes: HashMap<VaultId, Node>,
}

/// The set of per-collateral sorted vault lists.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SortedIndex {
    lists: HashMap<AssetId, AssetList>,
}

impl SortedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is currently listed for `asset`.
    pub fn contains(&self, asset: AssetId, id: VaultId) -> bool {
        self.lists
            .get(&asset)
            .map(|l| l.nodes.contains_key(&id))
            .unwrap_or(false)
    }

    /// Number of listed vaults for `asset`.
    pub fn len(&self, asset: AssetId) -> u64 {
        self.lists.get(&asset).map(|l| l.size).unwrap_or(0)
    }

    pub fn is_empty(&self, asset: AssetId) -> bool {
        self.len(asset) == 0
    }

    /// The largest-ARS vault.
    pub fn head(&self, asset: AssetId) -> Option<VaultId> {
        self.lists.get(&asset).and_then(|l| l.head)
    }

    /// The smallest-ARS vault; redemptions start here.
    pub fn tail(&self, asset: AssetId) -> Option<VaultId> {
        self.lists.get(&asset).and_then(|l| l.tail)
    }

    /// The neighbor of `id` toward the tail.
    pub fn next(&self, asset: AssetId, id: VaultId) -> Option<VaultId> {
        self.lists
            .get(&asset)
            .and_then(|l| l.nodes.get(&id))
            .and_then(|n| n.next)
    }

    /// The neighbor of `id` toward the head.
    pub fn prev(&self, asset: AssetId, id: VaultId) -> Option<VaultId> {
        self.lists
            .get(&asset)
            .and_then(|l| l.nodes.get(&id))
            .and_then(|n| n.prev)
    }

    /// Splices `id` into the `asset` list at the position implied by `ars`.
    ///
    /// `(prev_hint, next_hint)` is used verbatim when it is a valid insert
    /// position for `ars`; otherwise the list is searched from the closest
    /// still-valid hint, or from the head when neither hint survives.
    ///
    /// # Panics
    /// Panics when `id` is already listed, zero, or `ars` is zero — all
    /// engine bugs, never user-reachable.
    pub fn insert(
        &mut self,
        asset: AssetId,
        id: VaultId,
        ars: U256,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
        ars_of: impl Fn(VaultId) -> U256,
    ) {
        assert!(id != 0, "sorted index: zero vault id");
        assert!(!ars.is_zero(), "sorted index: zero risk score");
        assert!(!self.contains(asset, id), "sorted index: id already listed");

        let (prev, next) = if self.valid_insert_position(asset, ars, prev_hint, next_hint, &ars_of)
        {
            (prev_hint, next_hint)
        } else {
            self.find_insert_position(asset, ars, prev_hint, next_hint, &ars_of)
        };

        let list = self.lists.entry(asset).or_default();
        list.nodes.insert(id, Node { prev, next });

        match (prev, next) {
            (None, None) => {
                list.head = Some(id);
                list.tail = Some(id);
            }
            (None, Some(n)) => {
                list.nodes.get_mut(&n).expect("next node missing").prev = Some(id);
                list.head = Some(id);
            }
            (Some(p), None) => {
                list.nodes.get_mut(&p).expect("prev node missing").next = Some(id);
                list.tail = Some(id);
            }
            (Some(p), Some(n)) => {
                list.nodes.get_mut(&p).expect("prev node missing").next = Some(id);
                list.nodes.get_mut(&n).expect("next node missing").prev = Some(id);
            }
        }

        list.size += 1;
    }

    /// Unlinks `id` from the `asset` list.
    ///
    /// # Panics
    /// Panics when `id` is not listed.
    pub fn remove(&mut self, asset: AssetId, id: VaultId) {
        assert!(self.contains(asset, id), "sorted index: id not listed");

        let list = self.lists.get_mut(&asset).expect("list missing");
        let node = list.nodes.remove(&id).expect("node missing");

        match node.prev {
            Some(p) => list.nodes.get_mut(&p).expect("prev node missing").next = node.next,
            None => list.head = node.next,
        }
        match node.next {
            Some(n) => list.nodes.get_mut(&n).expect("next node missing").prev = node.prev,
            None => list.tail = node.prev,
        }

        list.size -= 1;
    }

    /// Moves `id` to the position implied by `new_ars`. Equivalent to
    /// `remove` followed by `insert`.
    pub fn re_insert(
        &mut self,
        asset: AssetId,
        id: VaultId,
        new_ars: U256,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
        ars_of: impl Fn(VaultId) -> U256,
    ) {
        self.remove(asset, id);
        self.insert(asset, id, new_ars, prev_hint, next_hint, ars_of);
    }

    /// Whether `(prev, next)` is a position `ars` may be spliced into:
    /// both empty on an empty list, a head position with `ars` at least the
    /// head's score, a tail position with `ars` at most the tail's score,
    /// or an adjacent pair bracketing `ars`.
    fn valid_insert_position(
        &self,
        asset: AssetId,
        ars: U256,
        prev: Option<VaultId>,
        next: Option<VaultId>,
        ars_of: &impl Fn(VaultId) -> U256,
    ) -> bool {
        match (prev, next) {
            (None, None) => self.is_empty(asset),
            (None, Some(n)) => self.head(asset) == Some(n) && ars >= ars_of(n),
            (Some(p), None) => self.tail(asset) == Some(p) && ars <= ars_of(p),
            (Some(p), Some(n)) => {
                self.next(asset, p) == Some(n) && ars_of(p) >= ars && ars >= ars_of(n)
            }
        }
    }

    /// Repairs an invalid hint pair: a hint that no longer exists or now
    /// sits on the wrong side of `ars` is dropped, then the walk starts
    /// from whichever anchor survives (head otherwise).
    fn find_insert_position(
        &self,
        asset: AssetId,
        ars: U256,
        prev_hint: Option<VaultId>,
        next_hint: Option<VaultId>,
        ars_of: &impl Fn(VaultId) -> U256,
    ) -> (Option<VaultId>, Option<VaultId>) {
        let mut prev = prev_hint;
        let mut next = next_hint;

        if let Some(p) = prev {
            if !self.contains(asset, p) || ars > ars_of(p) {
                prev = None;
            }
        }
        if let Some(n) = next {
            if !self.contains(asset, n) || ars < ars_of(n) {
                next = None;
            }
        }

        match (prev, next) {
            (None, None) => match self.head(asset) {
                Some(head) => self.descend(asset, ars, head, ars_of),
                None => (None, None),
            },
            (Some(p), _) => self.descend(asset, ars, p, ars_of),
            (None, Some(n)) => self.ascend(asset, ars, n, ars_of),
        }
    }

    /// Walks toward the tail from `start` until a valid position is found.
    fn descend(
        &self,
        asset: AssetId,
        ars: U256,
        start: VaultId,
        ars_of: &impl Fn(VaultId) -> U256,
    ) -> (Option<VaultId>, Option<VaultId>) {
        if self.head(asset) == Some(start) && ars >= ars_of(start) {
            return (None, Some(start));
        }

        let mut prev = Some(start);
        let mut next = self.next(asset, start);

        while prev.is_some() && !self.valid_insert_position(asset, ars, prev, next, ars_of) {
            prev = next;
            next = prev.and_then(|p| self.next(asset, p));
        }

        (prev, next)
    }

    /// Walks toward the head from `start` until a valid position is found.
    fn ascend(
        &self,
        asset: AssetId,
        ars: U256,
        start: VaultId,
        ars_of: &impl Fn(VaultId) -> U256,
    ) -> (Option<VaultId>, Option<VaultId>) {
        if self.tail(asset) == Some(start) && ars <= ars_of(start) {
            return (Some(start), None);
        }

        let mut next = Some(start);
        let mut prev = self.prev(asset, start);

        while next.is_some() && !self.valid_insert_position(asset, ars, prev, next, ars_of) {
            next = prev;
            prev = next.and_then(|n| self.prev(asset, n));
        }

        (prev, next)
    }
}
