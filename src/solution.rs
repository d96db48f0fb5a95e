use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::instance::Instance;

/// Dense id set with O(1) membership, insert, remove, and uniform sampling
/// over its members. `slot[id]` is the member's index in `members`, or
/// `usize::MAX` when absent.
pub struct IdSet {
    members: Vec<usize>,
    slot: Vec<usize>,
}

impl IdSet {
    pub fn new(universe: usize) -> Self {
        IdSet {
            members: Vec::new(),
            slot: vec![usize::MAX; universe],
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.slot[id] != usize::MAX
    }

    pub fn insert(&mut self, id: usize) -> bool {
        if self.contains(id) {
            return false;
        }
        self.slot[id] = self.members.len();
        self.members.push(id);
        true
    }

    pub fn remove(&mut self, id: usize) -> bool {
        let at = self.slot[id];
        if at == usize::MAX {
            return false;
        }
        let last = *self.members.last().unwrap();
        self.members.swap_remove(at);
        if last != id {
            self.slot[last] = at;
        }
        self.slot[id] = usize::MAX;
        true
    }

    /// Members in arbitrary order.
    pub fn as_slice(&self) -> &[usize] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }

    pub fn sorted(&self) -> Vec<usize> {
        let mut v = self.members.clone();
        v.sort_unstable();
        v
    }

    /// Ids in `0..universe` that are not members.
    pub fn complement(&self) -> Vec<usize> {
        (0..self.slot.len()).filter(|&id| !self.contains(id)).collect()
    }

    fn same_members(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self.members.iter().all(|&id| other.contains(id))
    }
}

impl Clone for IdSet {
    fn clone(&self) -> Self {
        IdSet {
            members: self.members.clone(),
            slot: self.slot.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        // reuse existing allocations on the hot rollback path
        self.members.clone_from(&source.members);
        self.slot.clone_from(&source.slot);
    }
}

impl std::fmt::Debug for IdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.sorted()).finish()
    }
}

/// A working wave: chosen orders, chosen aisles, and per-(order,item)
/// coverage counters kept consistent incrementally.
///
/// `coverage[o][slot]` counts the chosen aisles stocking the item at `slot`
/// of order `o`'s demand list. Counters are maintained for every order of the
/// instance (not only chosen ones) so delta evaluation can read them for
/// candidate orders too. `missing[o]` is the number of demand slots still at
/// zero; an order is fully covered iff its missing count is zero.
pub struct Solution {
    pub instance: Arc<Instance>,
    orders_in: IdSet,
    aisles_in: IdSet,
    coverage: Vec<Vec<u32>>,
    missing: Vec<u32>,
    uncovered_chosen: usize,
    picked_units: u64,
    cost: Option<f64>,
    order_version: u64,
    aisle_version: u64,
}

impl Solution {
    pub fn new<O, A>(instance: Arc<Instance>, orders: O, aisles: A) -> Self
    where
        O: IntoIterator<Item = usize>,
        A: IntoIterator<Item = usize>,
    {
        let coverage = instance
            .orders
            .iter()
            .map(|d| vec![0u32; d.len()])
            .collect();
        let missing = instance
            .orders
            .iter()
            .map(|d| u32::try_from(d.len()).unwrap())
            .collect();

        let mut sol = Solution {
            orders_in: IdSet::new(instance.num_orders()),
            aisles_in: IdSet::new(instance.num_aisles()),
            coverage,
            missing,
            uncovered_chosen: 0,
            picked_units: 0,
            cost: None,
            order_version: 0,
            aisle_version: 0,
            instance,
        };
        for o in orders {
            sol.orders_in.insert(o);
        }
        for a in aisles {
            sol.aisles_in.insert(a);
        }
        sol.update_coverage();
        sol
    }

    pub fn orders(&self) -> &IdSet {
        &self.orders_in
    }

    pub fn aisles(&self) -> &IdSet {
        &self.aisles_in
    }

    pub fn contains_order(&self, o: usize) -> bool {
        self.orders_in.contains(o)
    }

    pub fn contains_aisle(&self, a: usize) -> bool {
        self.aisles_in.contains(a)
    }

    pub fn coverage_of(&self, o: usize, slot: usize) -> u32 {
        self.coverage[o][slot]
    }

    pub fn missing_of(&self, o: usize) -> u32 {
        self.missing[o]
    }

    pub fn is_fully_covered(&self, o: usize) -> bool {
        self.missing[o] == 0
    }

    /// Chosen orders that are not fully covered.
    pub fn uncovered_chosen(&self) -> usize {
        self.uncovered_chosen
    }

    pub fn picked_units(&self) -> u64 {
        self.picked_units
    }

    /// The true objective: picked units over visited aisles. Reporting only;
    /// the search steers by the surrogate cost.
    pub fn objective(&self) -> f64 {
        if self.aisles_in.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.picked_units as f64 / self.aisles_in.len() as f64
        }
    }

    /// Last evaluated surrogate cost. Panics if the solution was never
    /// evaluated; that is a driver bug, not a recoverable state.
    pub fn cost(&self) -> f64 {
        self.cost.expect("solution cost was never evaluated")
    }

    pub fn cached_cost(&self) -> Option<f64> {
        self.cost
    }

    pub fn set_cost(&mut self, cost: f64) {
        self.cost = Some(cost);
    }

    /// Bumped on every order-set mutation; guards order-delta caches.
    pub fn order_version(&self) -> u64 {
        self.order_version
    }

    /// Bumped on every aisle-set mutation; guards aisle-delta caches and
    /// memoized simulated-coverage state.
    pub fn aisle_version(&self) -> u64 {
        self.aisle_version
    }

    /// Insert `o` and fold the caller-computed `delta` into the cached cost.
    /// No-op (and `delta` discarded) if already chosen. Coverage counters are
    /// untouched: they depend only on the aisle set.
    pub fn apply_add_order(&mut self, o: usize, delta: f64) -> bool {
        if !self.orders_in.insert(o) {
            return false;
        }
        if self.missing[o] > 0 {
            self.uncovered_chosen += 1;
        }
        self.picked_units += self.instance.order_units[o];
        if let Some(c) = self.cost.as_mut() {
            *c += delta;
        }
        self.order_version += 1;
        self.assert_sanity();
        true
    }

    pub fn apply_remove_order(&mut self, o: usize, delta: f64) -> bool {
        if !self.orders_in.remove(o) {
            return false;
        }
        if self.missing[o] > 0 {
            self.uncovered_chosen -= 1;
        }
        self.picked_units -= self.instance.order_units[o];
        if let Some(c) = self.cost.as_mut() {
            *c += delta;
        }
        self.order_version += 1;
        self.assert_sanity();
        true
    }

    /// Insert aisle `a`, bumping the coverage counter of every (order, slot)
    /// whose item `a` stocks. Counter transitions 0 -> 1 shrink the order's
    /// missing count and may flip a chosen order to covered.
    pub fn apply_add_aisle(&mut self, a: usize, delta: f64) -> bool {
        if !self.aisles_in.insert(a) {
            return false;
        }
        let instance = self.instance.clone();
        for &(item, _) in &instance.aisles[a] {
            for &(o, slot) in &instance.item_orders[item] {
                let c = &mut self.coverage[o][slot];
                *c += 1;
                if *c == 1 {
                    self.missing[o] -= 1;
                    if self.missing[o] == 0 && self.orders_in.contains(o) {
                        self.uncovered_chosen -= 1;
                    }
                }
            }
        }
        if let Some(c) = self.cost.as_mut() {
            *c += delta;
        }
        self.aisle_version += 1;
        self.assert_sanity();
        true
    }

    pub fn apply_remove_aisle(&mut self, a: usize, delta: f64) -> bool {
        if !self.aisles_in.remove(a) {
            return false;
        }
        let instance = self.instance.clone();
        for &(item, _) in &instance.aisles[a] {
            for &(o, slot) in &instance.item_orders[item] {
                let c = &mut self.coverage[o][slot];
                debug_assert!(*c > 0);
                *c -= 1;
                if *c == 0 {
                    self.missing[o] += 1;
                    if self.missing[o] == 1 && self.orders_in.contains(o) {
                        self.uncovered_chosen += 1;
                    }
                }
            }
        }
        if let Some(c) = self.cost.as_mut() {
            *c += delta;
        }
        self.aisle_version += 1;
        self.assert_sanity();
        true
    }

    /// Full recompute of coverage, missing counts, the uncovered-chosen
    /// counter and picked units from the chosen sets. Restores the coverage
    /// invariant unconditionally; used after bulk edits and at drift checks.
    pub fn update_coverage(&mut self) {
        for (o, demand) in self.instance.orders.iter().enumerate() {
            self.coverage[o].iter_mut().for_each(|c| *c = 0);
            self.missing[o] = u32::try_from(demand.len()).unwrap();
        }
        let instance = self.instance.clone();
        for a in self.aisles_in.as_slice().to_vec() {
            for &(item, _) in &instance.aisles[a] {
                for &(o, slot) in &instance.item_orders[item] {
                    let c = &mut self.coverage[o][slot];
                    *c += 1;
                    if *c == 1 {
                        self.missing[o] -= 1;
                    }
                }
            }
        }
        self.uncovered_chosen = self
            .orders_in
            .iter()
            .filter(|&o| self.missing[o] > 0)
            .count();
        self.picked_units = self
            .orders_in
            .iter()
            .map(|o| self.instance.order_units[o])
            .sum();
        self.order_version += 1;
        self.aisle_version += 1;
    }

    pub fn to_report_string(&self) -> String {
        let orders: Vec<String> = self.orders_in.sorted().iter().map(usize::to_string).collect();
        let aisles: Vec<String> = self.aisles_in.sorted().iter().map(usize::to_string).collect();
        format!("orders: {} | aisles: {}", orders.join(" "), aisles.join(" "))
    }

    pub fn to_file_string(&self) -> String {
        let mut res = format!("{}\n", self.objective());
        res.push_str(&format!("{}\n", self.orders_in.len()));
        for o in self.orders_in.sorted() {
            res.push_str(&format!("{o}\n"));
        }
        res.push_str(&format!("{}\n", self.aisles_in.len()));
        for a in self.aisles_in.sorted() {
            res.push_str(&format!("{a}\n"));
        }
        res
    }

    // *********** SANITY CHECKING ***********

    #[cfg(debug_assertions)]
    pub fn assert_sanity(&self) {
        self.check_coverage();
        self.check_counters();
    }

    #[cfg(not(debug_assertions))]
    #[allow(clippy::unused_self)]
    pub fn assert_sanity(&self) {
        // no sanity checking in release mode
    }

    #[allow(dead_code)]
    fn check_coverage(&self) {
        for (o, demand) in self.instance.orders.iter().enumerate() {
            let mut missing = 0u32;
            for (slot, &(item, _)) in demand.iter().enumerate() {
                let expected = self
                    .aisles_in
                    .iter()
                    .filter(|&a| self.instance.aisle_stocks(a, item))
                    .count();
                assert!(
                    self.coverage[o][slot] as usize == expected,
                    "coverage[{o}][{slot}] = {} but {expected} chosen aisles stock item {item}",
                    self.coverage[o][slot]
                );
                if self.coverage[o][slot] == 0 {
                    missing += 1;
                }
            }
            assert!(self.missing[o] == missing);
        }
    }

    #[allow(dead_code)]
    fn check_counters(&self) {
        let uncovered = self
            .orders_in
            .iter()
            .filter(|&o| self.missing[o] > 0)
            .count();
        assert!(self.uncovered_chosen == uncovered);

        let units: u64 = self
            .orders_in
            .iter()
            .map(|o| self.instance.order_units[o])
            .sum();
        assert!(self.picked_units == units);

        let mut seen = HashSet::new();
        for o in self.orders_in.iter() {
            assert!(seen.insert(o));
        }
    }
}

impl Clone for Solution {
    fn clone(&self) -> Self {
        Solution {
            instance: self.instance.clone(),
            orders_in: self.orders_in.clone(),
            aisles_in: self.aisles_in.clone(),
            coverage: self.coverage.clone(),
            missing: self.missing.clone(),
            uncovered_chosen: self.uncovered_chosen,
            picked_units: self.picked_units,
            cost: self.cost,
            order_version: self.order_version,
            aisle_version: self.aisle_version,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        debug_assert!(Arc::ptr_eq(&self.instance, &source.instance));
        self.orders_in.clone_from(&source.orders_in);
        self.aisles_in.clone_from(&source.aisles_in);
        for (mine, theirs) in self.coverage.iter_mut().zip(source.coverage.iter()) {
            mine.copy_from_slice(theirs);
        }
        self.missing.copy_from_slice(&source.missing);
        self.uncovered_chosen = source.uncovered_chosen;
        self.picked_units = source.picked_units;
        self.cost = source.cost;
        self.order_version = source.order_version;
        self.aisle_version = source.aisle_version;
    }
}

impl PartialEq for Solution {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
            && self.orders_in.same_members(&other.orders_in)
            && self.aisles_in.same_members(&other.aisles_in)
    }
}

impl Eq for Solution {}

impl Hash for Solution {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.orders_in.sorted().hash(state);
        self.aisles_in.sorted().hash(state);
    }
}

impl std::fmt::Debug for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "wave[orders: {:?}, aisles: {:?}, uncovered: {}, units: {}]",
            self.orders_in, self.aisles_in, self.uncovered_chosen, self.picked_units
        ))
    }
}
