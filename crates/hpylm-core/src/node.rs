//! A single Chinese Restaurant Process (CRP) restaurant: one context node
//! in the hierarchical Pitman-Yor tree.
//!
//! Parent/child links form a small cyclic graph, so nodes are
//! reference-counted with a non-owning `Weak` back-reference to the
//! parent. Depth `0` is always the root and has no parent.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::Sampler;

/// A token or context identifier.
pub type TokenId = u32;

struct Inner {
    depth: usize,
    parent: Option<Weak<RefCell<Inner>>>,
    children: HashMap<TokenId, Node>,
    /// dish -> per-table customer counts. Every vector is non-empty and
    /// every entry is >= 1.
    arrangement: HashMap<TokenId, Vec<u32>>,
    /// Stop/pass counters for a variable-order (VPYLM) extension. The
    /// fixed-depth HPYLM never increments these; they exist only so a future
    /// VPYLM can reuse this `Node` type without a breaking change.
    stop_count: u32,
    pass_count: u32,
}

/// Aggregated auxiliary-variable contributions of one node, used by
/// [`crate::HPYLM::sample_hyperparams`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuxSums {
    /// Sum of `log(x_u)` over this node's draws.
    pub sum_log_x: f64,
    /// Sum of `y_{u,i}` (table-is-new Bernoulli draws).
    pub sum_y: f64,
    /// Sum of `1 - y_{u,i}`.
    pub sum_one_minus_y: f64,
    /// Sum of `1 - z_{u,w,k,j}` (seated-customer Bernoulli draws).
    pub sum_one_minus_z: f64,
}

impl AuxSums {
    fn add(&mut self, other: AuxSums) {
        self.sum_log_x += other.sum_log_x;
        self.sum_y += other.sum_y;
        self.sum_one_minus_y += other.sum_one_minus_y;
        self.sum_one_minus_z += other.sum_one_minus_z;
    }
}

/// A restaurant in the hierarchical Pitman-Yor context tree.
///
/// Cheap to clone: it is a handle (`Rc`) to shared, interior-mutable state.
#[derive(Clone)]
pub struct Node(Rc<RefCell<Inner>>);

impl Node {
    /// Construct a fresh root (depth 0, no parent).
    #[must_use]
    pub fn new_root() -> Self {
        Self(Rc::new(RefCell::new(Inner {
            depth: 0,
            parent: None,
            children: HashMap::new(),
            arrangement: HashMap::new(),
            stop_count: 0,
            pass_count: 0,
        })))
    }

    fn new_child(parent: &Node) -> Self {
        let depth = parent.0.borrow().depth + 1;
        Self(Rc::new(RefCell::new(Inner {
            depth,
            parent: Some(Rc::downgrade(&parent.0)),
            children: HashMap::new(),
            arrangement: HashMap::new(),
            stop_count: 0,
            pass_count: 0,
        })))
    }

    /// Depth of this node; the root is depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.borrow().depth
    }

    /// The parent node, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.as_ref().and_then(Weak::upgrade).map(Node)
    }

    /// Look up (optionally creating) the child reached via `context_id`.
    #[must_use]
    pub fn find_child(&self, context_id: TokenId, create_if_needed: bool) -> Option<Node> {
        if let Some(child) = self.0.borrow().children.get(&context_id) {
            return Some(child.clone());
        }
        if !create_if_needed {
            return None;
        }
        let child = Node::new_child(self);
        self.0.borrow_mut().children.insert(context_id, child.clone());
        Some(child)
    }

    /// All direct children, as `(context_id, child)` pairs.
    pub fn children(&self) -> Vec<(TokenId, Node)> {
        self.0.borrow().children.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Number of direct children.
    #[must_use]
    pub fn num_children(&self) -> usize {
        self.0.borrow().children.len()
    }

    /// Total seated customers for `dish` at this node.
    #[must_use]
    pub fn num_customers_for(&self, dish: TokenId) -> u32 {
        self.0.borrow().arrangement.get(&dish).map_or(0, |tables| tables.iter().sum())
    }

    /// Total seated customers across all dishes at this node.
    #[must_use]
    pub fn num_customers_total(&self) -> u32 {
        self.0.borrow().arrangement.values().map(|tables| tables.iter().sum::<u32>()).sum()
    }

    /// Number of occupied tables serving `dish` at this node.
    #[must_use]
    pub fn num_tables_for(&self, dish: TokenId) -> u32 {
        self.0.borrow().arrangement.get(&dish).map_or(0, |t| t.len() as u32)
    }

    /// Total occupied tables across all dishes at this node.
    #[must_use]
    pub fn num_tables_total(&self) -> u32 {
        self.0.borrow().arrangement.values().map(|t| t.len() as u32).sum()
    }

    /// True when this node has no seated customers and no children: a
    /// candidate for detachment from its parent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.0.borrow();
        inner.arrangement.is_empty() && inner.children.is_empty()
    }

    /// True when this (non-root) node has become a candidate for detachment
    /// from its parent: no seated customers and no children.
    #[must_use]
    pub fn need_to_remove_from_parent(&self) -> bool {
        self.depth() > 0 && self.is_empty()
    }

    /// Detach the child reached via `context_id`, if present.
    pub fn remove_child(&self, context_id: TokenId) {
        self.0.borrow_mut().children.remove(&context_id);
    }

    /// Identity comparison: true iff both handles point at the same
    /// restaurant (not merely an equal-looking one).
    #[must_use]
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The dish ids currently seated at this node.
    #[must_use]
    pub fn dish_ids(&self) -> Vec<TokenId> {
        self.0.borrow().arrangement.keys().copied().collect()
    }

    /// Current stop-counter value (VPYLM forward compatibility; unused by
    /// the fixed-depth HPYLM).
    #[must_use]
    pub fn get_stop_count(&self) -> u32 {
        self.0.borrow().stop_count
    }

    /// Current pass-counter value (VPYLM forward compatibility; unused by
    /// the fixed-depth HPYLM).
    #[must_use]
    pub fn get_pass_count(&self) -> u32 {
        self.0.borrow().pass_count
    }

    /// Increment the stop counter by one. Never called by [`crate::HPYLM`];
    /// reserved for a future VPYLM that stops its descent at this node.
    pub fn increment_stop_count(&self) {
        self.0.borrow_mut().stop_count += 1;
    }

    /// Increment the pass counter by one. Never called by [`crate::HPYLM`];
    /// reserved for a future VPYLM that passes through this node.
    pub fn increment_pass_count(&self) {
        self.0.borrow_mut().pass_count += 1;
    }

    /// Probability this node assigns `dish` under its own parent chain, via
    /// the recursive reference form:
    ///
    /// `P_u(w) = (c_u(w) - d*t_u(w)) / (theta + c_u)
    ///          + ((theta + d*t_u) / (theta + c_u)) * P_parent(w)`
    ///
    /// with `P_root_parent(w) = g0`.
    #[must_use]
    pub fn compute_pw(&self, dish: TokenId, g0: f64, d_m: &[f64], theta_m: &[f64]) -> f64 {
        let parent_pw = match self.parent() {
            Some(p) => p.compute_pw(dish, g0, d_m, theta_m),
            None => g0,
        };
        self.compute_pw_streaming(dish, parent_pw, d_m, theta_m)
    }

    /// Single-level predictive probability given an already-computed parent
    /// probability — the "streaming" form used by
    /// [`crate::HPYLM::compute_pw_h`] to avoid re-walking the tree for every
    /// ancestor.
    #[must_use]
    pub fn compute_pw_streaming(&self, dish: TokenId, parent_pw: f64, d_m: &[f64], theta_m: &[f64]) -> f64 {
        let depth = self.depth();
        let d = d_m[depth];
        let theta = theta_m[depth];
        let c_u = f64::from(self.num_customers_total());
        let t_u = f64::from(self.num_tables_total());
        let c_uw = f64::from(self.num_customers_for(dish));
        let t_uw = f64::from(self.num_tables_for(dish));

        let denom = theta + c_u;
        if denom <= 0.0 {
            return parent_pw;
        }
        let discounted = (c_uw - d * t_uw).max(0.0);
        let strength = theta + d * t_u;
        discounted / denom + (strength / denom) * parent_pw
    }

    /// Seat a new customer for `dish`. Returns whether a new table was
    /// opened (which also recursively seated one customer for `dish` at the
    /// parent restaurant, per the Chinese restaurant franchise coupling
    /// between child and parent restaurants).
    pub fn add_customer(
        &self,
        dish: TokenId,
        g0: f64,
        d_m: &[f64],
        theta_m: &[f64],
        sampler: &mut Sampler,
    ) -> bool {
        let has_dish = self.0.borrow().arrangement.contains_key(&dish);
        if !has_dish {
            self.open_new_table(dish, g0, d_m, theta_m, sampler);
            return true;
        }

        let depth = self.depth();
        let d = d_m[depth];
        let theta = theta_m[depth];
        let t_u = f64::from(self.num_tables_total());
        let parent_pw = match self.parent() {
            Some(p) => p.compute_pw(dish, g0, d_m, theta_m),
            None => g0,
        };

        let table_counts = self.0.borrow().arrangement.get(&dish).cloned().unwrap_or_default();
        let mut weights: Vec<f64> = table_counts.iter().map(|&n| (f64::from(n) - d).max(0.0)).collect();
        let new_table_weight = (theta + d * t_u) * parent_pw;
        weights.push(new_table_weight);

        let total: f64 = weights.iter().sum();
        let pick = if total <= 0.0 {
            weights.len() - 1
        } else {
            let mut r = sampler.uniform() * total;
            let mut chosen = weights.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if r < *w {
                    chosen = i;
                    break;
                }
                r -= w;
            }
            chosen
        };

        if pick == weights.len() - 1 {
            self.open_new_table(dish, g0, d_m, theta_m, sampler);
            true
        } else {
            let mut inner = self.0.borrow_mut();
            inner.arrangement.get_mut(&dish).expect("dish present")[pick] += 1;
            false
        }
    }

    fn open_new_table(&self, dish: TokenId, g0: f64, d_m: &[f64], theta_m: &[f64], sampler: &mut Sampler) {
        self.0.borrow_mut().arrangement.entry(dish).or_default().push(1);
        if let Some(parent) = self.parent() {
            parent.add_customer(dish, g0, d_m, theta_m, sampler);
        }
    }

    /// Remove one customer for `dish`, chosen uniformly weighted by
    /// per-table occupancy. Returns `Some(removed_table)` on success, where
    /// `removed_table` indicates the chosen table was vacated (which also
    /// recursively removed one customer for `dish` at the parent). Returns
    /// `None` if `dish` is not seated here at all.
    pub fn remove_customer(&self, dish: TokenId, sampler: &mut Sampler) -> Option<bool> {
        let table_counts = self.0.borrow().arrangement.get(&dish)?.clone();
        let total: u32 = table_counts.iter().sum();
        if total == 0 {
            return None;
        }
        let mut r = sampler.uniform_int(1, i64::from(total));
        let mut idx = 0;
        for (i, &n) in table_counts.iter().enumerate() {
            r -= i64::from(n);
            if r <= 0 {
                idx = i;
                break;
            }
        }

        let mut table_emptied = false;
        {
            let mut inner = self.0.borrow_mut();
            let tables = inner.arrangement.get_mut(&dish).expect("dish present");
            tables[idx] -= 1;
            if tables[idx] == 0 {
                tables.remove(idx);
                table_emptied = true;
            }
            if tables.is_empty() {
                inner.arrangement.remove(&dish);
            }
        }

        if table_emptied {
            if let Some(parent) = self.parent() {
                parent.remove_customer(dish, sampler);
            }
        }
        Some(table_emptied)
    }

    /// Per-node auxiliary-variable contribution for hyperparameter
    /// resampling. `d` and `theta` are this node's depth's current
    /// hyperparameters.
    pub fn auxiliary_sums(&self, d: f64, theta: f64, sampler: &mut Sampler) -> AuxSums {
        let mut sums = AuxSums::default();
        let c_u = self.num_customers_total();
        if c_u >= 2 {
            // x_u ~ Beta(theta + 1, c_u - 1); skipped below c_u = 2 per the
            // Open Question 3 resolution (no well-defined draw otherwise).
            let x_u = sampler.beta(theta + 1.0, f64::from(c_u - 1));
            sums.sum_log_x += x_u.ln();
        }

        let t_u = self.num_tables_total();
        for i in 1..=t_u {
            let p = theta / (theta + d * f64::from(i));
            if sampler.bernoulli(p) {
                sums.sum_y += 1.0;
            } else {
                sums.sum_one_minus_y += 1.0;
            }
        }

        let inner = self.0.borrow();
        for tables in inner.arrangement.values() {
            for &n in tables {
                for j in 1..n {
                    let p = (f64::from(j) - 1.0) / (f64::from(j) - d);
                    let p = p.clamp(0.0, 1.0);
                    if !sampler.bernoulli(p) {
                        sums.sum_one_minus_z += 1.0;
                    }
                }
            }
        }
        sums
    }

    /// Recursively accumulate auxiliary sums for this node and its entire
    /// subtree into `per_depth`, extending it as deeper nodes are found.
    pub fn accumulate_auxiliary_sums(
        &self,
        d_m: &[f64],
        theta_m: &[f64],
        sampler: &mut Sampler,
        per_depth: &mut Vec<AuxSums>,
    ) {
        let depth = self.depth();
        if depth >= d_m.len() {
            // No hyperparameters yet for this depth: treat as freshly
            // initialized defaults by the caller before recursing further.
            return;
        }
        while per_depth.len() <= depth {
            per_depth.push(AuxSums::default());
        }
        let sums = self.auxiliary_sums(d_m[depth], theta_m[depth], sampler);
        per_depth[depth].add(sums);

        for (_, child) in self.children() {
            child.accumulate_auxiliary_sums(d_m, theta_m, sampler, per_depth);
        }
    }

    /// Count nodes in this subtree (inclusive of `self`).
    #[must_use]
    pub fn count_nodes(&self) -> usize {
        1 + self.children().iter().map(|(_, c)| c.count_nodes()).sum::<usize>()
    }

    /// Maximum depth reached in this subtree (inclusive of `self`).
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.children()
            .iter()
            .map(|(_, c)| c.max_depth())
            .max()
            .unwrap_or_else(|| self.depth())
    }

    /// Serializable snapshot of this subtree.
    #[must_use]
    pub fn to_snapshot(&self) -> crate::persist::NodeSnapshot {
        let inner = self.0.borrow();
        crate::persist::NodeSnapshot {
            arrangement: inner.arrangement.clone().into_iter().collect(),
            children: inner
                .children
                .iter()
                .map(|(id, child)| (*id, child.to_snapshot()))
                .collect(),
        }
    }

    /// Rebuild a subtree from a snapshot, wiring up parent links.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvariantViolation`] if any node's arrangement
    /// carries an empty per-dish table vector or a zero-count table — a sign
    /// of a corrupted or hand-edited snapshot.
    pub fn from_snapshot(
        snapshot: &crate::persist::NodeSnapshot,
        parent: Option<&Node>,
    ) -> crate::error::Result<Node> {
        let depth = parent.map_or(0, |p| p.depth() + 1);
        for (dish, tables) in &snapshot.arrangement {
            if tables.is_empty() {
                return Err(crate::error::Error::InvariantViolation {
                    depth,
                    detail: format!("dish {dish} has an empty table vector"),
                });
            }
            if tables.iter().any(|&n| n == 0) {
                return Err(crate::error::Error::InvariantViolation {
                    depth,
                    detail: format!("dish {dish} has a zero-count table"),
                });
            }
        }
        let node = Node(Rc::new(RefCell::new(Inner {
            depth,
            parent: parent.map(|p| Rc::downgrade(&p.0)),
            children: HashMap::new(),
            arrangement: snapshot.arrangement.iter().cloned().collect(),
            stop_count: 0,
            pass_count: 0,
        })));
        for (id, child_snapshot) in &snapshot.children {
            let child = Node::from_snapshot(child_snapshot, Some(&node))?;
            node.0.borrow_mut().children.insert(*id, child);
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_root_has_no_parent_and_depth_zero() {
        let root = Node::new_root();
        assert_eq!(root.depth(), 0);
        assert!(root.parent().is_none());
        assert!(root.is_empty());
    }

    #[test]
    fn add_then_remove_customer_round_trips() {
        let root = Node::new_root();
        let mut sampler = Sampler::seeded(11);
        let d_m = vec![0.5];
        let theta_m = vec![1.0];
        root.add_customer(3, 0.25, &d_m, &theta_m, &mut sampler);
        assert_eq!(root.num_customers_total(), 1);
        let removed = root.remove_customer(3, &mut sampler);
        assert_eq!(removed, Some(true));
        assert_eq!(root.num_customers_total(), 0);
        assert!(root.is_empty());
    }

    #[test]
    fn find_child_creates_and_reuses() {
        let root = Node::new_root();
        assert!(root.find_child(5, false).is_none());
        let c1 = root.find_child(5, true).unwrap();
        let c2 = root.find_child(5, true).unwrap();
        assert_eq!(c1.depth(), 1);
        assert_eq!(root.num_children(), 1);
        c1.add_customer(9, 0.5, &[0.5, 0.5], &[1.0, 1.0], &mut Sampler::seeded(3));
        assert_eq!(c2.num_customers_total(), 1);
    }
}
