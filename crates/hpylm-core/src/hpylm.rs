//! The Hierarchical Pitman-Yor Language Model: owns the root [`Node`],
//! per-depth hyperparameters, and drives navigation, probability queries,
//! and hyperparameter resampling over the context tree.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::node::{AuxSums, Node, TokenId};
use crate::persist::{self, HpylmSnapshot};
use crate::sampler::Sampler;

/// Default discount hyperprior shared across depths until
/// [`HPYLM::sample_hyperparams`] has run.
const DEFAULT_A: f64 = 1.0;
const DEFAULT_B: f64 = 1.0;
const DEFAULT_ALPHA: f64 = 1.0;
const DEFAULT_BETA: f64 = 1.0;
const DEFAULT_D: f64 = 0.5;
const DEFAULT_THETA: f64 = 1.0;

/// One instance of the hierarchical Pitman-Yor n-gram model.
///
/// `depth` is fixed at construction (`ngram - 1`); the hyperparameter
/// vectors grow lazily to cover any depth actually observed by
/// [`HPYLM::sample_hyperparams`].
pub struct HPYLM {
    root: Node,
    depth: usize,
    g0: f64,
    d_m: Vec<f64>,
    theta_m: Vec<f64>,
    a_m: Vec<f64>,
    b_m: Vec<f64>,
    alpha_m: Vec<f64>,
    beta_m: Vec<f64>,
}

impl HPYLM {
    /// Build a fresh model of the given n-gram order (`depth = ngram - 1`)
    /// with base distribution `g0`.
    ///
    /// # Panics
    /// Panics if `ngram` is 0.
    #[must_use]
    pub fn new(ngram: usize, g0: f64) -> Self {
        assert!(ngram >= 1, "ngram must be at least 1");
        let depth = ngram - 1;
        let n = depth + 1;
        Self {
            root: Node::new_root(),
            depth,
            g0,
            d_m: vec![DEFAULT_D; n],
            theta_m: vec![DEFAULT_THETA; n],
            a_m: vec![DEFAULT_A; n],
            b_m: vec![DEFAULT_B; n],
            alpha_m: vec![DEFAULT_ALPHA; n],
            beta_m: vec![DEFAULT_BETA; n],
        }
    }

    /// Replace the base distribution. Must be called before any customer is
    /// added if the default is not appropriate.
    pub fn set_g0(&mut self, g0: f64) {
        self.g0 = g0;
    }

    /// Fixed context depth (`ngram - 1`).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn ensure_context(&self, ids: &[TokenId], t: usize) -> Result<()> {
        if t < self.depth {
            return Err(Error::InsufficientContext { needed: self.depth, available: t });
        }
        if t >= ids.len() {
            return Err(Error::InsufficientContext { needed: t + 1, available: ids.len() });
        }
        Ok(())
    }

    /// Walk back from `token_t_index` along up to `depth_t` context tokens,
    /// optionally creating missing nodes, optionally returning the deepest
    /// node reached when the full depth is unavailable.
    #[must_use]
    pub fn find_node_by_tracing_back_context(
        &self,
        ids: &[TokenId],
        token_t_index: usize,
        depth_t: usize,
        create_if_needed: bool,
        return_middle_node: bool,
    ) -> Option<Node> {
        if token_t_index < depth_t {
            return None;
        }
        let mut node = self.root.clone();
        for step in 1..=depth_t {
            let ctx = ids[token_t_index - step];
            match node.find_child(ctx, create_if_needed) {
                Some(child) => node = child,
                None => {
                    return if return_middle_node { Some(node) } else { None };
                }
            }
        }
        Some(node)
    }

    /// Seat one customer for `ids[t]` at the depth-`self.depth` context
    /// ending just before position `t`.
    pub fn add_customer_at_timestep(&self, ids: &[TokenId], t: usize, sampler: &mut Sampler) -> Result<()> {
        self.ensure_context(ids, t)?;
        let node = self
            .find_node_by_tracing_back_context(ids, t, self.depth, true, false)
            .expect("creation path always succeeds");
        node.add_customer(ids[t], self.g0, &self.d_m, &self.theta_m, sampler);
        Ok(())
    }

    /// Remove one customer for `ids[t]` at the depth-`self.depth` context
    /// ending just before position `t`, detaching any node left empty.
    pub fn remove_customer_at_timestep(&self, ids: &[TokenId], t: usize, sampler: &mut Sampler) -> Result<()> {
        self.ensure_context(ids, t)?;
        let node = self
            .find_node_by_tracing_back_context(ids, t, self.depth, false, false)
            .ok_or(Error::MissingNode { timestep: t })?;
        node.remove_customer(ids[t], sampler).ok_or(Error::MissingNode { timestep: t })?;
        self.prune_if_empty(&node);
        Ok(())
    }

    /// Detach `node` (and any now-empty ancestors) from its parent.
    fn prune_if_empty(&self, node: &Node) {
        let mut current = node.clone();
        while current.need_to_remove_from_parent() {
            let Some(parent) = current.parent() else { break };
            let ctx = parent
                .children()
                .into_iter()
                .find(|(_, child)| child.ptr_eq(&current))
                .map(|(id, _)| id);
            if let Some(id) = ctx {
                parent.remove_child(id);
            }
            current = parent;
        }
    }

    /// Predictive probability of `dish` given `context_ids`, via the
    /// streaming descent; `context_ids.len()` must be at least
    /// `self.depth()`.
    pub fn compute_pw_h(&self, dish: TokenId, context_ids: &[TokenId]) -> Result<f64> {
        if context_ids.len() < self.depth {
            return Err(Error::InsufficientContext { needed: self.depth, available: context_ids.len() });
        }
        let mut node = self.root.clone();
        let mut parent_pw = self.g0;
        for depth in 1..=self.depth {
            // Context index is derived from the window length rather than
            // a fixed constant, so this descent works for any ngram order.
            let ctx_idx = context_ids.len() - depth;
            match node.find_child(context_ids[ctx_idx], false) {
                Some(child) => {
                    parent_pw = node.compute_pw_streaming(dish, parent_pw, &self.d_m, &self.theta_m);
                    node = child;
                }
                None => break,
            }
        }
        Ok(node.compute_pw_streaming(dish, parent_pw, &self.d_m, &self.theta_m))
    }

    /// `compute_pw_h` evaluated via the recursive reference form instead of
    /// the streaming descent; used to cross-check the two forms agree.
    #[must_use]
    pub fn compute_pw_h_reference(&self, dish: TokenId, context_ids: &[TokenId]) -> Option<f64> {
        if context_ids.len() < self.depth {
            return None;
        }
        let node = self.find_node_by_tracing_back_context(context_ids, context_ids.len(), self.depth, false, true)?;
        Some(node.compute_pw(dish, self.g0, &self.d_m, &self.theta_m))
    }

    /// Probability of a full token sequence under a sliding `depth`-length
    /// window. Guards against `sequence.len() <= depth`.
    pub fn compute_pw(&self, sequence: &[TokenId]) -> Result<f64> {
        if sequence.len() <= self.depth {
            return Err(Error::InsufficientContext { needed: self.depth + 1, available: sequence.len() });
        }
        let mut p = 1.0;
        for t in self.depth..sequence.len() {
            p *= self.compute_pw_h(sequence[t], &sequence[..t])?;
        }
        Ok(p)
    }

    /// Natural-log probability of a sequence, with an epsilon floor to
    /// guard against `ln(0)`.
    pub fn compute_log_pw(&self, sequence: &[TokenId]) -> Result<f64> {
        if sequence.len() <= self.depth {
            return Err(Error::InsufficientContext { needed: self.depth + 1, available: sequence.len() });
        }
        let mut log_p = 0.0;
        for t in self.depth..sequence.len() {
            let p = self.compute_pw_h(sequence[t], &sequence[..t])?;
            log_p += (p + 1e-10).ln();
        }
        Ok(log_p)
    }

    /// Base-2 log probability of a sequence, with the same epsilon floor.
    pub fn compute_log2_pw(&self, sequence: &[TokenId]) -> Result<f64> {
        if sequence.len() <= self.depth {
            return Err(Error::InsufficientContext { needed: self.depth + 1, available: sequence.len() });
        }
        let mut log_p = 0.0;
        for t in self.depth..sequence.len() {
            let p = self.compute_pw_h(sequence[t], &sequence[..t])?;
            log_p += (p + 1e-10).log2();
        }
        Ok(log_p)
    }

    /// Resample `d_m` and `theta_m` from their auxiliary-variable posteriors
    /// (Teh 2006, Appendix C).
    pub fn sample_hyperparams(&mut self, sampler: &mut Sampler) {
        let mut per_depth: Vec<AuxSums> = Vec::new();
        self.root.accumulate_auxiliary_sums(&self.d_m, &self.theta_m, sampler, &mut per_depth);

        let observed_depth = per_depth.len().saturating_sub(1);
        self.grow_hyperparams_to(observed_depth);

        for (m, sums) in per_depth.iter().enumerate() {
            let d = sampler.beta(self.a_m[m] + sums.sum_one_minus_y, self.b_m[m] + sums.sum_one_minus_z);
            let rate = (self.beta_m[m] - sums.sum_log_x).max(1e-6);
            let theta = sampler.gamma(self.alpha_m[m] + sums.sum_y, rate);
            self.d_m[m] = d.clamp(1e-6, 1.0 - 1e-6);
            self.theta_m[m] = theta.max(-self.d_m[m] + 1e-6);
        }

        debug!(observed_depth, "resampled HPYLM hyperparameters");
        self.truncate_hyperparams_to(observed_depth);
    }

    fn grow_hyperparams_to(&mut self, max_depth: usize) {
        let needed = max_depth + 1;
        while self.d_m.len() < needed {
            self.d_m.push(DEFAULT_D);
            self.theta_m.push(DEFAULT_THETA);
            self.a_m.push(DEFAULT_A);
            self.b_m.push(DEFAULT_B);
            self.alpha_m.push(DEFAULT_ALPHA);
            self.beta_m.push(DEFAULT_BETA);
        }
    }

    fn truncate_hyperparams_to(&mut self, max_depth: usize) {
        let needed = (max_depth + 1).max(self.depth + 1);
        self.d_m.truncate(needed);
        self.theta_m.truncate(needed);
        self.a_m.truncate(needed);
        self.b_m.truncate(needed);
        self.alpha_m.truncate(needed);
        self.beta_m.truncate(needed);
    }

    /// Total nodes in the context tree, including the root.
    #[must_use]
    pub fn get_num_nodes(&self) -> usize {
        self.root.count_nodes()
    }

    /// Total seated customers across the whole tree.
    #[must_use]
    pub fn get_num_customers(&self) -> u32 {
        fn walk(node: &Node) -> u32 {
            node.num_customers_total() + node.children().iter().map(|(_, c)| walk(c)).sum::<u32>()
        }
        walk(&self.root)
    }

    /// Total occupied tables across the whole tree.
    #[must_use]
    pub fn get_num_tables(&self) -> u32 {
        fn walk(node: &Node) -> u32 {
            node.num_tables_total() + node.children().iter().map(|(_, c)| walk(c)).sum::<u32>()
        }
        walk(&self.root)
    }

    /// Deepest node level actually present in the tree.
    #[must_use]
    pub fn get_max_depth(&self) -> usize {
        self.root.max_depth()
    }

    /// Total seated customers at each depth, indexed `0..=get_max_depth()`.
    #[must_use]
    pub fn count_tokens_by_depth(&self) -> Vec<u32> {
        fn walk(node: &Node, counts: &mut Vec<u32>) {
            let depth = node.depth();
            if counts.len() <= depth {
                counts.resize(depth + 1, 0);
            }
            counts[depth] += node.num_customers_total();
            for (_, child) in node.children() {
                walk(&child, counts);
            }
        }
        let mut counts = Vec::new();
        walk(&self.root, &mut counts);
        counts
    }

    /// Sum of every node's VPYLM stop counter across the tree. Always 0 for
    /// a fixed-depth HPYLM, which never increments it; kept for forward
    /// compatibility with a variable-order extension.
    #[must_use]
    pub fn get_sum_stop_counts(&self) -> u64 {
        fn walk(node: &Node) -> u64 {
            u64::from(node.get_stop_count()) + node.children().iter().map(|(_, c)| walk(c)).sum::<u64>()
        }
        walk(&self.root)
    }

    /// Sum of every node's VPYLM pass counter across the tree. Always 0 for
    /// a fixed-depth HPYLM.
    #[must_use]
    pub fn get_sum_pass_counts(&self) -> u64 {
        fn walk(node: &Node) -> u64 {
            u64::from(node.get_pass_count()) + node.children().iter().map(|(_, c)| walk(c)).sum::<u64>()
        }
        walk(&self.root)
    }

    /// Current discount vector, one entry per depth.
    #[must_use]
    pub fn d_m(&self) -> &[f64] {
        &self.d_m
    }

    /// Current concentration vector, one entry per depth.
    #[must_use]
    pub fn theta_m(&self) -> &[f64] {
        &self.theta_m
    }

    /// Base distribution probability.
    #[must_use]
    pub fn g0(&self) -> f64 {
        self.g0
    }

    /// Ranked `(dish, customer_count)` pairs at the root, descending by
    /// count, for callers that want to print or log the most frequent
    /// dishes seated directly at a restaurant.
    #[must_use]
    pub fn top_dishes_at_root(&self, limit: usize) -> Vec<(TokenId, u32)> {
        let mut dishes: Vec<(TokenId, u32)> = self
            .root
            .dish_ids()
            .into_iter()
            .map(|dish| (dish, self.root.num_customers_for(dish)))
            .collect();
        dishes.sort_by(|a, b| b.1.cmp(&a.1));
        dishes.truncate(limit);
        dishes
    }

    /// Serializable snapshot of this model.
    #[must_use]
    pub fn to_snapshot(&self) -> HpylmSnapshot {
        HpylmSnapshot {
            format_version: persist::FORMAT_VERSION,
            depth: self.depth,
            g0: self.g0,
            d_m: self.d_m.clone(),
            theta_m: self.theta_m.clone(),
            a_m: self.a_m.clone(),
            b_m: self.b_m.clone(),
            alpha_m: self.alpha_m.clone(),
            beta_m: self.beta_m.clone(),
            root: self.root.to_snapshot(),
        }
    }

    /// Rebuild a model from a snapshot.
    ///
    /// # Errors
    /// Returns [`Error::InvariantViolation`] if the snapshot's context tree
    /// carries a corrupted arrangement (see [`Node::from_snapshot`]).
    pub fn from_snapshot(snapshot: HpylmSnapshot) -> Result<Self> {
        Ok(Self {
            root: Node::from_snapshot(&snapshot.root, None)?,
            depth: snapshot.depth,
            g0: snapshot.g0,
            d_m: snapshot.d_m,
            theta_m: snapshot.theta_m,
            a_m: snapshot.a_m,
            b_m: snapshot.b_m,
            alpha_m: snapshot.alpha_m,
            beta_m: snapshot.beta_m,
        })
    }

    /// Persist this model to `path` (JSON or CBOR, by extension).
    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_snapshot(path, &self.to_snapshot())
    }

    /// Load a model previously written by [`HPYLM::save`].
    pub fn load(path: &Path) -> Result<Self> {
        persist::read_snapshot(path).and_then(Self::from_snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_context_rejected() {
        let model = HPYLM::new(3, 1.0 / 3.0);
        let mut sampler = Sampler::seeded(1);
        let ids = vec![0_u32, 1];
        let err = model.add_customer_at_timestep(&ids, 1, &mut sampler).unwrap_err();
        assert!(matches!(err, Error::InsufficientContext { .. }));
    }

    #[test]
    fn scenario_trigram_repeated_zero_exceeds_g0() {
        // ngram = 3, vocab = {0, 1}, g0 = 0.5.
        let model = HPYLM::new(3, 0.5);
        let mut sampler = Sampler::seeded(13);
        let ids = vec![0_u32; 8];
        for t in 2..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        let p0 = model.compute_pw_h(0, &[0, 0]).unwrap();
        assert!(p0 > 0.5, "expected P(0|0,0)={p0} > g0=0.5");
    }

    #[test]
    fn boundary_single_token_vocabulary_is_a_probability() {
        let model = HPYLM::new(2, 1.0);
        let mut sampler = Sampler::seeded(2);
        let ids = vec![0_u32, 0, 0];
        for t in 1..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        let p = model.compute_pw_h(0, &[0]).unwrap();
        assert!((0.0..=1.0).contains(&p), "p={p} escaped [0,1]");
    }

    #[test]
    fn boundary_timestep_equal_to_depth_is_legal() {
        let model = HPYLM::new(2, 0.5);
        let mut sampler = Sampler::seeded(4);
        let ids = vec![0_u32, 1];
        model.add_customer_at_timestep(&ids, 1, &mut sampler).unwrap();
        assert_eq!(model.get_num_customers(), 1);
    }

    #[test]
    fn scenario_bigram_three_symbol_vocab() {
        // ngram = 2, vocab = {0, 1, 2}, g0 = 1/3.
        let model = HPYLM::new(2, 1.0 / 3.0);
        let mut sampler = Sampler::seeded(5);
        let ids = vec![0_u32, 1, 0, 1, 0, 1];
        for t in 1..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        assert_eq!(model.get_num_customers(), 5);
        assert!(model.get_num_tables() >= 2);
        let p1 = model.compute_pw_h(1, &[0]).unwrap();
        let p2 = model.compute_pw_h(2, &[0]).unwrap();
        assert!(p1 > p2, "expected P(1|0)={p1} > P(2|0)={p2}");
    }

    #[test]
    fn scenario_bigram_round_trip_empties_tree() {
        // Undo the bigram three-symbol-vocab scenario in reverse order.
        let model = HPYLM::new(2, 1.0 / 3.0);
        let mut sampler = Sampler::seeded(5);
        let ids = vec![0_u32, 1, 0, 1, 0, 1];
        for t in 1..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        for t in (1..ids.len()).rev() {
            model.remove_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        assert_eq!(model.get_num_customers(), 0);
        assert_eq!(model.get_num_nodes(), 1);
        assert_eq!(model.get_num_tables(), 0);
    }

    #[test]
    fn streaming_and_reference_forms_agree() {
        let model = HPYLM::new(3, 0.5);
        let mut sampler = Sampler::seeded(9);
        let ids = vec![0_u32, 1, 0, 1, 0, 1, 0];
        for t in 2..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        let ctx = &ids[ids.len() - 2..];
        for dish in [0_u32, 1] {
            let streaming = model.compute_pw_h(dish, ctx).unwrap();
            let reference = model.compute_pw_h_reference(dish, ctx).unwrap();
            assert!((streaming - reference).abs() < 1e-9, "{streaming} vs {reference}");
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let model = HPYLM::new(2, 1.0 / 3.0);
        let mut sampler = Sampler::seeded(3);
        let ids = vec![0_u32, 1, 0, 2];
        for t in 1..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        let snapshot = model.to_snapshot();
        let reloaded = HPYLM::from_snapshot(snapshot).unwrap();
        for dish in [0_u32, 1, 2] {
            let a = model.compute_pw_h(dish, &[0]).unwrap();
            let b = reloaded.compute_pw_h(dish, &[0]).unwrap();
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn corrupted_snapshot_is_rejected_as_invariant_violation() {
        let model = HPYLM::new(2, 1.0 / 3.0);
        let mut sampler = Sampler::seeded(3);
        let ids = vec![0_u32, 1, 0, 2];
        for t in 1..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        let mut snapshot = model.to_snapshot();
        snapshot.root.arrangement.push((99, vec![0]));
        let err = HPYLM::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation { .. }));
    }

    #[test]
    fn count_tokens_by_depth_matches_total_customers() {
        let model = HPYLM::new(3, 0.5);
        let mut sampler = Sampler::seeded(6);
        let ids = vec![0_u32, 1, 0, 1, 0, 1];
        for t in 2..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        let by_depth = model.count_tokens_by_depth();
        assert_eq!(by_depth.iter().sum::<u32>(), model.get_num_customers());
        assert!(by_depth.len() <= model.get_max_depth() + 1);
    }

    #[test]
    fn stop_and_pass_counters_are_unused_by_fixed_depth_hpylm() {
        let model = HPYLM::new(2, 0.5);
        let mut sampler = Sampler::seeded(8);
        let ids = vec![0_u32, 1, 0, 1];
        for t in 1..ids.len() {
            model.add_customer_at_timestep(&ids, t, &mut sampler).unwrap();
        }
        assert_eq!(model.get_sum_stop_counts(), 0);
        assert_eq!(model.get_sum_pass_counts(), 0);
    }
}
