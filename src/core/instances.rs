//! Per-node container-instance bookkeeping.
//!
//! Every node owns exactly one strategy, selected at construction and never
//! re-tagged. Strategies answer two questions: which instances exist, in what
//! order, and which of them participate in unfiltered ("default") operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Instance id used by the `Single` strategy.
pub const SINGLE_ID: &str = "single";

/// One concrete (or to-be-created) container identity belonging to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    /// Included in operations when no explicit filter is given.
    pub default: bool,
}

impl Instance {
    fn new(id: impl Into<String>, default: bool) -> Self {
        Self {
            id: id.into(),
            default,
        }
    }
}

/// Deterministic external container name for an instance.
pub fn machine_name(project: &str, node: &str, instance_id: &str) -> String {
    format!("{}_{}_{}", project, node, instance_id)
}

/// How many concrete container instances a node owns and how they are named.
#[derive(Debug)]
pub enum InstanceStrategy {
    /// Exactly one instance with a fixed id, always default.
    Single,
    /// A caller-supplied ordered list of instance names, all default.
    Fixed { names: Vec<String> },
    /// Ids `"0"…"maximum-1"`; the first `initial` are default, the rest are
    /// inactive slots that scale-up activates. Invariant: initial <= maximum.
    Scaled { initial: usize, maximum: usize },
    /// No pre-existing instances; each run mints a transient one. Minted
    /// instances are not tracked and never show up in `instances_order`.
    Temporary { seq: AtomicU64 },
}

impl InstanceStrategy {
    pub fn single() -> Self {
        Self::Single
    }

    pub fn fixed(names: Vec<String>) -> Self {
        Self::Fixed { names }
    }

    pub fn scaled(initial: usize, maximum: usize) -> Self {
        debug_assert!(initial <= maximum);
        Self::Scaled { initial, maximum }
    }

    pub fn temporary() -> Self {
        Self::Temporary {
            seq: AtomicU64::new(0),
        }
    }

    /// Ordered list of this node's instances: insertion order for
    /// Fixed/Single, numeric order for Scaled, empty for Temporary.
    pub fn instances_order(&self) -> Vec<Instance> {
        match self {
            Self::Single => vec![Instance::new(SINGLE_ID, true)],
            Self::Fixed { names } => names
                .iter()
                .map(|name| Instance::new(name.clone(), true))
                .collect(),
            Self::Scaled { initial, maximum } => (0..*maximum)
                .map(|i| Instance::new(i.to_string(), i < *initial))
                .collect(),
            Self::Temporary { .. } => Vec::new(),
        }
    }

    /// Look up an instance by id. The empty id means "don't care, give me
    /// the default": it resolves to the first default instance, which on
    /// Single is the sole instance.
    pub fn instance(&self, id: &str) -> Option<Instance> {
        if id.is_empty() {
            return self.instances_order().into_iter().find(|i| i.default);
        }
        self.instances_order().into_iter().find(|i| i.id == id)
    }

    /// Mint a transient instance for a `run` invocation. Returns `None` for
    /// every strategy but Temporary. The caller is expected to destroy the
    /// instance's container after use; the strategy does not track it.
    pub fn create_temporary(&self, id: Option<&str>) -> Option<Instance> {
        match self {
            Self::Temporary { seq } => {
                let id = match id {
                    Some(id) if !id.is_empty() => id.to_string(),
                    _ => format!("run-{}", seq.fetch_add(1, Ordering::Relaxed) + 1),
                };
                Some(Instance::new(id, true))
            }
            _ => None,
        }
    }
}

/// Filter mode of an [`InstanceFilter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Default,
    All,
    Explicit(Vec<String>),
}

/// A filterable view over a node's instance strategy.
///
/// Starts in default mode (only default instances). `use_all` switches to
/// unfiltered. `add_filters` switches to explicit mode; adding an
/// already-present id is a no-op, and selection preserves filter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    mode: Mode,
}

impl InstanceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to unfiltered mode: every instance, default or not.
    pub fn use_all(&mut self) {
        self.mode = Mode::All;
    }

    /// Switch to explicit mode and accumulate filter ids. Idempotent.
    pub fn add_filters<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut list = match std::mem::take(&mut self.mode) {
            Mode::Explicit(list) => list,
            _ => Vec::new(),
        };
        for id in ids {
            if !list.contains(&id) {
                list.push(id);
            }
        }
        self.mode = Mode::Explicit(list);
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self.mode, Mode::Explicit(_))
    }

    /// Explicit filter ids, in filter order. Empty outside explicit mode.
    pub fn filters(&self) -> &[String] {
        match &self.mode {
            Mode::Explicit(list) => list,
            _ => &[],
        }
    }

    /// Project the strategy's instances through this filter.
    pub fn select(&self, strategy: &InstanceStrategy) -> Vec<Instance> {
        match &self.mode {
            Mode::Default => strategy
                .instances_order()
                .into_iter()
                .filter(|i| i.default)
                .collect(),
            Mode::All => strategy.instances_order(),
            Mode::Explicit(ids) => ids
                .iter()
                .filter_map(|id| strategy.instance(id))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_name_derivation() {
        assert_eq!(machine_name("myapp", "web", "0"), "myapp_web_0");
        assert_eq!(machine_name("myapp", "db", SINGLE_ID), "myapp_db_single");
    }

    #[test]
    fn test_single_order() {
        let s = InstanceStrategy::single();
        let order = s.instances_order();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].id, SINGLE_ID);
        assert!(order[0].default);
    }

    #[test]
    fn test_single_empty_id_returns_sole_instance() {
        let s = InstanceStrategy::single();
        let inst = s.instance("").unwrap();
        assert_eq!(inst.id, SINGLE_ID);
    }

    #[test]
    fn test_fixed_keeps_caller_order() {
        let s = InstanceStrategy::fixed(vec!["beta".into(), "alpha".into()]);
        let ids: Vec<_> = s.instances_order().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["beta", "alpha"]);
        assert!(s.instances_order().iter().all(|i| i.default));
    }

    #[test]
    fn test_fixed_lookup() {
        let s = InstanceStrategy::fixed(vec!["a".into(), "b".into()]);
        assert_eq!(s.instance("b").unwrap().id, "b");
        assert!(s.instance("c").is_none());
        // empty id resolves to the first default
        assert_eq!(s.instance("").unwrap().id, "a");
    }

    #[test]
    fn test_scaled_invariant() {
        let s = InstanceStrategy::scaled(2, 4);
        let order = s.instances_order();
        assert_eq!(order.len(), 4);
        let ids: Vec<_> = order.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
        let defaults: Vec<_> = order.iter().map(|i| i.default).collect();
        assert_eq!(defaults, vec![true, true, false, false]);
    }

    #[test]
    fn test_scaled_zero_initial() {
        let s = InstanceStrategy::scaled(0, 2);
        assert_eq!(s.instances_order().len(), 2);
        assert!(s.instances_order().iter().all(|i| !i.default));
        assert!(s.instance("").is_none());
    }

    #[test]
    fn test_temporary_has_no_queryable_instances() {
        let s = InstanceStrategy::temporary();
        assert!(s.instances_order().is_empty());
        assert!(s.instance("run-1").is_none());
    }

    #[test]
    fn test_temporary_mints_fresh_ids() {
        let s = InstanceStrategy::temporary();
        let a = s.create_temporary(None).unwrap();
        let b = s.create_temporary(None).unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.default);
        // caller-supplied id wins
        let named = s.create_temporary(Some("once")).unwrap();
        assert_eq!(named.id, "once");
        // minted instances are not tracked
        assert!(s.instances_order().is_empty());
    }

    #[test]
    fn test_non_temporary_never_mints() {
        assert!(InstanceStrategy::single().create_temporary(None).is_none());
        assert!(InstanceStrategy::scaled(1, 2)
            .create_temporary(Some("x"))
            .is_none());
    }

    #[test]
    fn test_filter_default_mode_selects_defaults_only() {
        let s = InstanceStrategy::scaled(2, 4);
        let f = InstanceFilter::new();
        let ids: Vec<_> = f.select(&s).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["0", "1"]);
    }

    #[test]
    fn test_filter_use_all() {
        let s = InstanceStrategy::scaled(2, 4);
        let mut f = InstanceFilter::new();
        f.use_all();
        assert_eq!(f.select(&s).len(), 4);
    }

    #[test]
    fn test_filter_explicit_preserves_filter_order() {
        let s = InstanceStrategy::scaled(0, 4);
        let mut f = InstanceFilter::new();
        f.add_filters(vec!["3".to_string(), "1".to_string()]);
        let ids: Vec<_> = f.select(&s).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[test]
    fn test_filter_idempotent() {
        let s = InstanceStrategy::scaled(2, 4);
        let mut f = InstanceFilter::new();
        f.add_filters(vec!["1".to_string()]);
        let once = f.select(&s);
        f.add_filters(vec!["1".to_string()]);
        assert_eq!(f.select(&s), once);
        assert_eq!(f.filters(), ["1"]);
    }

    #[test]
    fn test_filter_drops_unknown_ids() {
        let s = InstanceStrategy::fixed(vec!["a".into()]);
        let mut f = InstanceFilter::new();
        f.add_filters(vec!["ghost".to_string(), "a".to_string()]);
        let ids: Vec<_> = f.select(&s).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["a"]);
    }
}
