use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::node::Node;

/// Policy for choosing which node serves the next request. Implementations
/// are driven under the pool's lock, so `select` may mutate internal state
/// without further synchronization.
pub trait SelectionStrategy: Send + fmt::Debug {
    /// Pick a node from `nodes`, which is the full descriptor list in
    /// insertion order. Disabled nodes must be skipped; `None` means the
    /// enabled subset is empty.
    fn select(&mut self, nodes: &[Arc<Node>]) -> Option<Arc<Node>>;

    fn name(&self) -> &'static str;

    /// Called after the descriptor list is replaced or grows, with the new
    /// length. Stateful strategies re-validate their cursor here.
    fn connections_changed(&mut self, _len: usize) {}
}

/// Builds a strategy from its configured name.
pub fn strategy_from_name(name: &str) -> Result<Box<dyn SelectionStrategy>> {
    match name {
        "Simple" => Ok(Box::new(SimpleStrategy)),
        "RoundRobin" => Ok(Box::new(RoundRobinStrategy::new())),
        other => Err(Error::UnknownStrategy(other.to_string())),
    }
}

/// Always the first enabled node in list order.
#[derive(Debug, Default)]
pub struct SimpleStrategy;

impl SelectionStrategy for SimpleStrategy {
    fn select(&mut self, nodes: &[Arc<Node>]) -> Option<Arc<Node>> {
        nodes.iter().find(|node| node.is_enabled()).cloned()
    }

    fn name(&self) -> &'static str {
        "Simple"
    }
}

/// Rotates over the full descriptor list, continuing just after the previous
/// pick and skipping disabled nodes. Keeping the cursor over the full list
/// (not the enabled subset) means a node toggled back to enabled is picked
/// up on the next lap without any bookkeeping.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    // Index of the last pick; None before the first selection.
    cursor: Option<usize>,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn select(&mut self, nodes: &[Arc<Node>]) -> Option<Arc<Node>> {
        if nodes.is_empty() {
            return None;
        }
        let len = nodes.len();
        let start = match self.cursor {
            Some(last) => last + 1,
            None => 0,
        };
        for offset in 0..len {
            let index = (start + offset) % len;
            if nodes[index].is_enabled() {
                self.cursor = Some(index);
                return Some(nodes[index].clone());
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "RoundRobin"
    }

    fn connections_changed(&mut self, len: usize) {
        if let Some(last) = self.cursor {
            if len == 0 || last >= len {
                self.cursor = None;
            }
        }
    }
}
