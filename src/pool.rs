use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Error, Result};
use crate::node::Node;
use crate::strategy::SelectionStrategy;
use crate::transport::TransportError;

/// Payload handed to the failure callback when a node is taken out of
/// rotation.
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub category: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FailureInfo {
    fn from_transport_error(error: &TransportError) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}

pub type FailureCallback = dyn Fn(&Node, &FailureInfo, &str) + Send + Sync;

/// Owns the node descriptors and the selection strategy. All selection and
/// failure bookkeeping runs under one mutex so that "pick next node" is
/// atomic with respect to concurrent `on_fail` and `set_connections` calls.
pub struct ConnectionPool {
    inner: Mutex<PoolInner>,
    on_failure: Option<Box<FailureCallback>>,
}

struct PoolInner {
    nodes: Vec<Arc<Node>>,
    strategy: Box<dyn SelectionStrategy>,
}

impl ConnectionPool {
    pub fn new(nodes: Vec<Node>, strategy: Box<dyn SelectionStrategy>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::EmptyPool);
        }
        Ok(Self {
            inner: Mutex::new(PoolInner {
                nodes: nodes.into_iter().map(Arc::new).collect(),
                strategy,
            }),
            on_failure: None,
        })
    }

    /// Installs an observer invoked whenever a node is marked failed. The
    /// callback cannot influence pool state; it exists for alerting and
    /// metrics.
    pub fn with_on_failure(mut self, callback: Box<FailureCallback>) -> Self {
        self.on_failure = Some(callback);
        self
    }

    /// Appends a descriptor. Duplicates are allowed.
    pub fn add_connection(&self, node: Node) {
        let mut inner = self.lock();
        inner.nodes.push(Arc::new(node));
        let len = inner.nodes.len();
        inner.strategy.connections_changed(len);
    }

    /// Replaces the whole descriptor set atomically.
    pub fn set_connections(&self, nodes: Vec<Node>) {
        let mut inner = self.lock();
        inner.nodes = nodes.into_iter().map(Arc::new).collect();
        let len = inner.nodes.len();
        inner.strategy.connections_changed(len);
    }

    /// True iff at least one descriptor is enabled.
    pub fn has_connection(&self) -> bool {
        self.lock().nodes.iter().any(|node| node.is_enabled())
    }

    /// Delegates to the strategy over the current descriptor list.
    pub fn get_connection(&self) -> Result<Arc<Node>> {
        let mut inner = self.lock();
        let PoolInner { nodes, strategy } = &mut *inner;
        strategy.select(nodes).ok_or(Error::NoConnectionAvailable)
    }

    /// Takes `node` out of rotation and notifies the failure observer.
    pub fn on_fail(&self, node: &Node, error: &TransportError, context: &str) {
        node.set_enabled(false);
        warn!(
            node = %node.url(),
            category = error.category(),
            context,
            "node marked failed: {error}"
        );
        if let Some(callback) = &self.on_failure {
            let info = FailureInfo::from_transport_error(error);
            callback(node, &info, context);
        }
    }

    pub fn get_connections(&self) -> Vec<Arc<Node>> {
        self.lock().nodes.clone()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.lock().strategy.name()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{strategy_from_name, RoundRobinStrategy, SimpleStrategy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(hosts: &[&str], strategy: Box<dyn SelectionStrategy>) -> ConnectionPool {
        let nodes = hosts.iter().map(|h| Node::new(*h)).collect();
        ConnectionPool::new(nodes, strategy).unwrap()
    }

    fn refused(url: &str) -> TransportError {
        TransportError::Connect {
            url: url.to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn empty_pool_is_a_construction_error() {
        let result = ConnectionPool::new(Vec::new(), Box::new(SimpleStrategy));
        assert!(matches!(result, Err(Error::EmptyPool)));
    }

    #[test]
    fn get_connection_fails_when_all_disabled() {
        let pool = pool(&["a", "b"], Box::new(RoundRobinStrategy::new()));
        for node in pool.get_connections() {
            node.set_enabled(false);
        }
        assert!(!pool.has_connection());
        assert!(matches!(
            pool.get_connection(),
            Err(Error::NoConnectionAvailable)
        ));
    }

    #[test]
    fn on_fail_disables_node_and_notifies_observer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let pool = pool(&["a", "b"], Box::new(SimpleStrategy)).with_on_failure(Box::new(
            move |node, info, context| {
                assert_eq!(node.host(), "a");
                assert_eq!(info.category, "connect");
                assert_eq!(context, "dispatch");
                seen.fetch_add(1, Ordering::SeqCst);
            },
        ));

        let node = pool.get_connection().unwrap();
        pool.on_fail(&node, &refused(&node.url()), "dispatch");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!node.is_enabled());
        assert_eq!(pool.get_connection().unwrap().host(), "b");
    }

    #[test]
    fn add_connection_appends_without_dedup() {
        let pool = pool(&["a"], Box::new(SimpleStrategy));
        pool.add_connection(Node::new("a"));
        pool.add_connection(Node::new("b"));
        let hosts: Vec<String> = pool
            .get_connections()
            .iter()
            .map(|n| n.host().to_string())
            .collect();
        assert_eq!(hosts, vec!["a", "a", "b"]);
    }

    #[test]
    fn set_connections_is_idempotent_for_selection() {
        let pool = pool(&["a", "b", "c"], Box::new(RoundRobinStrategy::new()));
        assert_eq!(pool.get_connection().unwrap().host(), "a");
        assert_eq!(pool.get_connection().unwrap().host(), "b");

        // Re-assigning the same set must not disturb the next pick.
        pool.set_connections(vec![Node::new("a"), Node::new("b"), Node::new("c")]);
        pool.set_connections(vec![Node::new("a"), Node::new("b"), Node::new("c")]);
        assert_eq!(pool.get_connection().unwrap().host(), "c");
    }

    #[test]
    fn set_connections_replaces_the_set() {
        let pool = pool(&["a", "b", "c", "d"], Box::new(RoundRobinStrategy::new()));
        for _ in 0..4 {
            pool.get_connection().unwrap();
        }
        pool.set_connections(vec![Node::new("x"), Node::new("y")]);
        let hosts: Vec<String> = pool
            .get_connections()
            .iter()
            .map(|n| n.host().to_string())
            .collect();
        assert_eq!(hosts, vec!["x", "y"]);
        // Stale cursor was revalidated, selection starts over cleanly.
        assert_eq!(pool.get_connection().unwrap().host(), "x");
    }

    #[test]
    fn round_robin_scenario_a_b_c() {
        let pool = pool(&["a", "b", "c"], strategy_from_name("RoundRobin").unwrap());
        let picks: Vec<String> = (0..4)
            .map(|_| pool.get_connection().unwrap().host().to_string())
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);

        let failed = pool
            .get_connections()
            .into_iter()
            .find(|n| n.host() == "a")
            .unwrap();
        pool.on_fail(&failed, &refused(&failed.url()), "dispatch");

        let picks: Vec<String> = (0..4)
            .map(|_| pool.get_connection().unwrap().host().to_string())
            .collect();
        assert_eq!(picks, vec!["b", "c", "b", "c"]);
    }
}
