use std::sync::Arc;

use reqwest::Method;
use tracing::{debug, info, warn};

use crate::bulk::Bulk;
use crate::conf::Config;
use crate::error::{Error, Result};
use crate::models::server_info::ServerInfo;
use crate::node::Node;
use crate::pool::{ConnectionPool, FailureCallback};
use crate::strategy::{strategy_from_name, RoundRobinStrategy, SelectionStrategy};
use crate::transport::{HttpTransport, Request, Response, Transport};

/// Cluster client: a shared connection pool plus a transport. One logical
/// request may span several physical attempts against different nodes; the
/// caller only ever sees the final outcome.
pub struct EsClient {
    pool: Arc<ConnectionPool>,
    transport: Arc<dyn Transport>,
}

impl EsClient {
    pub fn builder() -> EsClientBuilder {
        EsClientBuilder::default()
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Sends one logical request. On a transport-level failure the resolved
    /// node is taken out of rotation and the identical request is retried
    /// against the next one; the loop ends when a node answers or the pool
    /// runs out of enabled nodes, in which case the last transport error is
    /// handed to the caller as-is.
    pub async fn perform(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
        content_type: Option<&str>,
    ) -> Result<Response> {
        loop {
            let node = self.pool.get_connection()?;
            let request = Request::new(
                node.clone(),
                method.clone(),
                path,
                query,
                body.clone(),
                content_type,
            );
            debug!(node = %node.url(), method = %method, path, "dispatching request");
            match self.transport.send(&request).await {
                Ok(response) => {
                    info!(
                        node = %node.url(),
                        method = %method,
                        path,
                        status = response.status(),
                        "request completed"
                    );
                    return Ok(response);
                }
                Err(error) => {
                    // Each failure permanently disables one node for this
                    // dispatch, so the loop runs at most N times.
                    self.pool.on_fail(&node, &error, "dispatch");
                    if self.pool.has_connection() {
                        warn!(
                            node = %node.url(),
                            method = %method,
                            path,
                            category = error.category(),
                            "transport failure, retrying against next node"
                        );
                        continue;
                    }
                    warn!(
                        method = %method,
                        path,
                        category = error.category(),
                        "transport failure with no enabled nodes left"
                    );
                    return Err(Error::Transport(error));
                }
            }
        }
    }

    /// `GET /` against whichever node the strategy picks.
    pub async fn server_info(&self) -> Result<ServerInfo> {
        let response = self.perform(Method::GET, "/", &[], None, None).await?;
        Ok(serde_json::from_str(response.body())?)
    }

    /// `HEAD /`; true iff some node answered with a 2xx.
    pub async fn ping(&self) -> Result<bool> {
        let response = self.perform(Method::HEAD, "/", &[], None, None).await?;
        Ok(response.is_success())
    }

    /// Starts an empty bulk batch bound to this client.
    pub fn bulk(&self) -> Bulk<'_> {
        Bulk::new(self)
    }
}

#[derive(Default)]
pub struct EsClientBuilder {
    nodes: Vec<Node>,
    strategy: Option<Box<dyn SelectionStrategy>>,
    strategy_name: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    on_failure: Option<Box<FailureCallback>>,
}

impl EsClientBuilder {
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn nodes(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn strategy(mut self, strategy: Box<dyn SelectionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Selects the strategy by its configured name; validated at `build`.
    pub fn strategy_name(mut self, name: impl Into<String>) -> Self {
        self.strategy_name = Some(name.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn on_failure(mut self, callback: Box<FailureCallback>) -> Self {
        self.on_failure = Some(callback);
        self
    }

    /// Applies a loaded [`Config`]: its nodes are appended and its strategy
    /// name, if any, wins over a previously set one.
    pub fn config(mut self, config: &Config) -> Self {
        self.nodes
            .extend(config.get_nodes().iter().map(|conf| conf.to_node()));
        if let Some(name) = config.get_strategy() {
            self.strategy_name = Some(name.clone());
        }
        self
    }

    pub fn build(self) -> Result<EsClient> {
        let nodes = if self.nodes.is_empty() {
            // Same default the server itself ships with.
            vec![Node::new("localhost")]
        } else {
            self.nodes
        };

        let strategy: Box<dyn SelectionStrategy> = match (self.strategy, self.strategy_name) {
            (Some(strategy), _) => strategy,
            (None, Some(name)) => strategy_from_name(&name)?,
            (None, None) => Box::new(RoundRobinStrategy::new()),
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let mut builder = HttpTransport::builder();
                if let Some(node) = nodes.first() {
                    builder = builder.connect_timeout(node.connect_timeout());
                }
                Arc::new(builder.build()?)
            }
        };

        let mut pool = ConnectionPool::new(nodes, strategy)?;
        if let Some(callback) = self.on_failure {
            pool = pool.with_on_failure(callback);
        }
        Ok(EsClient {
            pool: Arc::new(pool),
            transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every attempt; fails for the configured hosts with a
    /// connection error, answers 200 for the rest.
    struct MockTransport {
        failing_hosts: HashSet<String>,
        requests: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl MockTransport {
        fn new(failing_hosts: &[&str]) -> Self {
            Self {
                failing_hosts: failing_hosts.iter().map(|h| h.to_string()).collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<(String, String, Option<String>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(
            &self,
            request: &Request,
        ) -> std::result::Result<Response, TransportError> {
            self.requests.lock().unwrap().push((
                request.node().host().to_string(),
                request.path().to_string(),
                request.body().map(str::to_string),
            ));
            if self.failing_hosts.contains(request.node().host()) {
                Err(TransportError::Connect {
                    url: request.url(),
                    message: "connection refused".to_string(),
                })
            } else {
                Ok(Response::new(
                    200,
                    json!({"answered_by": request.node().host()}).to_string(),
                ))
            }
        }
    }

    fn client(hosts: &[&str], transport: Arc<MockTransport>) -> EsClient {
        EsClient::builder()
            .nodes(hosts.iter().map(|h| Node::new(*h)))
            .strategy_name("RoundRobin")
            .transport(transport)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn retries_on_next_node_and_returns_final_outcome() {
        let transport = Arc::new(MockTransport::new(&["a"]));
        let client = client(&["a", "b"], transport.clone());

        let response = client
            .perform(Method::GET, "/_search", &[], Some("{}".to_string()), None)
            .await
            .unwrap();
        assert_eq!(response.json().unwrap()["answered_by"], "b");

        // Both attempts carried the identical logical request.
        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].0, "a");
        assert_eq!(attempts[1].0, "b");
        assert_eq!(attempts[0].1, attempts[1].1);
        assert_eq!(attempts[0].2, attempts[1].2);

        // The failed node is out of rotation afterwards.
        let enabled: Vec<String> = client
            .pool()
            .get_connections()
            .iter()
            .filter(|n| n.is_enabled())
            .map(|n| n.host().to_string())
            .collect();
        assert_eq!(enabled, vec!["b"]);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_the_last_transport_error() {
        let transport = Arc::new(MockTransport::new(&["a", "b"]));
        let client = client(&["a", "b"], transport.clone());

        let error = client
            .perform(Method::GET, "/", &[], None, None)
            .await
            .unwrap_err();
        match error {
            Error::Transport(TransportError::Connect { url, .. }) => {
                // Node "b" failed last; its error is the one the caller sees.
                assert!(url.contains("//b:"), "unexpected url {url}");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(transport.attempts().len(), 2);
        assert!(!client.pool().has_connection());
    }

    #[tokio::test]
    async fn no_connection_means_no_transport_call() {
        let transport = Arc::new(MockTransport::new(&[]));
        let client = client(&["a", "b"], transport.clone());
        for node in client.pool().get_connections() {
            node.set_enabled(false);
        }

        let error = client
            .perform(Method::GET, "/", &[], None, None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NoConnectionAvailable));
        assert!(transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn consecutive_requests_rotate_nodes() {
        let transport = Arc::new(MockTransport::new(&[]));
        let client = client(&["a", "b", "c"], transport.clone());
        for _ in 0..4 {
            client.perform(Method::GET, "/", &[], None, None).await.unwrap();
        }
        let picked: Vec<String> = transport.attempts().into_iter().map(|a| a.0).collect();
        assert_eq!(picked, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn builder_defaults_to_localhost_round_robin() {
        let client = EsClient::builder().build().unwrap();
        let nodes = client.pool().get_connections();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].url(), "http://localhost:9200");
        assert_eq!(client.pool().strategy_name(), "RoundRobin");
    }

    #[test]
    fn builder_rejects_unknown_strategy_name() {
        let result = EsClient::builder()
            .node(Node::new("localhost"))
            .strategy_name("Fastest")
            .build();
        assert!(matches!(result, Err(Error::UnknownStrategy(_))));
    }
}
