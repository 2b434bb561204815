use std::collections::HashMap;
use std::time::Duration;

use serde_with::{serde_as, DurationSeconds};
use twelf::config;
use twelf::reexports::serde::{Deserialize, Serialize};

use crate::node::{Node, DEFAULT_PORT};

/// Layered client configuration: the node descriptors plus the selection
/// strategy name. Loaded via twelf layers (TOML/JSON file, environment).
#[config]
#[derive(Debug, Default)]
pub struct Config {
    #[serde(default)]
    nodes: Vec<NodeConf>,
    #[serde(default)]
    strategy: Option<String>,
}

#[serde_as]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConf {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    path: String,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    connect_timeout: Option<Duration>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    extra: HashMap<String, String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_enabled() -> bool {
    true
}

impl Config {
    pub fn get_nodes(&self) -> &Vec<NodeConf> {
        &self.nodes
    }
    pub fn get_strategy(&self) -> &Option<String> {
        &self.strategy
    }
}

impl NodeConf {
    pub fn get_host(&self) -> &String {
        &self.host
    }
    pub fn get_port(&self) -> u16 {
        self.port
    }
    pub fn get_path(&self) -> &String {
        &self.path
    }
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new(self.host.clone())
            .with_port(self.port)
            .with_path(&self.path)
            .with_enabled(self.enabled);
        if let Some(timeout) = self.timeout {
            node = node.with_timeout(timeout);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            node = node.with_connect_timeout(connect_timeout);
        }
        for (key, value) in &self.extra {
            node = node.with_extra(key.clone(), value.clone());
        }
        node
    }
}
