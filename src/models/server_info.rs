use semver::Version as Semver;
use serde::{Deserialize, Serialize};

/// Root endpoint (`GET /`) payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerInfo {
    #[serde(rename = "name")]
    hostname: String,
    #[serde(rename = "cluster_name")]
    name: String,
    #[serde(rename = "cluster_uuid")]
    uuid: Option<String>,
    version: Version,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Version {
    number: String,
    lucene_version: Option<String>,
}

impl ServerInfo {
    pub fn get_hostname(&self) -> &String {
        &self.hostname
    }
    pub fn get_name(&self) -> &String {
        &self.name
    }
    pub fn get_uuid(&self) -> &Option<String> {
        &self.uuid
    }
    pub fn get_version(&self) -> &String {
        &self.version.number
    }
    pub fn get_lucene_version(&self) -> Option<&String> {
        self.version.lucene_version.as_ref()
    }

    pub fn get_version_major(&self) -> Option<u64> {
        Semver::parse(&self.version.number).ok().map(|v| v.major)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root_payload() {
        let raw = r#"{
            "name": "es-node-1",
            "cluster_name": "staging",
            "cluster_uuid": "u-123",
            "version": {"number": "8.12.2", "lucene_version": "9.9.2"},
            "tagline": "You Know, for Search"
        }"#;
        let info: ServerInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.get_hostname(), "es-node-1");
        assert_eq!(info.get_name(), "staging");
        assert_eq!(info.get_version(), "8.12.2");
        assert_eq!(info.get_version_major(), Some(8));
    }

    #[test]
    fn version_major_tolerates_odd_versions() {
        let raw = r#"{
            "name": "n",
            "cluster_name": "c",
            "cluster_uuid": null,
            "version": {"number": "8.x", "lucene_version": null}
        }"#;
        let info: ServerInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.get_version_major(), None);
    }
}
