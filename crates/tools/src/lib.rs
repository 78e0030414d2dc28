//! Tools and tool connectors for ragweave.
//!
//! Built-in file tools (`file_read`, `file_write`, `list_directory`) are
//! exposed through the [`LocalConnector`]; remote servers speaking JSON-RPC
//! over HTTP are reached through the [`McpHttpConnector`]. Both implement
//! [`ToolConnector`] so the agent routes calls to them uniformly.

pub mod file_read;
pub mod file_write;
pub mod list_directory;
pub mod local;
pub mod mcp_http;
pub mod workspace;

pub use local::LocalConnector;
pub use mcp_http::McpHttpConnector;
pub use workspace::Workspace;

use ragweave_config::{AppConfig, ConnectorKind};
use ragweave_core::connector::ToolConnector;
use tracing::warn;

/// Build the (uninitialised) connectors named by the configuration, in order.
pub fn connectors_from_config(config: &AppConfig) -> Vec<Box<dyn ToolConnector>> {
    let mut connectors: Vec<Box<dyn ToolConnector>> = Vec::new();
    for entry in config.active_connectors() {
        match entry.kind {
            ConnectorKind::Local => {
                let mut local = LocalConnector::with_file_tools(
                    &config.agent.output_dir,
                    vec![config.knowledge.dir.clone()],
                );
                if entry.name != "local" {
                    local = local.renamed(entry.name);
                }
                connectors.push(Box::new(local));
            }
            ConnectorKind::McpHttp => {
                let Some(url) = entry.url else {
                    warn!(connector = %entry.name, "Skipping mcp_http connector without url");
                    continue;
                };
                let mut remote = McpHttpConnector::new(entry.name, url);
                if let Some(ns) = entry.namespace {
                    remote = remote.with_namespace(ns);
                }
                connectors.push(Box::new(remote));
            }
        }
    }
    connectors
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragweave_config::ConnectorConfig;

    #[test]
    fn default_config_yields_local_connector_only() {
        let config = AppConfig::default();
        let connectors = connectors_from_config(&config);
        assert_eq!(connectors.len(), 1);
        assert_eq!(connectors[0].name(), "local");
    }

    #[test]
    fn remote_connectors_follow_local() {
        let mut config = AppConfig::default();
        config.connectors.push(ConnectorConfig {
            name: "search".into(),
            kind: ConnectorKind::McpHttp,
            url: Some("http://localhost:8001/mcp".into()),
            namespace: Some("search".into()),
            enabled: true,
        });
        config.connectors.push(ConnectorConfig {
            name: "off".into(),
            kind: ConnectorKind::McpHttp,
            url: Some("http://localhost:8002/mcp".into()),
            namespace: None,
            enabled: false,
        });
        let names: Vec<String> = connectors_from_config(&config)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["local", "search"]);
    }
}
