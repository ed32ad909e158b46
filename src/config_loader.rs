use crate::config::Config;
use crate::topology::Graph;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use log::{debug, info};
use std::fs::{self, File};
use std::path::Path;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    // Open the configuration file
    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration file '{}'", config_path.display()))?;

    // Parse the YAML content
    let mut config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration file '{}'", config_path.display()))?;

    // Relative paths may resolve against the configuration directory
    config.base_dir = config_path.parent().map(Path::to_path_buf);

    // Validate the configuration
    config
        .validate()
        .wrap_err_with(|| format!("Invalid configuration in '{}'", config_path.display()))?;

    debug!(
        "Configuration has {} layers, {} parameter rules, {} node classes",
        config.layers.len(),
        config.param_rules.len(),
        config.node_classes.len()
    );
    Ok(config)
}

/// Load a topology graph from a YAML or JSON file, chosen by extension
pub fn load_topology(topology_path: &Path) -> Result<Graph> {
    info!("Loading topology from: {:?}", topology_path);

    let content = fs::read_to_string(topology_path)
        .wrap_err_with(|| format!("Failed to read topology file '{}'", topology_path.display()))?;

    let is_json = topology_path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    let graph: Graph = if is_json {
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse topology file '{}'", topology_path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse topology file '{}'", topology_path.display()))?
    };

    graph
        .validate()
        .map_err(|e| eyre!("Invalid topology in '{}': {}", topology_path.display(), e))?;

    info!(
        "Topology has {} nodes, {} edges, {} groups",
        graph.nodes.len(),
        graph.edges.len(),
        graph.groups.len()
    );
    Ok(graph)
}

/// Write a rendered output document, creating parent directories as needed
pub fn write_output(output_path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create output directory '{}'", parent.display()))?;
        }
    }
    fs::write(output_path, content)
        .wrap_err_with(|| format!("Failed to write output file '{}'", output_path.display()))?;
    info!("Wrote output to: {:?}", output_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_load_config_sets_base_dir() {
        let yaml = r#"
name: lab
layer:
  - name: ipv4
    default_connect: true
    policy:
      - name: p2p
        type: ip
        range: 10.0.0.0/16
        prefix: 30
nodeclass:
  - name: router
    primary: true
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.name, "lab");
        assert_eq!(config.layers.len(), 1);
        assert_eq!(config.base_dir.as_deref(), temp_file.path().parent());
    }

    #[test]
    fn test_load_config_rejects_reserved_rule_name() {
        let yaml = r#"
param_rule:
  - name: node_id
    type: int
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("node_"));
    }

    #[test]
    fn test_load_topology_yaml_and_json() {
        let dir = TempDir::new().unwrap();

        let yaml_path = dir.path().join("topo.yaml");
        fs::write(
            &yaml_path,
            "nodes:\n  - name: r1\n  - name: r2\nedges:\n  - src: r1\n    dst: r2\n",
        )
        .unwrap();
        let graph = load_topology(&yaml_path).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);

        let json_path = dir.path().join("topo.json");
        fs::write(
            &json_path,
            r#"{"nodes": [{"name": "a", "labels": ["host"]}], "edges": []}"#,
        )
        .unwrap();
        let graph = load_topology(&json_path).unwrap();
        assert_eq!(graph.nodes[0].labels, vec!["host".to_string()]);
    }

    #[test]
    fn test_load_topology_rejects_dangling_edge() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topo.yaml");
        fs::write(&path, "nodes:\n  - name: r1\nedges:\n  - src: r1\n    dst: r9\n").unwrap();
        assert!(load_topology(&path).is_err());
    }

    #[test]
    fn test_write_output_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("network.json");
        write_output(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }
}
