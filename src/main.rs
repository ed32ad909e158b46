use clap::{Parser, ValueEnum};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use netcompile::config_loader;
use netcompile::orchestrator::Compiler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

/// Compile a network topology and class configuration into resolved parameters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Path to the topology file (YAML or JSON)
    #[arg(short, long)]
    topology: PathBuf,

    /// Output file; the document is printed to stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output document format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting netcompile");
    info!("Configuration file: {:?}", args.config);
    info!("Topology file: {:?}", args.topology);

    let config = config_loader::load_config(&args.config)?;
    let graph = config_loader::load_topology(&args.topology)?;

    let compiler = Compiler::new(&config).wrap_err("Failed to prepare configuration")?;
    let network = compiler
        .compile(&graph)
        .wrap_err_with(|| format!("Failed to compile topology '{}'", args.topology.display()))?;

    let document = match args.format {
        OutputFormat::Json => network.to_json().wrap_err("Failed to serialize output")?,
        OutputFormat::Yaml => network.to_yaml().wrap_err("Failed to serialize output")?,
    };

    match &args.output {
        Some(path) => config_loader::write_output(path, &document)?,
        None => println!("{}", document),
    }

    info!("Compilation completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "netcompile",
            "--config", "config.yaml",
            "--topology", "topology.yaml",
        ]);

        assert_eq!(args.config, PathBuf::from("config.yaml"));
        assert_eq!(args.topology, PathBuf::from("topology.yaml"));
        assert_eq!(args.output, None);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_output_args() {
        let args = Args::parse_from([
            "netcompile",
            "-c", "config.yaml",
            "-t", "topology.json",
            "-o", "out/network.yaml",
            "--format", "yaml",
        ]);

        assert_eq!(args.output, Some(PathBuf::from("out/network.yaml")));
        assert_eq!(args.format, OutputFormat::Yaml);
    }

    #[test]
    fn test_topology_is_required() {
        assert!(Args::try_parse_from(["netcompile", "--config", "config.yaml"]).is_err());
    }
}
