//! # netcompile - Topology resolution and parameter assignment engine
//!
//! This library compiles an abstract network topology (a labelled multigraph
//! of nodes and links) together with a declarative class and policy
//! configuration into a fully resolved parameter set for every object.
//!
//! ## Overview
//!
//! A topology only says which nodes exist, how they are linked and which
//! labels they carry. The configuration says what the labels mean: classes
//! with parameters and IP policies, layers with address pools, and parameter
//! rules handing out values such as VLAN ids or AS numbers. netcompile joins
//! the two and produces, for every node, interface, connection, segment,
//! group, neighbor and member, the parameters a config template would need,
//! expressed relative to that object.
//!
//! ## Key Features
//!
//! - **Class Resolution**: Primary class exclusivity, relational and implicit
//!   classes, automatic naming of nodes, interfaces and connections
//! - **Address Allocation**: Per-layer segment discovery, conflict-free prefix
//!   allocation with reserved addresses, loopbacks and a management network
//! - **Parameter Rules**: Integer and file candidates, per object, per segment
//!   or per connection, plus structured Value records from sources and generators
//! - **Relative Namespaces**: `node_`, `opp_`, `n_`, `m_` and group prefixes,
//!   place labels and meta-value aliases, built in dependency order
//! - **Deterministic**: The same inputs always produce the same output
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `config`: Type-safe configuration structures and validation
//! - `config_loader`: Configuration and topology file loading
//! - `topology`: Input graph and label classification
//! - `model`: Object arena, scope objects and namespaces
//! - `resolve`: Class resolution, naming, management interfaces and members
//! - `ip`: Segment discovery, IP pools and address assignment
//! - `dependency`: Generic topological sort with template and scope adapters
//! - `params`: Parameter rules, value sources and the generator registry
//! - `namespace`: Relative namespace construction
//! - `templates`: Config template ordering per object
//! - `modules`: Built-in modules (containerlab)
//! - `orchestrator`: High-level orchestration of a compilation
//! - `utils`: Address utilities and parameter name validation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use netcompile::{config_loader, orchestrator};
//! use std::path::Path;
//!
//! // Load configuration and topology
//! let config = config_loader::load_config(Path::new("config.yaml"))?;
//! let graph = config_loader::load_topology(Path::new("topology.yaml"))?;
//!
//! // Compile and print the resolved parameters
//! let network = orchestrator::compile(&config, &graph)?;
//! println!("{}", network.to_json()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration Format
//!
//! Configurations use YAML format:
//!
//! ```yaml
//! name: lab
//! layer:
//!   - name: ip
//!     default_connect: true
//!     policy:
//!       - name: p2p
//!         range: 10.0.0.0/16
//!         prefix: 30
//! param_rule:
//!   - name: vlan_id
//!     min: 100
//!     max: 200
//! nodeclass:
//!   - name: router
//!     primary: true
//!     params: [vlan_id]
//! interfaceclass:
//!   - name: p2p
//!     primary: true
//!     policy: [p2p]
//! ```
//!
//! ## Error Handling
//!
//! The engine returns [`error::CompileError`], grouped as reference, conflict,
//! capacity, structural and input errors, each naming the offending object.
//! Loaders and the binary use `color_eyre` for error reporting with context.

pub mod config;
pub mod config_loader;
pub mod dependency;
pub mod error;
pub mod ip;
pub mod model;
pub mod modules;
pub mod namespace;
pub mod orchestrator;
pub mod params;
pub mod resolve;
pub mod templates;
pub mod topology;
pub mod utils;
