//! Class resolution module.
//!
//! Resolves class labels to class definitions, names unnamed objects, adds
//! management interfaces and materializes member objects.

pub mod classes;
pub mod members;
pub mod mgmt;
pub mod naming;

use log::info;

use crate::config::Config;
use crate::error::CompileError;
use crate::model::NetworkModel;

// Re-export commonly used functions
pub use classes::resolve_classes;
pub use members::build_members;
pub use mgmt::add_management_interfaces;
pub use naming::{assign_connection_names, assign_interface_names, assign_node_names};

/// Class labels added to every object of a kind by loaded modules
#[derive(Debug, Clone, Default)]
pub struct ExtraClasses {
    pub node: Vec<String>,
    pub interface: Vec<String>,
    pub connection: Vec<String>,
}

/// Run the whole resolution stage on a freshly ingested model.
pub fn resolve(
    model: &mut NetworkModel,
    config: &Config,
    extra: &ExtraClasses,
) -> Result<(), CompileError> {
    resolve_classes(model, config, extra)?;
    assign_node_names(model, config)?;
    assign_interface_names(model)?;
    assign_connection_names(model);
    add_management_interfaces(model, config)?;
    build_members(model, config)?;
    info!(
        "Resolved classes: {} nodes, {} interfaces, {} members",
        model.nodes.len(),
        model.interfaces.len(),
        model.members.len()
    );
    Ok(())
}
