//! Management interfaces.
//!
//! Nodes whose primary class names a management interface class get an extra
//! connection-less interface carrying that class.

use log::{debug, info, warn};

use super::classes::apply_interface_class;
use crate::config::{ClassType, Config};
use crate::error::CompileError;
use crate::model::objects::DEFAULT_INTERFACE_PREFIX;
use crate::model::{Interface, NetworkModel, ScopeId};
use crate::topology::labels::{ParsedLabels, CLASS_ALL};

pub fn add_management_interfaces(
    model: &mut NetworkModel,
    config: &Config,
) -> Result<(), CompileError> {
    let with_class: Vec<_> = model
        .node_ids()
        .filter_map(|n| model.node(n).mgmt_class.clone().map(|c| (n, c)))
        .collect();
    let Some(mgmt) = &config.mgmt_layer else {
        if !with_class.is_empty() {
            warn!("Management interface classes are ignored without mgmt_layer");
        }
        return Ok(());
    };

    for (node, class) in &with_class {
        let name = mgmt.interface_name().to_string();
        if model.find_interface(*node, &name).is_some() {
            return Err(CompileError::DuplicateName {
                kind: "interface".to_string(),
                name: format!("{}.{}", model.node(*node).name, name),
            });
        }
        let labels = ParsedLabels {
            class_labels: vec![class.clone()],
            ..Default::default()
        };
        let mut iface = Interface::new(*node, name, labels);
        iface.is_mgmt = true;
        iface.is_virtual = model.node(*node).is_virtual;
        iface.name_prefix = DEFAULT_INTERFACE_PREFIX.to_string();
        let id = model.add_interface(iface);
        model.node_mut(*node).mgmt_interface = Some(id);

        if config.has_class(ClassType::Interface, CLASS_ALL) {
            apply_interface_class(model, config, id, CLASS_ALL)?;
        }
        apply_interface_class(model, config, id, class)?;
        debug!("Created management interface {}", model.describe(ScopeId::Interface(id)));
    }
    info!("Added {} management interfaces", with_class.len());
    Ok(())
}
