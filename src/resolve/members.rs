//! Member objects.
//!
//! A member class declaration on a node, interface or connection makes every
//! object registered under the referenced classes a [`Member`] of the
//! declaring object.

use log::debug;

use crate::config::{Config, MemberClass};
use crate::error::CompileError;
use crate::model::{Member, NetworkModel, ScopeId};

fn declarations(model: &NetworkModel, referrer: ScopeId) -> Vec<(String, MemberClass)> {
    match referrer {
        ScopeId::Node(id) => model.node(id).member_classes.clone(),
        ScopeId::Interface(id) => model.interface(id).member_classes.clone(),
        ScopeId::Connection(id) => model.connection(id).member_classes.clone(),
        _ => Vec::new(),
    }
}

/// Materialize the members of every referrer.
pub fn build_members(model: &mut NetworkModel, config: &Config) -> Result<(), CompileError> {
    let referrers: Vec<ScopeId> = model
        .node_ids()
        .map(ScopeId::Node)
        .chain(model.interface_ids().map(ScopeId::Interface))
        .chain(model.connection_ids().map(ScopeId::Connection))
        .collect();

    for referrer in referrers {
        for (declared_by, member_class) in declarations(model, referrer) {
            let (kind, classes) =
                member_class
                    .specified_classes()
                    .map_err(|reason| CompileError::InvalidMemberClass {
                        object: model.describe(referrer),
                        reason: format!("{} (class {})", reason, declared_by),
                    })?;
            for class in classes {
                if !config.has_class(kind, &class) {
                    return Err(CompileError::UnknownClass {
                        kind: kind.to_string(),
                        name: class,
                        object: format!("member class of {}", model.describe(referrer)),
                    });
                }
                let targets = model.class_members(kind, &class).to_vec();
                for target in targets {
                    if target == referrer && !member_class.include_self {
                        continue;
                    }
                    model.add_member(Member {
                        class_type: kind,
                        class_name: class.clone(),
                        referrer,
                        member: target,
                        ns: Default::default(),
                    });
                }
            }
        }
    }
    debug!("Created {} members", model.members.len());
    Ok(())
}
