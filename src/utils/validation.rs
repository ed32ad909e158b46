//! Parameter name validation.
//!
//! Some parameter names and prefixes are produced by the namespace builder
//! itself (object names, cross-object references, child references). User
//! defined parameter names must not collide with them.

/// Name used internally for object names
pub const RESERVED_NAME: &str = "name";

/// Prefixes reserved for references built by the namespace builder, with a
/// short description of their purpose.
pub const RESERVED_PREFIXES: &[(&str, &str)] = &[
    ("node_", "for cross-object node references"),
    ("conn_", "for cross-object connection references"),
    ("group_", "for cross-object group references"),
    ("opp_", "for opposite interface references"),
    ("n_", "for neighbor references"),
    ("m_", "for member references"),
    ("self_", "for interface config block references"),
    ("nodes_", "for child nodes config references"),
    ("interfaces_", "for child interfaces config references"),
    ("connections_", "for child connections config references"),
    ("segments_", "for child segments config references"),
    ("groups_", "for child groups config references"),
    ("neighbors_", "for child neighbors config references"),
    ("members_", "for child members config references"),
    ("values_", "for Value class references"),
];

/// Check a user-defined parameter name against reserved names and prefixes
///
/// # Arguments
/// * `name` - Parameter rule name or class value key
///
/// # Returns
/// * `Ok(())` if the name is usable
/// * `Err(String)` explaining the conflict and suggesting an alternative
///
/// # Examples
/// ```
/// use netcompile::utils::validation::check_param_name;
///
/// assert!(check_param_name("vlan_id").is_ok());
/// assert!(check_param_name("name").is_err());
/// assert!(check_param_name("node_id").is_err());
/// ```
pub fn check_param_name(name: &str) -> Result<(), String> {
    if name == RESERVED_NAME {
        return Err(format!(
            "'{}' is a reserved name (used internally for object names in templates); please choose a different name",
            name
        ));
    }
    for (prefix, description) in RESERVED_PREFIXES {
        if let Some(suffix) = name.strip_prefix(prefix) {
            return Err(format!(
                "'{}' uses reserved prefix '{}' ({}); please rename to avoid this prefix (e.g., '{}' instead)",
                name,
                prefix,
                description,
                suggest_name(name, prefix, suffix)
            ));
        }
    }
    Ok(())
}

fn suggest_name(name: &str, prefix: &str, suffix: &str) -> String {
    let suffix = if suffix.is_empty() { "param" } else { suffix };
    match prefix {
        "node_" => format!("nd_{}", suffix),
        "conn_" => format!("connection_{}", suffix),
        "group_" => format!("grp_{}", suffix),
        _ => format!("my_{}", name),
    }
}
