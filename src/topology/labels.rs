//! Label classification.
//!
//! Topology elements carry free-form string labels. This file splits and
//! classifies them into class labels, relational class labels, place labels,
//! value labels and meta-value labels.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Marker of place labels (`@name`)
pub const PLACE_LABEL_MARKER: char = '@';
/// Separator of value labels (`key=value`)
pub const VALUE_LABEL_SEPARATOR: char = '=';
/// Separator of relational class labels (`type#name`)
pub const RELATIONAL_LABEL_SEPARATOR: char = '#';

/// Class implicitly attached to every object of a kind
pub const CLASS_ALL: &str = "all";
/// Class used when an object carries no class label
pub const CLASS_DEFAULT: &str = "default";

/// A class label addressed to a related object, e.g. `segment#lan`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelationalLabel {
    pub class_type: String,
    pub name: String,
}

/// Labels of one topology element, sorted by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLabels {
    pub class_labels: Vec<String>,
    pub relational_labels: Vec<RelationalLabel>,
    pub place_labels: Vec<String>,
    pub value_labels: BTreeMap<String, String>,
    /// alias -> place label
    pub meta_value_labels: BTreeMap<String, String>,
}

/// Separators between labels written in one string
static LABEL_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;]").expect("Invalid label separator regex"));

/// Split raw label strings on `,` and `;`, trimming and dropping empty items.
pub fn split_labels<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| {
            LABEL_SEPARATOR
                .split(entry.as_ref())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Classify raw labels of one element.
///
/// Labels keep their original order within each kind. A repeated value label
/// key keeps the first value.
pub fn classify_labels<S: AsRef<str>>(raw: &[S]) -> ParsedLabels {
    let mut parsed = ParsedLabels::default();
    for label in split_labels(raw) {
        if let Some(place) = label.strip_prefix(PLACE_LABEL_MARKER) {
            match place.split_once(VALUE_LABEL_SEPARATOR) {
                Some((alias, target)) => {
                    parsed
                        .meta_value_labels
                        .entry(alias.trim().to_string())
                        .or_insert_with(|| target.trim().to_string());
                }
                None => parsed.place_labels.push(place.to_string()),
            }
        } else if let Some((key, value)) = label.split_once(VALUE_LABEL_SEPARATOR) {
            parsed
                .value_labels
                .entry(key.trim().to_string())
                .or_insert_with(|| value.trim().to_string());
        } else if let Some((class_type, name)) = label.split_once(RELATIONAL_LABEL_SEPARATOR) {
            parsed.relational_labels.push(RelationalLabel {
                class_type: class_type.trim().to_string(),
                name: name.trim().to_string(),
            });
        } else {
            parsed.class_labels.push(label);
        }
    }
    parsed
}

impl ParsedLabels {
    /// Class names after applying the implicit `all` and `default` classes.
    ///
    /// `has_all` / `has_default` tell whether the configuration defines those
    /// classes for the element's kind.
    pub fn with_implicit_classes(&self, has_all: bool, has_default: bool) -> Vec<String> {
        let mut classes = Vec::new();
        if has_all && !self.class_labels.iter().any(|c| c == CLASS_ALL) {
            classes.push(CLASS_ALL.to_string());
        }
        if self.class_labels.is_empty() && has_default {
            classes.push(CLASS_DEFAULT.to_string());
        }
        classes.extend(self.class_labels.iter().cloned());
        classes
    }

    /// Relational labels addressed to the given class type
    pub fn relational_for<'a>(&'a self, class_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.relational_labels
            .iter()
            .filter(move |r| r.class_type == class_type)
            .map(|r| r.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_labels() {
        let raw = vec!["router, ospf;bgp", " ", "@core"];
        assert_eq!(split_labels(&raw), vec!["router", "ospf", "bgp", "@core"]);
    }

    #[test]
    fn test_classify_all_kinds() {
        let parsed = classify_labels(&["router", "@core", "@up=core", "segment#lan", "ip_addr=10.0.0.1"]);
        assert_eq!(parsed.class_labels, vec!["router"]);
        assert_eq!(parsed.place_labels, vec!["core"]);
        assert_eq!(parsed.meta_value_labels.get("up").map(String::as_str), Some("core"));
        assert_eq!(
            parsed.relational_labels,
            vec![RelationalLabel {
                class_type: "segment".to_string(),
                name: "lan".to_string()
            }]
        );
        assert_eq!(parsed.value_labels.get("ip_addr").map(String::as_str), Some("10.0.0.1"));
    }

    #[test]
    fn test_implicit_classes() {
        let parsed = classify_labels(&["router"]);
        assert_eq!(parsed.with_implicit_classes(true, true), vec!["all", "router"]);

        let empty = classify_labels::<&str>(&[]);
        assert_eq!(empty.with_implicit_classes(true, true), vec!["all", "default"]);
        assert_eq!(empty.with_implicit_classes(false, false), Vec::<String>::new());
    }

    #[test]
    fn test_first_value_label_wins() {
        let parsed = classify_labels(&["asn=100", "asn=200"]);
        assert_eq!(parsed.value_labels.get("asn").map(String::as_str), Some("100"));
    }
}
