//! Candidate values of plain parameter rules.

use std::collections::BTreeSet;
use std::fs;

use crate::config::{Config, ParameterRule, RuleType};
use crate::error::CompileError;

/// Generate `count` distinct candidate values of a rule.
///
/// # Arguments
///
/// * `config` - Configuration, used to resolve the rule's source file path
/// * `rule` - An integer or file rule
/// * `count` - Number of requesting objects
///
/// # Examples
///
/// ```
/// use netcompile::config::{Config, ParameterRule};
/// use netcompile::params::candidates::parameter_candidates;
///
/// let rule = ParameterRule {
///     name: "vlan_id".to_string(),
///     min: 100,
///     max: 200,
///     ..Default::default()
/// };
/// let values = parameter_candidates(&Config::default(), &rule, 2).unwrap();
/// assert_eq!(values, vec!["100", "101"]);
/// ```
pub fn parameter_candidates(
    config: &Config,
    rule: &ParameterRule,
    count: usize,
) -> Result<Vec<String>, CompileError> {
    match rule.kind {
        RuleType::Integer => integer_candidates(rule, count),
        RuleType::File => file_candidates(config, rule, count),
    }
}

fn integer_candidates(rule: &ParameterRule, count: usize) -> Result<Vec<String>, CompileError> {
    let required = i64::try_from(count).unwrap_or(i64::MAX);
    if rule.max > 0 && rule.max.saturating_sub(rule.min) < required {
        return Err(CompileError::NotEnoughCandidates {
            rule: rule.name.clone(),
            required: count,
        });
    }
    Ok((0..required)
        .map(|i| format!("{}{}{}", rule.header, rule.min + i, rule.footer))
        .collect())
}

fn file_candidates(
    config: &Config,
    rule: &ParameterRule,
    count: usize,
) -> Result<Vec<String>, CompileError> {
    let source = rule.sourcefile.as_deref().ok_or_else(|| CompileError::InvalidRule {
        rule: rule.name.clone(),
        reason: "file rule requires sourcefile".to_string(),
    })?;
    let path = config.resolve_path(source);
    let content = fs::read_to_string(&path).map_err(|source| CompileError::SourceFile {
        path: path.clone(),
        source,
    })?;

    let mut seen = BTreeSet::new();
    let mut values = Vec::with_capacity(count);
    for line in content.lines() {
        if values.len() >= count {
            break;
        }
        let line = line.trim_end_matches('\r');
        if line.is_empty() || !seen.insert(line) {
            continue;
        }
        values.push(line.to_string());
    }
    if values.len() < count {
        return Err(CompileError::NotEnoughCandidates {
            rule: rule.name.clone(),
            required: count,
        });
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn int_rule(min: i64, max: i64) -> ParameterRule {
        ParameterRule {
            name: "id".to_string(),
            min,
            max,
            ..Default::default()
        }
    }

    #[test]
    fn test_integer_exhaustion() {
        let config = Config::default();
        let err = parameter_candidates(&config, &int_rule(1, 3), 5).unwrap_err();
        assert_eq!(err.to_string(), "not enough candidates for id (5 required)");
        assert_eq!(
            parameter_candidates(&config, &int_rule(1, 3), 2).unwrap(),
            vec!["1", "2"]
        );
    }

    #[test]
    fn test_integer_unbounded_with_affixes() {
        let mut rule = int_rule(0, 0);
        rule.header = "as".to_string();
        rule.footer = "x".to_string();
        let values = parameter_candidates(&Config::default(), &rule, 3).unwrap();
        assert_eq!(values, vec!["as0x", "as1x", "as2x"]);
    }

    #[test]
    fn test_file_candidates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "alpha\n\nbeta\nalpha\ngamma").unwrap();
        let rule = ParameterRule {
            name: "names".to_string(),
            kind: RuleType::File,
            sourcefile: Some(file.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        let config = Config::default();
        assert_eq!(
            parameter_candidates(&config, &rule, 3).unwrap(),
            vec!["alpha", "beta", "gamma"]
        );
        let err = parameter_candidates(&config, &rule, 4).unwrap_err();
        assert!(matches!(err, CompileError::NotEnoughCandidates { required: 4, .. }));
    }

    #[test]
    fn test_missing_source_file() {
        let rule = ParameterRule {
            name: "names".to_string(),
            kind: RuleType::File,
            sourcefile: Some("/nonexistent/netcompile/names.txt".to_string()),
            ..Default::default()
        };
        let err = parameter_candidates(&Config::default(), &rule, 1).unwrap_err();
        assert_eq!(err.category(), "input");
    }
}
