//! Pure in-memory filter evaluation against a decoded entry.

use super::ast::Filter;
use crate::store::models::Entry;

const OPERATIONAL_TIMESTAMPS: [&str; 2] = ["createtimestamp", "modifytimestamp"];

/// Evaluates `filter` against `entry`. Attribute name lookup is
/// case-insensitive throughout.
pub fn matches(filter: &Filter, entry: &Entry) -> bool {
    match filter {
        Filter::And(children) => children.iter().all(|c| matches(c, entry)),
        Filter::Or(children) => children.iter().any(|c| matches(c, entry)),
        Filter::Not(inner) => !matches(inner, entry),
        Filter::Equality(attr, value) => values_of(entry, attr)
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value)),
        Filter::Present(attr) => !values_of(entry, attr).is_empty(),
        Filter::Substrings(attr, pattern) => values_of(entry, attr)
            .iter()
            .any(|v| substring_matches(pattern, v)),
        Filter::GreaterOrEqual(attr, value) => compare(entry, attr, value, |a, b| a >= b),
        Filter::LessOrEqual(attr, value) => compare(entry, attr, value, |a, b| a <= b),
        // Minimum conforming implementation: approxMatch is exact equality.
        Filter::ApproxMatch(attr, value) => values_of(entry, attr)
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value)),
    }
}

fn values_of<'a>(entry: &'a Entry, attr: &str) -> Vec<&'a str> {
    let lower = attr.to_lowercase();
    entry
        .attributes
        .get(&lower)
        .map(|values| values.iter().map(|v| v.as_str()).collect())
        .unwrap_or_default()
}

fn compare(entry: &Entry, attr: &str, value: &str, op: impl Fn(&str, &str) -> bool) -> bool {
    let lower_attr = attr.to_lowercase();
    let normalized_filter_value = normalize_if_timestamp(&lower_attr, value);
    values_of(entry, attr).iter().any(|v| {
        let normalized_entry_value = normalize_if_timestamp(&lower_attr, v);
        op(normalized_entry_value.as_str(), normalized_filter_value.as_str())
    })
}

/// `createTimestamp`/`modifyTimestamp` compare by stripping a trailing `Z`.
fn normalize_if_timestamp(lower_attr: &str, value: &str) -> String {
    if OPERATIONAL_TIMESTAMPS.contains(&lower_attr) {
        value.trim_end_matches('Z').to_string()
    } else {
        value.to_string()
    }
}

/// Case-insensitive wildcard match: splits `pattern` on `*`; the first
/// non-empty segment must be a prefix, the last non-empty segment a
/// suffix, interior segments must appear in order, empty segments ignored.
fn substring_matches(pattern: &str, candidate: &str) -> bool {
    let candidate = candidate.to_lowercase();
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        // No wildcard at all: treat as exact equality.
        return candidate == segments[0].to_lowercase();
    }

    let mut cursor = 0usize;
    let last_index = segments.len() - 1;

    for (i, raw_segment) in segments.iter().enumerate() {
        if raw_segment.is_empty() {
            continue;
        }
        let segment = raw_segment.to_lowercase();

        if i == 0 {
            if !candidate[cursor..].starts_with(&segment) {
                return false;
            }
            cursor += segment.len();
        } else if i == last_index {
            if !candidate[cursor..].ends_with(&segment) {
                return false;
            }
        } else {
            match candidate[cursor..].find(&segment) {
                Some(pos) => cursor += pos + segment.len(),
                None => return false,
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(attrs: &[(&str, &[&str])]) -> Entry {
        let mut attributes = HashMap::new();
        for (name, values) in attrs {
            attributes.insert(
                name.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
        Entry {
            id: 1,
            dn: "uid=bob,ou=users,dc=test,dc=com".into(),
            parent_dn: "ou=users,dc=test,dc=com".into(),
            object_class: "inetOrgPerson".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
            attributes,
        }
    }

    #[test]
    fn equality_is_case_insensitive() {
        let e = entry(&[("uid", &["Bob"])]);
        assert!(matches(&Filter::eq("uid", "bob"), &e));
    }

    #[test]
    fn present_requires_nonempty() {
        let e = entry(&[("mail", &["bob@example.com"])]);
        assert!(matches(&Filter::present("mail"), &e));
        assert!(!matches(&Filter::present("description"), &e));
    }

    #[test]
    fn substrings_any_position() {
        let e = entry(&[("cn", &["Bob Johnson"])]);
        assert!(matches(&Filter::Substrings("cn".into(), "*son*".into()), &e));
        assert!(matches(&Filter::Substrings("cn".into(), "Bob*".into()), &e));
        assert!(matches(&Filter::Substrings("cn".into(), "*Johnson".into()), &e));
        assert!(!matches(&Filter::Substrings("cn".into(), "*xyz*".into()), &e));
    }

    #[test]
    fn and_or_not_combinators() {
        let e = entry(&[("uid", &["bob"]), ("objectClass", &["inetOrgPerson"])]);
        assert!(matches(
            &Filter::And(vec![
                Filter::eq("objectClass", "inetOrgPerson"),
                Filter::eq("uid", "bob"),
            ]),
            &e
        ));
        assert!(!matches(&Filter::Not(Box::new(Filter::eq("uid", "bob"))), &e));
        assert!(matches(
            &Filter::Or(vec![Filter::eq("uid", "nope"), Filter::eq("uid", "bob")]),
            &e
        ));
    }

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        let e = entry(&[]);
        assert!(matches(&Filter::And(vec![]), &e));
        assert!(!matches(&Filter::Or(vec![]), &e));
    }

    #[test]
    fn timestamp_comparison_strips_trailing_z() {
        let e = entry(&[("createtimestamp", &["20240101000000Z"])]);
        assert!(matches(
            &Filter::GreaterOrEqual("createTimestamp".into(), "20240101000000".into()),
            &e
        ));
    }
}
