//! Translates a filter tree into a SQL predicate fragment plus positional
//! bind values against the directory-store schema (see `store::directory`),
//! so the store can restrict the result set before materialization.
//!
//! Grounded in the recursive `build_filter_inner` translation of
//! `LdapFilter::{And,Or,Not,Equality,Substring,Present}` into a parameterized
//! SQL fragment and a bindings vector (the `JoelLinn-sql2ldap` reference
//! implementation in the retrieval pack), adapted from Postgres `$n`
//! placeholders to SQLite `?` placeholders and extended with the
//! `createTimestamp`/`modifyTimestamp` comparison and the `objectClass`
//! column special case this schema requires.

use super::ast::Filter;

/// A positional bind value for the compiled predicate.
pub type SqlValue = String;

const OPERATIONAL_TIMESTAMPS: [&str; 2] = ["createtimestamp", "modifytimestamp"];

/// Returns `true` iff `try_compile` would return `Some` for this filter.
pub fn can_compile(filter: &Filter) -> bool {
    match filter {
        Filter::And(children) | Filter::Or(children) => children.iter().all(can_compile),
        Filter::Not(inner) => can_compile(inner),
        Filter::Equality(attr, _) | Filter::Present(attr) | Filter::Substrings(attr, _) => {
            !attr.eq_ignore_ascii_case("memberOf")
        }
        Filter::GreaterOrEqual(attr, _) | Filter::LessOrEqual(attr, _) => {
            is_operational_timestamp(attr)
        }
        Filter::ApproxMatch(_, _) => false,
    }
}

/// Compiles `filter` into a `(predicate, bind values)` pair, or `None` when
/// `can_compile` would be `false` for this filter or any sub-tree.
pub fn try_compile(filter: &Filter) -> Option<(String, Vec<SqlValue>)> {
    match filter {
        Filter::And(children) => compile_conjunction(children, "AND", "1=1"),
        Filter::Or(children) => compile_conjunction(children, "OR", "1=0"),
        Filter::Not(inner) => {
            let (predicate, values) = try_compile(inner)?;
            Some((format!("NOT ({predicate})"), values))
        }
        Filter::Equality(attr, value) if attr.eq_ignore_ascii_case("objectClass") => Some((
            "lower(entries.object_class) = lower(?)".to_string(),
            vec![value.clone()],
        )),
        Filter::Equality(attr, _) if attr.eq_ignore_ascii_case("memberOf") => None,
        Filter::Equality(attr, value) => Some((
            "EXISTS (SELECT 1 FROM attributes a WHERE a.entry_id = entries.id \
             AND lower(a.name) = lower(?) AND lower(a.value) = lower(?))"
                .to_string(),
            vec![attr.clone(), value.clone()],
        )),
        Filter::Present(attr) if attr.eq_ignore_ascii_case("objectClass") => Some((
            "(entries.object_class IS NOT NULL AND entries.object_class != '')".to_string(),
            vec![],
        )),
        Filter::Present(attr) if attr.eq_ignore_ascii_case("memberOf") => None,
        Filter::Present(attr) => Some((
            "EXISTS (SELECT 1 FROM attributes a WHERE a.entry_id = entries.id \
             AND lower(a.name) = lower(?))"
                .to_string(),
            vec![attr.clone()],
        )),
        Filter::Substrings(attr, _) if attr.eq_ignore_ascii_case("memberOf") => None,
        Filter::Substrings(attr, pattern) => Some((
            "EXISTS (SELECT 1 FROM attributes a WHERE a.entry_id = entries.id \
             AND lower(a.name) = lower(?) AND lower(a.value) LIKE lower(?) ESCAPE '\\')"
                .to_string(),
            vec![attr.clone(), wildcard_to_sql_like(pattern)],
        )),
        Filter::GreaterOrEqual(attr, value) if is_operational_timestamp(attr) => {
            compile_timestamp_comparison(attr, value, ">=")
        }
        Filter::LessOrEqual(attr, value) if is_operational_timestamp(attr) => {
            compile_timestamp_comparison(attr, value, "<=")
        }
        Filter::GreaterOrEqual(_, _) | Filter::LessOrEqual(_, _) | Filter::ApproxMatch(_, _) => {
            None
        }
    }
}

fn compile_conjunction(
    children: &[Filter],
    joiner: &str,
    empty_value: &str,
) -> Option<(String, Vec<SqlValue>)> {
    if children.is_empty() {
        return Some((empty_value.to_string(), vec![]));
    }

    let mut predicates = Vec::with_capacity(children.len());
    let mut values = Vec::new();
    for child in children {
        let (predicate, child_values) = try_compile(child)?;
        predicates.push(format!("({predicate})"));
        values.extend(child_values);
    }
    Some((predicates.join(&format!(" {joiner} ")), values))
}

fn is_operational_timestamp(attr: &str) -> bool {
    OPERATIONAL_TIMESTAMPS.contains(&attr.to_lowercase().as_str())
}

fn compile_timestamp_comparison(
    attr: &str,
    value: &str,
    op: &str,
) -> Option<(String, Vec<SqlValue>)> {
    let column = if attr.eq_ignore_ascii_case("createtimestamp") {
        "entries.created_at"
    } else {
        "entries.updated_at"
    };
    let sql_value = generalized_time_to_sql(value)?;
    Some((format!("{column} {op} ?"), vec![sql_value]))
}

/// Reformats an LDAP generalized-time value (`YYYYMMDDHHMMSS` with optional
/// trailing `Z`) into the store's RFC 3339 datetime form.
fn generalized_time_to_sql(value: &str) -> Option<String> {
    let digits = value.trim_end_matches('Z');
    if digits.len() != 14 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!(
        "{}-{}-{}T{}:{}:{}Z",
        &digits[0..4],
        &digits[4..6],
        &digits[6..8],
        &digits[8..10],
        &digits[10..12],
        &digits[12..14],
    ))
}

/// Maps LDAP `*` to SQL `%`, and escapes the storage engine's own `%`/`_`
/// wildcard metacharacters so only the filter author's `*` is treated as a
/// wildcard.
fn wildcard_to_sql_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_on_object_class_uses_column() {
        let (predicate, values) = try_compile(&Filter::eq("objectClass", "inetOrgPerson")).unwrap();
        assert!(predicate.contains("entries.object_class"));
        assert_eq!(values, vec!["inetOrgPerson".to_string()]);
    }

    #[test]
    fn equality_on_regular_attribute_is_existential() {
        let (predicate, values) = try_compile(&Filter::eq("uid", "jdoe")).unwrap();
        assert!(predicate.contains("EXISTS"));
        assert_eq!(values, vec!["uid".to_string(), "jdoe".to_string()]);
    }

    #[test]
    fn member_of_is_never_compilable() {
        assert!(!can_compile(&Filter::present("memberOf")));
        assert!(try_compile(&Filter::present("memberOf")).is_none());
        assert!(try_compile(&Filter::eq("memberOf", "cn=developers,dc=test,dc=com")).is_none());
        assert!(try_compile(&Filter::Substrings("memberOf".into(), "*developers*".into())).is_none());
    }

    #[test]
    fn approx_match_is_never_compilable() {
        assert!(!can_compile(&Filter::ApproxMatch("cn".into(), "jon".into())));
    }

    #[test]
    fn greater_or_equal_only_compiles_on_timestamps() {
        assert!(!can_compile(&Filter::GreaterOrEqual(
            "uidNumber".into(),
            "1000".into()
        )));
        assert!(can_compile(&Filter::GreaterOrEqual(
            "createTimestamp".into(),
            "20240101000000Z".into()
        )));
    }

    #[test]
    fn timestamp_comparison_reformats_value() {
        let (predicate, values) = try_compile(&Filter::GreaterOrEqual(
            "createTimestamp".into(),
            "20240101000000Z".into(),
        ))
        .unwrap();
        assert!(predicate.contains("entries.created_at"));
        assert_eq!(values, vec!["2024-01-01T00:00:00Z".to_string()]);
    }

    #[test]
    fn and_with_uncompilable_child_is_none() {
        let filter = Filter::And(vec![
            Filter::eq("objectClass", "inetOrgPerson"),
            Filter::present("memberOf"),
        ]);
        assert!(try_compile(&filter).is_none());
    }

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        assert_eq!(try_compile(&Filter::And(vec![])).unwrap().0, "1=1");
        assert_eq!(try_compile(&Filter::Or(vec![])).unwrap().0, "1=0");
    }

    #[test]
    fn substrings_maps_wildcard_and_escapes_like_metachars() {
        let (_, values) = try_compile(&Filter::Substrings("cn".into(), "*so%n_*".into())).unwrap();
        assert_eq!(values[1], "%so\\%n\\_%");
    }
}
