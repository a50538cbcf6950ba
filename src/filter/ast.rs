//! The filter tree: an immutable tagged sum, one variant per LDAP filter
//! kind, built once per request and never mutated.

use crate::dn::escape_filter_value;
use std::fmt;

/// A parsed LDAP search filter (RFC 4515).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `(&(a)(b)...)` — every child must match; an empty conjunction is true.
    And(Vec<Filter>),
    /// `(|(a)(b)...)` — some child must match; an empty disjunction is false.
    Or(Vec<Filter>),
    /// `(!(a))` — negates its single child.
    Not(Box<Filter>),
    /// `(attr=value)`.
    Equality(String, String),
    /// `(attr=*)` — attribute presence.
    Present(String),
    /// `(attr=*pattern*)` — the raw pattern string, wildcard positions
    /// preserved, split by the matcher/compiler on `*`.
    Substrings(String, String),
    /// `(attr>=value)`.
    GreaterOrEqual(String, String),
    /// `(attr<=value)`.
    LessOrEqual(String, String),
    /// `(attr~=value)`.
    ApproxMatch(String, String),
}

impl Filter {
    /// Shorthand for an equality filter.
    pub fn eq(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equality(attr.into(), value.into())
    }

    /// Shorthand for a presence filter.
    pub fn present(attr: impl Into<String>) -> Self {
        Self::Present(attr.into())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equality(attr, value) => {
                write!(f, "({}={})", attr, escape_filter_value(value))
            }
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::Substrings(attr, pattern) => {
                let joined = pattern
                    .split('*')
                    .map(escape_filter_value)
                    .collect::<Vec<_>>()
                    .join("*");
                write!(f, "({}={})", attr, joined)
            }
            Filter::GreaterOrEqual(attr, value) => {
                write!(f, "({}>={})", attr, escape_filter_value(value))
            }
            Filter::LessOrEqual(attr, value) => {
                write!(f, "({}<={})", attr, escape_filter_value(value))
            }
            Filter::ApproxMatch(attr, value) => {
                write!(f, "({}~={})", attr, escape_filter_value(value))
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::And(children) => {
                write!(f, "(&")?;
                for c in children {
                    write!(f, "{}", c)?;
                }
                write!(f, ")")
            }
            Filter::Or(children) => {
                write!(f, "(|")?;
                for c in children {
                    write!(f, "{}", c)?;
                }
                write!(f, ")")
            }
        }
    }
}
