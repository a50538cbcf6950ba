//! In-memory representations of directory rows.

use std::collections::HashMap;

/// A directory object, hydrated from `entries` plus its joined `attributes`
/// rows and the operational attributes computed on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Stable numeric identifier.
    pub id: i64,
    /// Distinguished name, as stored (case-insensitive equality elsewhere).
    pub dn: String,
    /// Parent DN, or empty for the suffix entry.
    pub parent_dn: String,
    /// Primary object class (first `objectClass` value given on Add).
    pub object_class: String,
    /// Creation instant, RFC 3339 UTC.
    pub created_at: String,
    /// Last-modification instant, RFC 3339 UTC.
    pub updated_at: String,
    /// Lower-cased attribute name to ordered values, excluding
    /// `userPassword` and including the computed operational attributes.
    pub attributes: HashMap<String, Vec<String>>,
}

impl Entry {
    /// Returns the first value of an attribute, case-insensitive on name.
    pub fn get_first(&self, attr: &str) -> Option<&str> {
        self.attributes
            .get(&attr.to_lowercase())
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    /// Returns all values of an attribute, case-insensitive on name.
    pub fn get_all(&self, attr: &str) -> Option<&Vec<String>> {
        self.attributes.get(&attr.to_lowercase())
    }
}

/// The three primary object classes this server recognizes, plus `top`
/// which every entry carries but which never drives marker-row selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    OrganizationalUnit,
    InetOrgPerson,
    GroupOfNames,
}

impl ObjectKind {
    /// Classifies a primary object class string.
    pub fn from_object_class(object_class: &str) -> Option<Self> {
        match object_class.to_lowercase().as_str() {
            "organizationalunit" => Some(Self::OrganizationalUnit),
            "inetorgperson" => Some(Self::InetOrgPerson),
            "groupofnames" => Some(Self::GroupOfNames),
            _ => None,
        }
    }

    /// The attribute names required on Add for this kind, beyond `dn` and
    /// `objectClass` themselves.
    pub fn required_attributes(self) -> &'static [&'static str] {
        match self {
            Self::OrganizationalUnit => &["ou"],
            Self::InetOrgPerson => &["uid", "cn", "sn"],
            Self::GroupOfNames => &["cn"],
        }
    }
}

/// An entry as submitted on Add, before persistence.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub dn: String,
    pub parent_dn: String,
    pub object_class: String,
    /// All requested attribute values, including `userPassword` (the store
    /// is responsible for routing it to `users.password_hash` instead of
    /// `attributes`).
    pub attributes: HashMap<String, Vec<String>>,
}

/// The protected operational attribute names: never accepted on Add/Modify,
/// always computed on read. `memberOf` is computed from `group_members`
/// (see `store::directory`) and is rejected on writes for the same reason
/// as the timestamps (§4.9).
pub const PROTECTED_ATTRIBUTES: [&str; 3] = ["createtimestamp", "modifytimestamp", "memberof"];

/// Returns true if `attr` names a protected operational attribute.
pub fn is_protected_attribute(attr: &str) -> bool {
    PROTECTED_ATTRIBUTES.contains(&attr.to_lowercase().as_str())
}
