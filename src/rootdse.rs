//! Canned responses for the two special search bases that never touch
//! storage: the RootDSE (base = empty string) and the subschema subentry
//! (base = `cn=Subschema`, case-insensitive).
//!
//! Grounded in `sql2ldap`'s `do_search` tree-discovery branch (see
//! `examples/other_examples/107f055a_JoelLinn-sql2ldap__src-ldap_session.rs.rs`),
//! which answers a base-scope search against an empty or suffix-equal base
//! without ever reaching its SQL backend — the same "answer without
//! touching storage" shape this module generalizes to two fixed entries.

use crate::codec::{LdapMsg, LdapOp, LdapResult, PartialAttribute};

/// The crate version, surfaced as `vendorVersion`.
const VENDOR_VERSION: &str = env!("CARGO_PKG_VERSION");
const VENDOR_NAME: &str = "Heracles";

/// Builds the `SearchResultEntry` + `SearchResultDone` pair for a
/// base-scope search against the empty DN (RootDSE).
pub fn root_dse(message_id: i64, suffix: &str) -> Vec<LdapMsg> {
    let attributes = vec![
        PartialAttribute::new("objectClass", vec!["top".to_string()]),
        PartialAttribute::new("namingContexts", vec![suffix.to_string()]),
        PartialAttribute::new("subschemaSubentry", vec!["cn=Subschema".to_string()]),
        PartialAttribute::new("supportedLDAPVersion", vec!["3".to_string()]),
        PartialAttribute::new("vendorName", vec![VENDOR_NAME.to_string()]),
        PartialAttribute::new("vendorVersion", vec![VENDOR_VERSION.to_string()]),
    ];

    vec![
        LdapMsg::new(
            message_id,
            LdapOp::SearchResultEntry {
                dn: String::new(),
                attributes,
            },
        ),
        LdapMsg::new(message_id, LdapOp::SearchResultDone(LdapResult::success())),
    ]
}

/// Whether `base_dn` names the subschema subentry (case-insensitive).
pub fn is_subschema_base(base_dn: &str) -> bool {
    base_dn.trim().eq_ignore_ascii_case("cn=Subschema")
}

/// Builds the `SearchResultEntry` + `SearchResultDone` pair for the
/// subschema subentry. The object-class and attribute-type definition
/// strings are part of the wire contract and must be reproduced verbatim.
pub fn subschema(message_id: i64) -> Vec<LdapMsg> {
    let attributes = vec![
        PartialAttribute::new(
            "objectClass",
            vec!["top".to_string(), "subschema".to_string()],
        ),
        PartialAttribute::new("cn", vec!["Subschema".to_string()]),
        PartialAttribute::new("objectClasses", OBJECT_CLASSES.iter().map(|s| s.to_string()).collect()),
        PartialAttribute::new("attributeTypes", ATTRIBUTE_TYPES.iter().map(|s| s.to_string()).collect()),
    ];

    vec![
        LdapMsg::new(
            message_id,
            LdapOp::SearchResultEntry {
                dn: "cn=Subschema".to_string(),
                attributes,
            },
        ),
        LdapMsg::new(message_id, LdapOp::SearchResultDone(LdapResult::success())),
    ]
}

const OBJECT_CLASSES: [&str; 6] = [
    "( 2.5.6.0 NAME 'top' ABSTRACT MUST objectClass )",
    "( 2.5.6.6 NAME 'person' SUP top STRUCTURAL MUST ( sn $ cn ) )",
    "( 2.5.6.7 NAME 'organizationalPerson' SUP person STRUCTURAL )",
    "( 2.16.840.1.113730.3.2.2 NAME 'inetOrgPerson' SUP organizationalPerson STRUCTURAL \
     MAY ( uid $ mail $ userPassword ) )",
    "( 2.5.6.9 NAME 'groupOfNames' SUP top STRUCTURAL MUST ( cn $ member ) )",
    "( 2.5.6.5 NAME 'organizationalUnit' SUP top STRUCTURAL MUST ou )",
];

const ATTRIBUTE_TYPES: [&str; 10] = [
    "( 2.5.4.0 NAME 'objectClass' EQUALITY objectIdentifierMatch \
     SYNTAX 1.3.6.1.4.1.1466.115.121.1.38 )",
    "( 2.5.4.41 NAME 'name' EQUALITY caseIgnoreMatch SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
    "( 2.5.4.3 NAME 'cn' SUP name )",
    "( 2.5.4.4 NAME 'sn' SUP name )",
    "( 0.9.2342.19200300.100.1.1 NAME 'uid' EQUALITY caseIgnoreMatch \
     SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
    "( 0.9.2342.19200300.100.1.3 NAME 'mail' EQUALITY caseIgnoreIA5Match \
     SYNTAX 1.3.6.1.4.1.1466.115.121.1.15 )",
    "( 2.5.4.35 NAME 'userPassword' EQUALITY octetStringMatch \
     SYNTAX 1.3.6.1.4.1.1466.115.121.1.40 )",
    "( 2.5.4.31 NAME 'member' EQUALITY distinguishedNameMatch \
     SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 )",
    "( 2.5.4.11 NAME 'ou' SUP name )",
    "( 1.2.840.113556.1.2.102 NAME 'memberOf' EQUALITY distinguishedNameMatch \
     SYNTAX 1.3.6.1.4.1.1466.115.121.1.12 NO-USER-MODIFICATION USAGE directoryOperation )",
];
