//! LDAPv3 message grammar (RFC 4511 §4.1.1, §4.2-§4.14) as a tagged `LdapOp`
//! enum, one variant per supported operation, decoded/encoded by hand
//! against raw BER tags (`codec::ber`) rather than through a general ASN.1
//! parser — the shape mirrors `LdapOp` in the `kanidm-ldap3_server`
//! reference implementation in the retrieval pack, generalized from its
//! two-operation subset to the full set this spec requires.

use super::ber::{
    self, decode_integer, decode_octet_string, encode_context_octet_string,
    encode_integer_like, encode_octet_string, read_tlv, wrap_sequence, Tlv, CLASS_CONTEXT,
    CLASS_UNIVERSAL, TAG_ENUMERATED, TAG_INTEGER, TAG_OCTET_STRING, TAG_SEQUENCE,
};
use crate::errors::{HeraclesError, Result};
use crate::filter::Filter;

const APP_BIND_REQUEST: u8 = 0;
const APP_BIND_RESPONSE: u8 = 1;
const APP_UNBIND_REQUEST: u8 = 2;
const APP_SEARCH_REQUEST: u8 = 3;
const APP_SEARCH_RESULT_ENTRY: u8 = 4;
const APP_SEARCH_RESULT_DONE: u8 = 5;
const APP_MODIFY_REQUEST: u8 = 6;
const APP_MODIFY_RESPONSE: u8 = 7;
const APP_ADD_REQUEST: u8 = 8;
const APP_ADD_RESPONSE: u8 = 9;
const APP_DEL_REQUEST: u8 = 10;
const APP_DEL_RESPONSE: u8 = 11;
const APP_COMPARE_REQUEST: u8 = 14;
const APP_COMPARE_RESPONSE: u8 = 15;
const APP_EXTENDED_REQUEST: u8 = 23;
const APP_EXTENDED_RESPONSE: u8 = 24;

/// LDAPv3 result codes this server produces (§4.3/§7 of the spec; RFC 4511
/// §4.1.9 has the full table, this is the subset in use).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success = 0,
    OperationsError = 1,
    ProtocolError = 2,
    CompareFalse = 5,
    CompareTrue = 6,
    ConstraintViolation = 19,
    NoSuchObject = 32,
    InvalidCredentials = 49,
    Unavailable = 52,
    UnwillingToPerform = 53,
    ObjectClassViolation = 65,
    EntryAlreadyExists = 68,
}

impl ResultCode {
    fn as_i64(self) -> i64 {
        self as i64
    }
}

/// `LDAPResult`: `resultCode`, `matchedDN`, `diagnosticMessage`. Referrals
/// are never produced by this server (no-goal: no referrals).
#[derive(Debug, Clone, PartialEq)]
pub struct LdapResult {
    pub code: ResultCode,
    pub matched_dn: String,
    pub message: String,
}

impl LdapResult {
    pub fn success() -> Self {
        Self {
            code: ResultCode::Success,
            matched_dn: String::new(),
            message: String::new(),
        }
    }

    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            matched_dn: String::new(),
            message: message.into(),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_integer_like(&mut out, TAG_ENUMERATED, self.code.as_i64());
        encode_octet_string(&mut out, &self.matched_dn);
        encode_octet_string(&mut out, &self.message);
        out
    }
}

/// `baseObject(0) | singleLevel(1) | wholeSubtree(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    BaseObject,
    SingleLevel,
    WholeSubtree,
}

impl Scope {
    fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::BaseObject),
            1 => Ok(Self::SingleLevel),
            2 => Ok(Self::WholeSubtree),
            other => Err(HeraclesError::Protocol(format!("invalid search scope: {other}"))),
        }
    }
}

/// One `PartialAttribute`/`Attribute`: a name and its (possibly
/// multi-valued) values.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialAttribute {
    pub name: String,
    pub values: Vec<String>,
}

impl PartialAttribute {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();
        encode_octet_string(&mut content, &self.name);
        let mut vals = Vec::new();
        for value in &self.values {
            encode_octet_string(&mut vals, value);
        }
        wrap_sequence(&mut content, CLASS_UNIVERSAL, ber::TAG_SET, &vals);
        let mut out = Vec::new();
        wrap_sequence(&mut out, CLASS_UNIVERSAL, TAG_SEQUENCE, &content);
        out
    }

    fn decode(tlv: &Tlv) -> Result<Self> {
        let content = tlv.expect(CLASS_UNIVERSAL, TAG_SEQUENCE)?;
        let (name_tlv, rest) = read_tlv(content)?;
        let name = decode_octet_string(name_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);
        let (vals_tlv, _) = read_tlv(rest)?;
        let vals_content = vals_tlv.expect(CLASS_UNIVERSAL, ber::TAG_SET)?;
        let mut values = Vec::new();
        for value_tlv in ber::read_all_tlv(vals_content)? {
            values.push(decode_octet_string(
                value_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?,
            ));
        }
        Ok(Self { name, values })
    }
}

/// `add(0) | delete(1) | replace(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOperation {
    Add,
    Delete,
    Replace,
}

impl ModOperation {
    fn from_i64(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Add),
            1 => Ok(Self::Delete),
            2 => Ok(Self::Replace),
            other => Err(HeraclesError::Protocol(format!("invalid modify operation: {other}"))),
        }
    }
}

/// One entry in a `ModifyRequest`'s `changes` sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    pub operation: ModOperation,
    pub attribute: PartialAttribute,
}

/// A decoded LDAPv3 protocol operation, request or response.
#[derive(Debug, Clone, PartialEq)]
pub enum LdapOp {
    BindRequest {
        version: i64,
        name: String,
        password: String,
    },
    BindResponse(LdapResult),
    UnbindRequest,
    SearchRequest {
        base_dn: String,
        scope: Scope,
        filter: Filter,
    },
    SearchResultEntry {
        dn: String,
        attributes: Vec<PartialAttribute>,
    },
    SearchResultDone(LdapResult),
    ModifyRequest {
        dn: String,
        changes: Vec<Modification>,
    },
    ModifyResponse(LdapResult),
    AddRequest {
        dn: String,
        attributes: Vec<PartialAttribute>,
    },
    AddResponse(LdapResult),
    DelRequest(String),
    DelResponse(LdapResult),
    CompareRequest {
        dn: String,
        attribute: String,
        value: String,
    },
    CompareResponse(LdapResult),
    ExtendedRequest {
        name: String,
        value: Option<String>,
    },
    ExtendedResponse {
        result: LdapResult,
        name: Option<String>,
        value: Option<String>,
    },
    /// A well-formed `LDAPMessage` whose `protocolOp` APPLICATION tag this
    /// server does not implement. Carried as data rather than an error so
    /// the dispatcher can answer `protocolError` (§4.2) without tearing
    /// down the connection the way a malformed-PDU decode failure does.
    UnsupportedOp(u8),
}

/// A full `LDAPMessage`: a message id plus one protocol operation.
/// Controls (`[0] Controls OPTIONAL`) are parsed-past but never acted on —
/// no control extension is in this spec's scope.
#[derive(Debug, Clone, PartialEq)]
pub struct LdapMsg {
    pub message_id: i64,
    pub op: LdapOp,
}

impl LdapMsg {
    pub fn new(message_id: i64, op: LdapOp) -> Self {
        Self { message_id, op }
    }

    /// Decodes one full `LDAPMessage` from `input`, which must contain
    /// exactly one complete PDU (the framing layer is responsible for
    /// slicing the byte stream into single-PDU chunks first).
    pub fn decode(input: &[u8]) -> Result<Self> {
        let (msg_tlv, trailing) = read_tlv(input)?;
        if !trailing.is_empty() {
            return Err(HeraclesError::Protocol("trailing bytes after LDAPMessage".into()));
        }
        let content = msg_tlv.expect(CLASS_UNIVERSAL, TAG_SEQUENCE)?;

        let (id_tlv, rest) = read_tlv(content)?;
        let message_id = decode_integer(id_tlv.expect(CLASS_UNIVERSAL, TAG_INTEGER)?)?;

        let (op_tlv, _rest_after_op) = read_tlv(rest)?;
        let op = decode_op(&op_tlv)?;

        Ok(Self { message_id, op })
    }

    /// Encodes this message as a complete `LDAPMessage` PDU.
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();
        encode_integer_like(&mut content, TAG_INTEGER, self.message_id);
        content.extend(encode_op(&self.op));

        let mut out = Vec::new();
        wrap_sequence(&mut out, CLASS_UNIVERSAL, TAG_SEQUENCE, &content);
        out
    }
}

fn decode_op(tlv: &Tlv) -> Result<LdapOp> {
    if tlv.class != ber::CLASS_APPLICATION {
        return Err(HeraclesError::Protocol(format!(
            "expected an APPLICATION-tagged protocolOp, found class {}",
            tlv.class
        )));
    }

    match tlv.number {
        APP_BIND_REQUEST => decode_bind_request(tlv.content),
        APP_UNBIND_REQUEST => Ok(LdapOp::UnbindRequest),
        APP_SEARCH_REQUEST => decode_search_request(tlv.content),
        APP_MODIFY_REQUEST => decode_modify_request(tlv.content),
        APP_ADD_REQUEST => decode_add_request(tlv.content),
        APP_DEL_REQUEST => Ok(LdapOp::DelRequest(decode_octet_string(tlv.content))),
        APP_COMPARE_REQUEST => decode_compare_request(tlv.content),
        APP_EXTENDED_REQUEST => decode_extended_request(tlv.content),
        other => Ok(LdapOp::UnsupportedOp(other)),
    }
}

fn encode_op(op: &LdapOp) -> Vec<u8> {
    let mut out = Vec::new();
    match op {
        LdapOp::BindRequest { .. } | LdapOp::SearchRequest { .. } | LdapOp::ModifyRequest { .. }
        | LdapOp::AddRequest { .. } | LdapOp::DelRequest(_) | LdapOp::CompareRequest { .. }
        | LdapOp::ExtendedRequest { .. } | LdapOp::UnbindRequest | LdapOp::UnsupportedOp(_) => {
            unreachable!("the server only encodes responses, never requests")
        }
        LdapOp::BindResponse(result) => {
            wrap_sequence(&mut out, ber::CLASS_APPLICATION, APP_BIND_RESPONSE, &result.encode());
        }
        LdapOp::SearchResultEntry { dn, attributes } => {
            let mut content = Vec::new();
            encode_octet_string(&mut content, dn);
            let mut attrs = Vec::new();
            for attr in attributes {
                attrs.extend(attr.encode());
            }
            wrap_sequence(&mut content, CLASS_UNIVERSAL, TAG_SEQUENCE, &attrs);
            wrap_sequence(&mut out, ber::CLASS_APPLICATION, APP_SEARCH_RESULT_ENTRY, &content);
        }
        LdapOp::SearchResultDone(result) => {
            wrap_sequence(&mut out, ber::CLASS_APPLICATION, APP_SEARCH_RESULT_DONE, &result.encode());
        }
        LdapOp::ModifyResponse(result) => {
            wrap_sequence(&mut out, ber::CLASS_APPLICATION, APP_MODIFY_RESPONSE, &result.encode());
        }
        LdapOp::AddResponse(result) => {
            wrap_sequence(&mut out, ber::CLASS_APPLICATION, APP_ADD_RESPONSE, &result.encode());
        }
        LdapOp::DelResponse(result) => {
            wrap_sequence(&mut out, ber::CLASS_APPLICATION, APP_DEL_RESPONSE, &result.encode());
        }
        LdapOp::CompareResponse(result) => {
            wrap_sequence(&mut out, ber::CLASS_APPLICATION, APP_COMPARE_RESPONSE, &result.encode());
        }
        LdapOp::ExtendedResponse { result, name, value } => {
            let mut content = result.encode();
            if let Some(name) = name {
                encode_context_octet_string(&mut content, 10, name);
            }
            if let Some(value) = value {
                encode_context_octet_string(&mut content, 11, value);
            }
            wrap_sequence(&mut out, ber::CLASS_APPLICATION, APP_EXTENDED_RESPONSE, &content);
        }
    }
    out
}

fn decode_bind_request(content: &[u8]) -> Result<LdapOp> {
    let (version_tlv, rest) = read_tlv(content)?;
    let version = decode_integer(version_tlv.expect(CLASS_UNIVERSAL, TAG_INTEGER)?)?;

    let (name_tlv, rest) = read_tlv(rest)?;
    let name = decode_octet_string(name_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);

    let (auth_tlv, _) = read_tlv(rest)?;
    // simple [0] OCTET STRING is the only authentication choice this
    // server accepts; any other choice tag still decodes (as an empty
    // password) so the Bind handler can uniformly reject it.
    let password = if auth_tlv.class == CLASS_CONTEXT && auth_tlv.number == 0 {
        decode_octet_string(auth_tlv.content)
    } else {
        String::new()
    };

    Ok(LdapOp::BindRequest { version, name, password })
}

fn decode_search_request(content: &[u8]) -> Result<LdapOp> {
    let (base_tlv, rest) = read_tlv(content)?;
    let base_dn = decode_octet_string(base_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);

    let (scope_tlv, rest) = read_tlv(rest)?;
    let scope = Scope::from_i64(decode_integer(scope_tlv.expect(CLASS_UNIVERSAL, TAG_ENUMERATED)?)?)?;

    // derefAliases, sizeLimit, timeLimit, typesOnly: decoded-past, unused.
    let (_deref, rest) = read_tlv(rest)?;
    let (_size_limit, rest) = read_tlv(rest)?;
    let (_time_limit, rest) = read_tlv(rest)?;
    let (_types_only, rest) = read_tlv(rest)?;

    let (filter_tlv, _attributes_and_rest) = read_tlv(rest)?;
    let filter = decode_filter(&filter_tlv)?;

    Ok(LdapOp::SearchRequest { base_dn, scope, filter })
}

/// Decodes the `Filter` CHOICE (RFC 4511 §4.5.1.7) directly into this
/// server's own `filter::Filter` tree — no LDAP-filter-string round trip
/// is needed (see spec Design Notes (c)).
fn decode_filter(tlv: &Tlv) -> Result<Filter> {
    if tlv.class != CLASS_CONTEXT {
        return Err(HeraclesError::Protocol("filter CHOICE must be context-tagged".into()));
    }
    match tlv.number {
        0 => Ok(Filter::And(decode_filter_set(tlv.content)?)),
        1 => Ok(Filter::Or(decode_filter_set(tlv.content)?)),
        2 => {
            let (inner_tlv, _) = read_tlv(tlv.content)?;
            Ok(Filter::Not(Box::new(decode_filter(&inner_tlv)?)))
        }
        3 => {
            let (attr, value) = decode_attribute_value_assertion(tlv.content)?;
            Ok(Filter::Equality(attr, value))
        }
        4 => decode_substring_filter(tlv.content),
        5 => {
            let (attr, value) = decode_attribute_value_assertion(tlv.content)?;
            Ok(Filter::GreaterOrEqual(attr, value))
        }
        6 => {
            let (attr, value) = decode_attribute_value_assertion(tlv.content)?;
            Ok(Filter::LessOrEqual(attr, value))
        }
        7 => Ok(Filter::Present(decode_octet_string(tlv.content))),
        8 => {
            let (attr, value) = decode_attribute_value_assertion(tlv.content)?;
            Ok(Filter::ApproxMatch(attr, value))
        }
        other => Err(HeraclesError::Protocol(format!(
            "unsupported filter choice tag: {other} (extensibleMatch is out of scope)"
        ))),
    }
}

fn decode_filter_set(content: &[u8]) -> Result<Vec<Filter>> {
    ber::read_all_tlv(content)?.iter().map(decode_filter).collect()
}

fn decode_attribute_value_assertion(content: &[u8]) -> Result<(String, String)> {
    let (attr_tlv, rest) = read_tlv(content)?;
    let attr = decode_octet_string(attr_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);
    let (value_tlv, _) = read_tlv(rest)?;
    let value = decode_octet_string(value_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);
    Ok((attr, value))
}

/// Reassembles a `SubstringFilter`'s `initial`/`any`/`final` choices into a
/// single `*`-delimited pattern string, the shape `filter::Filter::Substrings`
/// and the matcher/compiler already operate on.
fn decode_substring_filter(content: &[u8]) -> Result<Filter> {
    let (type_tlv, rest) = read_tlv(content)?;
    let attr = decode_octet_string(type_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);

    let (substrings_tlv, _) = read_tlv(rest)?;
    let substrings_content = substrings_tlv.expect(CLASS_UNIVERSAL, TAG_SEQUENCE)?;

    let mut initial: Option<String> = None;
    let mut any: Vec<String> = Vec::new();
    let mut finalv: Option<String> = None;

    for choice in ber::read_all_tlv(substrings_content)? {
        if choice.class != CLASS_CONTEXT {
            return Err(HeraclesError::Protocol("substring choice must be context-tagged".into()));
        }
        let value = decode_octet_string(choice.content);
        match choice.number {
            0 => initial = Some(value),
            1 => any.push(value),
            2 => finalv = Some(value),
            other => return Err(HeraclesError::Protocol(format!("invalid substring choice tag: {other}"))),
        }
    }

    let mut pattern = String::new();
    if let Some(initial) = initial {
        pattern.push_str(&initial);
    }
    pattern.push('*');
    for segment in any {
        pattern.push_str(&segment);
        pattern.push('*');
    }
    if let Some(finalv) = finalv {
        pattern.push_str(&finalv);
    }

    Ok(Filter::Substrings(attr, pattern))
}

fn decode_modify_request(content: &[u8]) -> Result<LdapOp> {
    let (dn_tlv, rest) = read_tlv(content)?;
    let dn = decode_octet_string(dn_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);

    let (changes_tlv, _) = read_tlv(rest)?;
    let changes_content = changes_tlv.expect(CLASS_UNIVERSAL, TAG_SEQUENCE)?;

    let mut changes = Vec::new();
    for change_tlv in ber::read_all_tlv(changes_content)? {
        let change_content = change_tlv.expect(CLASS_UNIVERSAL, TAG_SEQUENCE)?;
        let (op_tlv, rest) = read_tlv(change_content)?;
        let operation = ModOperation::from_i64(decode_integer(
            op_tlv.expect(CLASS_UNIVERSAL, TAG_ENUMERATED)?,
        )?)?;
        let (attr_tlv, _) = read_tlv(rest)?;
        let attribute = PartialAttribute::decode(&attr_tlv)?;
        changes.push(Modification { operation, attribute });
    }

    Ok(LdapOp::ModifyRequest { dn, changes })
}

fn decode_add_request(content: &[u8]) -> Result<LdapOp> {
    let (dn_tlv, rest) = read_tlv(content)?;
    let dn = decode_octet_string(dn_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);

    let (attrs_tlv, _) = read_tlv(rest)?;
    let attrs_content = attrs_tlv.expect(CLASS_UNIVERSAL, TAG_SEQUENCE)?;
    let attributes = ber::read_all_tlv(attrs_content)?
        .iter()
        .map(PartialAttribute::decode)
        .collect::<Result<Vec<_>>>()?;

    Ok(LdapOp::AddRequest { dn, attributes })
}

fn decode_compare_request(content: &[u8]) -> Result<LdapOp> {
    let (dn_tlv, rest) = read_tlv(content)?;
    let dn = decode_octet_string(dn_tlv.expect(CLASS_UNIVERSAL, TAG_OCTET_STRING)?);

    let (ava_tlv, _) = read_tlv(rest)?;
    let ava_content = ava_tlv.expect(CLASS_UNIVERSAL, TAG_SEQUENCE)?;
    let (attribute, value) = decode_attribute_value_assertion(ava_content)?;

    Ok(LdapOp::CompareRequest { dn, attribute, value })
}

fn decode_extended_request(content: &[u8]) -> Result<LdapOp> {
    let mut remaining = content;
    let (name_tlv, rest) = read_tlv(remaining)?;
    let name = decode_octet_string(name_tlv.expect(CLASS_CONTEXT, 0)?);
    remaining = rest;

    let value = if !remaining.is_empty() {
        let (value_tlv, _) = read_tlv(remaining)?;
        Some(decode_octet_string(value_tlv.expect(CLASS_CONTEXT, 1)?))
    } else {
        None
    };

    Ok(LdapOp::ExtendedRequest { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ber::encode_boolean;
    use crate::filter;

    fn roundtrip(msg: &LdapMsg) -> LdapMsg {
        LdapMsg::decode(&msg.encode()).unwrap()
    }

    #[test]
    fn bind_response_roundtrips() {
        let msg = LdapMsg::new(1, LdapOp::BindResponse(LdapResult::success()));
        let decoded = roundtrip(&msg);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn extended_response_roundtrips_with_optional_fields() {
        let msg = LdapMsg::new(
            2,
            LdapOp::ExtendedResponse {
                result: LdapResult::success(),
                name: Some("1.3.6.1.4.1.4203.1.11.3".to_string()),
                value: Some("dn:uid=admin,dc=test,dc=com".to_string()),
            },
        );
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn search_result_entry_roundtrips_multivalued_attributes() {
        let msg = LdapMsg::new(
            3,
            LdapOp::SearchResultEntry {
                dn: "uid=bob,dc=test,dc=com".to_string(),
                attributes: vec![
                    PartialAttribute::new("objectClass", vec!["inetOrgPerson".to_string()]),
                    PartialAttribute::new(
                        "mail",
                        vec!["a@b.com".to_string(), "c@d.com".to_string()],
                    ),
                ],
            },
        );
        assert_eq!(roundtrip(&msg), msg);
    }

    fn encode_bind_request(version: i64, name: &str, password: &str) -> Vec<u8> {
        let mut content = Vec::new();
        encode_integer_like(&mut content, TAG_INTEGER, version);
        encode_octet_string(&mut content, name);
        encode_context_octet_string(&mut content, 0, password);
        let mut op = Vec::new();
        wrap_sequence(&mut op, ber::CLASS_APPLICATION, APP_BIND_REQUEST, &content);

        let mut msg = Vec::new();
        encode_integer_like(&mut msg, TAG_INTEGER, 1);
        msg.extend(op);
        let mut out = Vec::new();
        wrap_sequence(&mut out, CLASS_UNIVERSAL, TAG_SEQUENCE, &msg);
        out
    }

    #[test]
    fn decodes_a_simple_bind_request() {
        let bytes = encode_bind_request(3, "uid=admin,dc=test,dc=com", "Secret1!");
        let msg = LdapMsg::decode(&bytes).unwrap();
        assert_eq!(msg.message_id, 1);
        match msg.op {
            LdapOp::BindRequest { version, name, password } => {
                assert_eq!(version, 3);
                assert_eq!(name, "uid=admin,dc=test,dc=com");
                assert_eq!(password, "Secret1!");
            }
            other => panic!("expected BindRequest, got {other:?}"),
        }
    }

    fn encode_search_request(base_dn: &str, scope: i64, filter: &[u8]) -> Vec<u8> {
        let mut content = Vec::new();
        encode_octet_string(&mut content, base_dn);
        encode_integer_like(&mut content, TAG_ENUMERATED, scope);
        encode_integer_like(&mut content, TAG_ENUMERATED, 0); // derefAliases
        encode_integer_like(&mut content, TAG_INTEGER, 0); // sizeLimit
        encode_integer_like(&mut content, TAG_INTEGER, 0); // timeLimit
        encode_boolean(&mut content, false); // typesOnly
        content.extend_from_slice(filter);
        // attributes SEQUENCE OF AttributeDescription (empty: "return all")
        wrap_sequence(&mut content, CLASS_UNIVERSAL, TAG_SEQUENCE, &[]);

        let mut op = Vec::new();
        wrap_sequence(&mut op, ber::CLASS_APPLICATION, APP_SEARCH_REQUEST, &content);

        let mut msg = Vec::new();
        encode_integer_like(&mut msg, TAG_INTEGER, 1);
        msg.extend(op);
        let mut out = Vec::new();
        wrap_sequence(&mut out, CLASS_UNIVERSAL, TAG_SEQUENCE, &msg);
        out
    }

    fn encode_present_filter(attr: &str) -> Vec<u8> {
        let mut out = Vec::new();
        ber::write_tlv(&mut out, CLASS_CONTEXT, false, 7, attr.as_bytes());
        out
    }

    fn encode_equality_filter(attr: &str, value: &str) -> Vec<u8> {
        let mut content = Vec::new();
        encode_octet_string(&mut content, attr);
        encode_octet_string(&mut content, value);
        let mut out = Vec::new();
        ber::write_tlv(&mut out, CLASS_CONTEXT, true, 3, &content);
        out
    }

    fn encode_and_filter(children: Vec<Vec<u8>>) -> Vec<u8> {
        let mut content = Vec::new();
        for child in children {
            content.extend(child);
        }
        let mut out = Vec::new();
        ber::write_tlv(&mut out, CLASS_CONTEXT, true, 0, &content);
        out
    }

    #[test]
    fn decodes_search_request_with_present_filter() {
        let bytes = encode_search_request(
            "dc=test,dc=com",
            2,
            &encode_present_filter("objectClass"),
        );
        let msg = LdapMsg::decode(&bytes).unwrap();
        match msg.op {
            LdapOp::SearchRequest { base_dn, scope, filter } => {
                assert_eq!(base_dn, "dc=test,dc=com");
                assert_eq!(scope, Scope::WholeSubtree);
                assert_eq!(filter, Filter::present("objectClass"));
            }
            other => panic!("expected SearchRequest, got {other:?}"),
        }
    }

    #[test]
    fn decodes_compound_and_filter() {
        let bytes = encode_search_request(
            "dc=test,dc=com",
            2,
            &encode_and_filter(vec![
                encode_equality_filter("objectClass", "inetOrgPerson"),
                encode_equality_filter("uid", "jdoe"),
            ]),
        );
        let msg = LdapMsg::decode(&bytes).unwrap();
        match msg.op {
            LdapOp::SearchRequest { filter, .. } => {
                assert_eq!(
                    filter,
                    Filter::And(vec![
                        Filter::eq("objectClass", "inetOrgPerson"),
                        Filter::eq("uid", "jdoe"),
                    ])
                );
            }
            other => panic!("expected SearchRequest, got {other:?}"),
        }
    }

    #[test]
    fn decode_filter_matches_string_parser_for_equivalent_input() {
        let bytes = encode_equality_filter("uid", "jdoe");
        let (tlv, _) = read_tlv(&bytes).unwrap();
        let decoded = decode_filter(&tlv).unwrap();
        assert_eq!(decoded, filter::parse("(uid=jdoe)").unwrap());
    }

    #[test]
    fn unbind_request_has_no_content() {
        let mut op = Vec::new();
        ber::write_tlv(&mut op, ber::CLASS_APPLICATION, APP_UNBIND_REQUEST, &[]);
        let mut msg = Vec::new();
        encode_integer_like(&mut msg, TAG_INTEGER, 1);
        msg.extend(op);
        let mut out = Vec::new();
        wrap_sequence(&mut out, CLASS_UNIVERSAL, TAG_SEQUENCE, &msg);

        let decoded = LdapMsg::decode(&out).unwrap();
        assert_eq!(decoded.op, LdapOp::UnbindRequest);
    }

    #[test]
    fn del_request_roundtrips_plain_dn() {
        let mut op = Vec::new();
        ber::write_tlv(
            &mut op,
            ber::CLASS_APPLICATION,
            APP_DEL_REQUEST,
            "uid=bob,dc=test,dc=com".as_bytes(),
        );
        let mut msg = Vec::new();
        encode_integer_like(&mut msg, TAG_INTEGER, 5);
        msg.extend(op);
        let mut out = Vec::new();
        wrap_sequence(&mut out, CLASS_UNIVERSAL, TAG_SEQUENCE, &msg);

        let decoded = LdapMsg::decode(&out).unwrap();
        assert_eq!(decoded.op, LdapOp::DelRequest("uid=bob,dc=test,dc=com".to_string()));
    }
}
