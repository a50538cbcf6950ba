//! Operation handlers: one function per supported LDAP request, shaped
//! after the teacher's `LdapConnection::{search,add,modify,delete}` methods
//! but inverted — instead of sending a request and awaiting `ldap3`'s
//! response, each function here takes already-decoded request fields,
//! calls into `store::DirectoryStore`, and returns the `LdapMsg` response(s)
//! to write back to the client.

use std::collections::HashMap;

use tracing::instrument;

use crate::codec::{
    LdapMsg, LdapOp, LdapResult, ModOperation, Modification, PartialAttribute, ResultCode, Scope,
};
use crate::crypto::{self, Argon2Params};
use crate::dn::{dn_eq, DistinguishedName};
use crate::errors::{HeraclesError, Result};
use crate::filter::Filter;
use crate::rootdse;
use crate::server::ConnectionState;
use crate::store::directory::{derive_parent_dn, reject_if_protected};
use crate::store::models::{Entry, NewEntry, PROTECTED_ATTRIBUTES};
use crate::store::{DirectoryStore, EntryUpdate};
use crate::config::ServerConfig;

/// OID of the "Who am I?" extended operation (RFC 4532).
const WHO_AM_I_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

fn argon2_params(config: &ServerConfig) -> Argon2Params {
    Argon2Params {
        memory_kib: config.argon2_memory_kib,
        iterations: config.argon2_iterations,
        parallelism: config.argon2_parallelism,
        key_len: config.argon2_key_len,
    }
}

/// Maps every `HeraclesError` variant to exactly one LDAP result code
/// (§4.3/§7). Total by construction: `unreachable!()` never appears here.
pub fn result_code_for(err: &HeraclesError) -> ResultCode {
    match err {
        HeraclesError::Protocol(_) => ResultCode::ProtocolError,
        HeraclesError::NotFound(_) => ResultCode::NoSuchObject,
        HeraclesError::AlreadyExists(_) => ResultCode::EntryAlreadyExists,
        HeraclesError::InvalidCredentials => ResultCode::InvalidCredentials,
        HeraclesError::UnwillingToPerform(_) => ResultCode::UnwillingToPerform,
        HeraclesError::ConstraintViolation(_) => ResultCode::ConstraintViolation,
        HeraclesError::ObjectClassViolation(_) => ResultCode::ObjectClassViolation,
        HeraclesError::NotAllowedOnNonLeaf(_) => ResultCode::OperationsError,
        HeraclesError::Storage(_) => ResultCode::OperationsError,
        HeraclesError::PasswordHash(_) => ResultCode::OperationsError,
        HeraclesError::PasswordVerify(_) => ResultCode::OperationsError,
        HeraclesError::UnsupportedHashMethod(_) => ResultCode::ConstraintViolation,
        HeraclesError::Configuration(_) => ResultCode::Unavailable,
        HeraclesError::Pool(_) => ResultCode::Unavailable,
        HeraclesError::Timeout(_) => ResultCode::Unavailable,
        HeraclesError::Internal(_) => ResultCode::OperationsError,
    }
}

/// The diagnostic message clients may see (§7): populated only for
/// conditions the client can act on, never for storage/internal faults.
fn diagnostic_message(err: &HeraclesError) -> String {
    match err {
        HeraclesError::UnwillingToPerform(msg) => msg.clone(),
        HeraclesError::ConstraintViolation(msg) => msg.clone(),
        HeraclesError::ObjectClassViolation(msg) => msg.clone(),
        HeraclesError::AlreadyExists(dn) => format!("entry already exists: {dn}"),
        HeraclesError::NotAllowedOnNonLeaf(dn) => format!("entry has children: {dn}"),
        _ => String::new(),
    }
}

fn failure_result(err: &HeraclesError) -> LdapResult {
    LdapResult::new(result_code_for(err), diagnostic_message(err))
}

/// Extracts the `uid` value from `name`'s first RDN. Fails uniformly with
/// `InvalidCredentials` — the caller must never distinguish "not a uid=
/// DN" from "wrong password" on the wire (§7).
fn extract_uid(name: &str) -> Result<String> {
    let dn = DistinguishedName::parse(name).map_err(|_| HeraclesError::InvalidCredentials)?;
    let rdn = dn.rdn().ok_or(HeraclesError::InvalidCredentials)?;
    if !rdn.attr_type.eq_ignore_ascii_case("uid") {
        return Err(HeraclesError::InvalidCredentials);
    }
    Ok(rdn.attr_value.clone())
}

#[instrument(skip(store, config, state, password))]
pub async fn bind(
    store: &DirectoryStore,
    config: &ServerConfig,
    state: &mut ConnectionState,
    message_id: i64,
    name: String,
    password: String,
) -> LdapMsg {
    let outcome = bind_inner(store, config, state, &name, &password).await;
    let result = match outcome {
        Ok(()) => LdapResult::success(),
        Err(e) => failure_result(&e),
    };
    LdapMsg::new(message_id, LdapOp::BindResponse(result))
}

async fn bind_inner(
    store: &DirectoryStore,
    config: &ServerConfig,
    state: &mut ConnectionState,
    name: &str,
    password: &str,
) -> Result<()> {
    if name.is_empty() && password.is_empty() {
        if config.allow_anonymous_bind {
            state.bound_dn = None;
            return Ok(());
        }
        return Err(HeraclesError::InvalidCredentials);
    }

    let uid = extract_uid(name)?;
    let (hash, canonical_dn) = store
        .get_user_password_hash(&uid)
        .await
        .map_err(|_| HeraclesError::InvalidCredentials)?;

    if !dn_eq(name, &canonical_dn) {
        return Err(HeraclesError::InvalidCredentials);
    }

    let verified = crypto::verify(password, &hash).unwrap_or(false);
    if !verified {
        return Err(HeraclesError::InvalidCredentials);
    }

    state.bound_dn = Some(canonical_dn);
    Ok(())
}

/// Canonicalizes a lower-cased stored attribute name back to the spelling
/// the wire contract (§6) uses.
fn canonical_attribute_name(name: &str) -> String {
    match name {
        "objectclass" => "objectClass",
        "createtimestamp" => "createTimestamp",
        "modifytimestamp" => "modifyTimestamp",
        "memberof" => "memberOf",
        other => other,
    }
    .to_string()
}

/// `objectClass` first, then every other stored attribute — never
/// `userPassword` (the store never surfaces it through this path anyway).
fn build_attributes(entry: &Entry) -> Vec<PartialAttribute> {
    let mut names: Vec<&String> = entry.attributes.keys().collect();
    names.sort();

    let mut out = Vec::with_capacity(entry.attributes.len());
    if let Some(values) = entry.attributes.get("objectclass") {
        out.push(PartialAttribute::new("objectClass", values.clone()));
    }
    for name in names {
        if name == "objectclass" || name.eq_ignore_ascii_case("userpassword") {
            continue;
        }
        out.push(PartialAttribute::new(
            canonical_attribute_name(name),
            entry.attributes[name].clone(),
        ));
    }
    out
}

#[instrument(skip(store, config))]
pub async fn search(
    store: &DirectoryStore,
    config: &ServerConfig,
    message_id: i64,
    base_dn: String,
    scope: Scope,
    filter: Filter,
) -> Vec<LdapMsg> {
    let base_trimmed = base_dn.trim();
    if base_trimmed.is_empty() {
        return rootdse::root_dse(message_id, &config.suffix);
    }
    if rootdse::is_subschema_base(base_trimmed) {
        return rootdse::subschema(message_id);
    }

    match store.search_entries(&base_dn, &filter).await {
        Ok(entries) => {
            let mut msgs: Vec<LdapMsg> = entries
                .into_iter()
                .filter(|entry| match scope {
                    Scope::BaseObject => dn_eq(&entry.dn, &base_dn),
                    Scope::SingleLevel => dn_eq(&entry.parent_dn, &base_dn),
                    Scope::WholeSubtree => true,
                })
                .map(|entry| {
                    LdapMsg::new(
                        message_id,
                        LdapOp::SearchResultEntry {
                            dn: entry.dn.clone(),
                            attributes: build_attributes(&entry),
                        },
                    )
                })
                .collect();
            msgs.push(LdapMsg::new(message_id, LdapOp::SearchResultDone(LdapResult::success())));
            msgs
        }
        Err(e) => vec![LdapMsg::new(message_id, LdapOp::SearchResultDone(failure_result(&e)))],
    }
}

/// Builds the attribute map handed to the store, processing `userPassword`
/// through the password module and rejecting protected-operational names.
fn build_attribute_map(
    attributes: &[PartialAttribute],
    params: Argon2Params,
) -> Result<HashMap<String, Vec<String>>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for attr in attributes {
        reject_if_protected(&attr.name)?;
        if attr.name.eq_ignore_ascii_case("userPassword") {
            let mut processed = Vec::with_capacity(attr.values.len());
            for value in &attr.values {
                processed.push(crypto::process(value, params)?);
            }
            map.entry(attr.name.clone()).or_default().extend(processed);
        } else {
            map.entry(attr.name.clone()).or_default().extend(attr.values.clone());
        }
    }
    Ok(map)
}

#[instrument(skip(store, config, attributes))]
pub async fn add(
    store: &DirectoryStore,
    config: &ServerConfig,
    message_id: i64,
    dn: String,
    attributes: Vec<PartialAttribute>,
) -> LdapMsg {
    let outcome = add_inner(store, config, &dn, attributes).await;
    let result = match outcome {
        Ok(()) => LdapResult::success(),
        Err(e) => failure_result(&e),
    };
    LdapMsg::new(message_id, LdapOp::AddResponse(result))
}

async fn add_inner(
    store: &DirectoryStore,
    config: &ServerConfig,
    dn: &str,
    attributes: Vec<PartialAttribute>,
) -> Result<()> {
    let attrs = build_attribute_map(&attributes, argon2_params(config))?;

    let primary_class = attrs
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("objectclass"))
        .and_then(|(_, values)| values.first())
        .cloned()
        .ok_or_else(|| {
            HeraclesError::ObjectClassViolation("at least one objectClass value is required".into())
        })?;

    let new_entry = NewEntry {
        parent_dn: derive_parent_dn(dn),
        dn: dn.to_string(),
        object_class: primary_class,
        attributes: attrs,
    };

    store.create_entry(new_entry).await?;
    Ok(())
}

#[instrument(skip(store, config, changes))]
pub async fn modify(
    store: &DirectoryStore,
    config: &ServerConfig,
    message_id: i64,
    dn: String,
    changes: Vec<Modification>,
) -> LdapMsg {
    let outcome = modify_inner(store, config, &dn, changes).await;
    let result = match outcome {
        Ok(()) => LdapResult::success(),
        Err(e) => failure_result(&e),
    };
    LdapMsg::new(message_id, LdapOp::ModifyResponse(result))
}

async fn modify_inner(
    store: &DirectoryStore,
    config: &ServerConfig,
    dn: &str,
    changes: Vec<Modification>,
) -> Result<()> {
    let entry = store
        .get_entry(dn)
        .await?
        .ok_or_else(|| HeraclesError::NotFound(dn.to_string()))?;

    let mut working = entry.attributes;
    for protected in PROTECTED_ATTRIBUTES {
        working.remove(protected);
    }

    let params = argon2_params(config);
    let mut new_password_hash: Option<String> = None;

    for change in changes {
        reject_if_protected(&change.attribute.name)?;
        let is_password = change.attribute.name.eq_ignore_ascii_case("userPassword");
        let key = change.attribute.name.to_lowercase();

        match change.operation {
            ModOperation::Add => {
                if is_password {
                    for value in &change.attribute.values {
                        new_password_hash = Some(crypto::process(value, params)?);
                    }
                } else {
                    working.entry(key).or_default().extend(change.attribute.values);
                }
            }
            ModOperation::Delete => {
                if is_password {
                    // userPassword has no independent deletion story: every
                    // inetOrgPerson entry must retain a hash.
                } else if change.attribute.values.is_empty() {
                    working.remove(&key);
                } else if let Some(existing) = working.get_mut(&key) {
                    existing.retain(|v| {
                        !change.attribute.values.iter().any(|target| target.eq_ignore_ascii_case(v))
                    });
                    if existing.is_empty() {
                        working.remove(&key);
                    }
                }
            }
            ModOperation::Replace => {
                if is_password {
                    if let Some(value) = change.attribute.values.first() {
                        new_password_hash = Some(crypto::process(value, params)?);
                    }
                } else {
                    working.remove(&key);
                    if !change.attribute.values.is_empty() {
                        working.insert(key, change.attribute.values);
                    }
                }
            }
        }
    }

    store
        .update_entry(dn, EntryUpdate { attributes: working, new_password_hash })
        .await?;
    Ok(())
}

#[instrument(skip(store))]
pub async fn delete(store: &DirectoryStore, message_id: i64, dn: String) -> LdapMsg {
    let result = match store.delete_entry(&dn).await {
        Ok(()) => LdapResult::success(),
        Err(e) => failure_result(&e),
    };
    LdapMsg::new(message_id, LdapOp::DelResponse(result))
}

#[instrument(skip(store))]
pub async fn compare(
    store: &DirectoryStore,
    message_id: i64,
    dn: String,
    attribute: String,
    value: String,
) -> LdapMsg {
    let outcome = compare_inner(store, &dn, &attribute, &value).await;
    let result = match outcome {
        Ok(code) => LdapResult::new(code, String::new()),
        Err(e) => failure_result(&e),
    };
    LdapMsg::new(message_id, LdapOp::CompareResponse(result))
}

async fn compare_inner(
    store: &DirectoryStore,
    dn: &str,
    attribute: &str,
    value: &str,
) -> Result<ResultCode> {
    let entry = store
        .get_entry(dn)
        .await?
        .ok_or_else(|| HeraclesError::NotFound(dn.to_string()))?;

    let matched = entry
        .get_all(attribute)
        .map(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
        .unwrap_or(false);

    Ok(if matched { ResultCode::CompareTrue } else { ResultCode::CompareFalse })
}

/// "Who am I?" (RFC 4532) is the only extended operation this server
/// supports; any other OID is `unavailable`. Pure — never touches storage.
pub fn extended(state: &ConnectionState, message_id: i64, name: String) -> LdapMsg {
    if name != WHO_AM_I_OID {
        return LdapMsg::new(
            message_id,
            LdapOp::ExtendedResponse {
                result: LdapResult::new(
                    ResultCode::Unavailable,
                    format!("unsupported extended operation: {name}"),
                ),
                name: None,
                value: None,
            },
        );
    }

    let value = match &state.bound_dn {
        Some(dn) => format!("dn:{dn}"),
        None => String::new(),
    };

    LdapMsg::new(
        message_id,
        LdapOp::ExtendedResponse {
            result: LdapResult::success(),
            name: Some(WHO_AM_I_OID.to_string()),
            value: Some(value),
        },
    )
}
