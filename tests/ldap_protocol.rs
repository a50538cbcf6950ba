//! End-to-end protocol tests: a real `Listener` bound to an ephemeral port,
//! driven over an actual `TcpStream` with the production wire codec, backed
//! by a temp-file SQLite database. Mirrors the directory store's own
//! `fresh_store` test fixture (see `store::directory::tests`) one layer up
//! the stack, at the wire boundary instead of the `DirectoryStore` API.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use heracles_ldapd::codec::{LdapCodec, LdapMsg, LdapOp, LdapResult, ModOperation, Modification, PartialAttribute, ResultCode, Scope};
use heracles_ldapd::config::ServerConfig;
use heracles_ldapd::filter::Filter;
use heracles_ldapd::server::Listener;
use heracles_ldapd::store::{create_pool, migrations, DirectoryStore};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

type ClientReader = FramedRead<tokio::net::tcp::OwnedReadHalf, LdapCodec>;
type ClientWriter = FramedWrite<tokio::net::tcp::OwnedWriteHalf, LdapCodec>;

/// Spawns a server against a fresh temp-file database and returns a
/// connected client pair plus the shutdown trigger.
async fn spawn_server() -> (tempfile::TempDir, ClientReader, ClientWriter, heracles_ldapd::server::Shutdown) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("heracles.sqlite3");

    {
        let mut conn = rusqlite::Connection::open(&db_path).unwrap();
        migrations::run(&mut conn).unwrap();
    }

    let mut config = ServerConfig::default();
    config.database_path = db_path.to_string_lossy().to_string();
    config.suffix = "dc=test,dc=com".to_string();
    config.bind_address = "127.0.0.1".to_string();
    config.bind_port = 0;
    config.allow_anonymous_bind = true;
    config.argon2_memory_kib = 19;
    config.argon2_iterations = 2;
    config.argon2_parallelism = 1;

    let pool = create_pool(&config.database_path, config.pool_size).unwrap();
    let store = Arc::new(DirectoryStore::new(pool));
    let (listener, shutdown) = Listener::bind(Arc::new(config), store).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(listener.run());

    let socket = TcpStream::connect(addr).await.unwrap();
    let (r, w) = socket.into_split();
    let reader = FramedRead::new(r, LdapCodec);
    let writer = FramedWrite::new(w, LdapCodec);

    (dir, reader, writer, shutdown)
}

async fn roundtrip(reader: &mut ClientReader, writer: &mut ClientWriter, msg: LdapMsg) -> LdapMsg {
    writer.send(msg).await.unwrap();
    writer.flush().await.unwrap();
    reader.next().await.unwrap().unwrap()
}

async fn add_entry(
    reader: &mut ClientReader,
    writer: &mut ClientWriter,
    message_id: i64,
    dn: &str,
    attributes: Vec<PartialAttribute>,
) {
    let resp = roundtrip(reader, writer, LdapMsg::new(message_id, LdapOp::AddRequest { dn: dn.to_string(), attributes })).await;
    assert_eq!(resp.op, LdapOp::AddResponse(LdapResult::success()), "add failed for {dn}");
}

fn attr(name: &str, values: &[&str]) -> PartialAttribute {
    PartialAttribute::new(name, values.iter().map(|v| v.to_string()).collect())
}

#[tokio::test]
async fn bind_then_whoami_round_trip() {
    let (_dir, mut reader, mut writer, shutdown) = spawn_server().await;

    add_entry(
        &mut reader,
        &mut writer,
        1,
        "uid=admin,dc=test,dc=com",
        vec![
            attr("objectClass", &["inetOrgPerson"]),
            attr("uid", &["admin"]),
            attr("cn", &["admin"]),
            attr("sn", &["admin"]),
            attr("userPassword", &["Secret1!"]),
        ],
    )
    .await;

    let bind_resp = roundtrip(
        &mut reader,
        &mut writer,
        LdapMsg::new(
            2,
            LdapOp::BindRequest {
                version: 3,
                name: "uid=admin,dc=test,dc=com".to_string(),
                password: "Secret1!".to_string(),
            },
        ),
    )
    .await;
    assert_eq!(bind_resp.op, LdapOp::BindResponse(LdapResult::success()));

    let whoami = roundtrip(
        &mut reader,
        &mut writer,
        LdapMsg::new(
            3,
            LdapOp::ExtendedRequest {
                name: "1.3.6.1.4.1.4203.1.11.3".to_string(),
                value: None,
            },
        ),
    )
    .await;
    match whoami.op {
        LdapOp::ExtendedResponse { result, value, .. } => {
            assert_eq!(result, LdapResult::success());
            assert_eq!(value.as_deref(), Some("dn:uid=admin,dc=test,dc=com"));
        }
        other => panic!("expected ExtendedResponse, got {other:?}"),
    }

    writer.send(LdapMsg::new(4, LdapOp::UnbindRequest)).await.unwrap();
    writer.flush().await.unwrap();
    shutdown.trigger();
}

#[tokio::test]
async fn bind_rejects_wrong_password_without_distinguishing_from_unknown_user() {
    let (_dir, mut reader, mut writer, shutdown) = spawn_server().await;

    add_entry(
        &mut reader,
        &mut writer,
        1,
        "uid=admin,dc=test,dc=com",
        vec![
            attr("objectClass", &["inetOrgPerson"]),
            attr("uid", &["admin"]),
            attr("cn", &["admin"]),
            attr("sn", &["admin"]),
            attr("userPassword", &["Secret1!"]),
        ],
    )
    .await;

    let wrong_password = roundtrip(
        &mut reader,
        &mut writer,
        LdapMsg::new(
            2,
            LdapOp::BindRequest {
                version: 3,
                name: "uid=admin,dc=test,dc=com".to_string(),
                password: "WrongPassword".to_string(),
            },
        ),
    )
    .await;
    let unknown_user = roundtrip(
        &mut reader,
        &mut writer,
        LdapMsg::new(
            3,
            LdapOp::BindRequest {
                version: 3,
                name: "uid=nosuchuser,dc=test,dc=com".to_string(),
                password: "WrongPassword".to_string(),
            },
        ),
    )
    .await;

    assert_eq!(wrong_password.op, unknown_user.op);
    match wrong_password.op {
        LdapOp::BindResponse(result) => assert_eq!(result.code, ResultCode::InvalidCredentials),
        other => panic!("expected BindResponse, got {other:?}"),
    }

    shutdown.trigger();
}

#[tokio::test]
async fn subtree_search_with_compiled_filter_and_substring_matching() {
    let (_dir, mut reader, mut writer, shutdown) = spawn_server().await;

    add_entry(
        &mut reader,
        &mut writer,
        1,
        "ou=users,dc=test,dc=com",
        vec![attr("objectClass", &["organizationalUnit"]), attr("ou", &["users"])],
    )
    .await;
    add_entry(
        &mut reader,
        &mut writer,
        2,
        "uid=jdoe,ou=users,dc=test,dc=com",
        vec![
            attr("objectClass", &["inetOrgPerson"]),
            attr("uid", &["jdoe"]),
            attr("cn", &["Jane Doe"]),
            attr("sn", &["Doe"]),
            attr("userPassword", &["x"]),
        ],
    )
    .await;
    add_entry(
        &mut reader,
        &mut writer,
        3,
        "uid=bsmith,ou=users,dc=test,dc=com",
        vec![
            attr("objectClass", &["inetOrgPerson"]),
            attr("uid", &["bsmith"]),
            attr("cn", &["Bob Smith"]),
            attr("sn", &["Smith"]),
            attr("userPassword", &["x"]),
        ],
    )
    .await;

    writer
        .send(LdapMsg::new(
            4,
            LdapOp::SearchRequest {
                base_dn: "dc=test,dc=com".to_string(),
                scope: Scope::WholeSubtree,
                filter: Filter::Substrings("cn".to_string(), "*doe*".to_string()),
            },
        ))
        .await
        .unwrap();
    writer.flush().await.unwrap();

    let mut entries = Vec::new();
    loop {
        let msg = reader.next().await.unwrap().unwrap();
        match msg.op {
            LdapOp::SearchResultEntry { dn, attributes } => entries.push((dn, attributes)),
            LdapOp::SearchResultDone(result) => {
                assert_eq!(result, LdapResult::success());
                break;
            }
            other => panic!("unexpected op during search: {other:?}"),
        }
    }

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "uid=jdoe,ou=users,dc=test,dc=com");
    assert!(!entries[0].1.iter().any(|a| a.name.eq_ignore_ascii_case("userPassword")));

    shutdown.trigger();
}

#[tokio::test]
async fn protected_attribute_rejected_on_modify() {
    let (_dir, mut reader, mut writer, shutdown) = spawn_server().await;

    add_entry(
        &mut reader,
        &mut writer,
        1,
        "uid=jdoe,dc=test,dc=com",
        vec![
            attr("objectClass", &["inetOrgPerson"]),
            attr("uid", &["jdoe"]),
            attr("cn", &["Jane Doe"]),
            attr("sn", &["Doe"]),
            attr("userPassword", &["x"]),
        ],
    )
    .await;

    let resp = roundtrip(
        &mut reader,
        &mut writer,
        LdapMsg::new(
            2,
            LdapOp::ModifyRequest {
                dn: "uid=jdoe,dc=test,dc=com".to_string(),
                changes: vec![Modification {
                    operation: ModOperation::Replace,
                    attribute: attr("createTimestamp", &["20260101000000Z"]),
                }],
            },
        ),
    )
    .await;

    match resp.op {
        LdapOp::ModifyResponse(result) => assert_eq!(result.code, ResultCode::UnwillingToPerform),
        other => panic!("expected ModifyResponse, got {other:?}"),
    }

    shutdown.trigger();
}

#[tokio::test]
async fn member_of_is_visible_on_search_after_group_creation() {
    let (_dir, mut reader, mut writer, shutdown) = spawn_server().await;

    add_entry(
        &mut reader,
        &mut writer,
        1,
        "ou=users,dc=test,dc=com",
        vec![attr("objectClass", &["organizationalUnit"]), attr("ou", &["users"])],
    )
    .await;
    add_entry(
        &mut reader,
        &mut writer,
        2,
        "ou=groups,dc=test,dc=com",
        vec![attr("objectClass", &["organizationalUnit"]), attr("ou", &["groups"])],
    )
    .await;
    add_entry(
        &mut reader,
        &mut writer,
        3,
        "uid=jsmith,ou=users,dc=test,dc=com",
        vec![
            attr("objectClass", &["inetOrgPerson"]),
            attr("uid", &["jsmith"]),
            attr("cn", &["John Smith"]),
            attr("sn", &["Smith"]),
            attr("userPassword", &["x"]),
        ],
    )
    .await;
    add_entry(
        &mut reader,
        &mut writer,
        4,
        "cn=developers,ou=groups,dc=test,dc=com",
        vec![
            attr("objectClass", &["groupOfNames"]),
            attr("cn", &["developers"]),
            attr("member", &["uid=jsmith,ou=users,dc=test,dc=com"]),
        ],
    )
    .await;

    writer
        .send(LdapMsg::new(
            5,
            LdapOp::SearchRequest {
                base_dn: "uid=jsmith,ou=users,dc=test,dc=com".to_string(),
                scope: Scope::BaseObject,
                filter: Filter::present("objectClass"),
            },
        ))
        .await
        .unwrap();
    writer.flush().await.unwrap();

    let entry = loop {
        let msg = reader.next().await.unwrap().unwrap();
        match msg.op {
            LdapOp::SearchResultEntry { dn, attributes } => break (dn, attributes),
            LdapOp::SearchResultDone(_) => panic!("no entry returned"),
            other => panic!("unexpected op during search: {other:?}"),
        }
    };
    let done = reader.next().await.unwrap().unwrap();
    assert_eq!(done.op, LdapOp::SearchResultDone(LdapResult::success()));

    let member_of = entry.1.iter().find(|a| a.name.eq_ignore_ascii_case("memberOf")).unwrap();
    assert_eq!(member_of.values, vec!["cn=developers,ou=groups,dc=test,dc=com".to_string()]);

    shutdown.trigger();
}

#[tokio::test]
async fn root_dse_and_subschema_answer_without_touching_storage() {
    let (_dir, mut reader, mut writer, shutdown) = spawn_server().await;

    let root_dse = roundtrip(
        &mut reader,
        &mut writer,
        LdapMsg::new(
            1,
            LdapOp::SearchRequest {
                base_dn: String::new(),
                scope: Scope::BaseObject,
                filter: Filter::present("objectClass"),
            },
        ),
    )
    .await;
    match root_dse.op {
        LdapOp::SearchResultEntry { dn, attributes } => {
            assert_eq!(dn, "");
            assert!(attributes.iter().any(|a| a.name == "namingContexts" && a.values == vec!["dc=test,dc=com".to_string()]));
        }
        other => panic!("expected SearchResultEntry, got {other:?}"),
    }
    let done = reader.next().await.unwrap().unwrap();
    assert_eq!(done.op, LdapOp::SearchResultDone(LdapResult::success()));

    shutdown.trigger();
}
