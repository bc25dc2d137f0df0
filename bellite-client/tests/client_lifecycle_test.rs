//! Client lifecycle integration tests
//!
//! Connection, authentication, ready sequencing and close handling against a
//! mock host.

mod common;

use bellite_client::{BelliteApi, ClientBuilder, PerformArgs, SessionState};
use bellite_core::{Error, ErrorReporter};
use common::{builder_for, connect_ready, MockBelliteServer, LIMIT, POLL};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn recorder(log: &Log, key: &'static str) -> impl Fn(&bellite_client::Bellite, &[Value]) -> bellite_core::Result<()> {
    let log = Rc::clone(log);
    move |_: &bellite_client::Bellite, args: &[Value]| {
        log.borrow_mut().push(format!("{key}{}", Value::Array(args.to_vec())));
        Ok(())
    }
}

fn with_recorders(builder: ClientBuilder, log: &Log) -> ClientBuilder {
    builder
        .on("connect", recorder(log, "connect"))
        .on("auth", recorder(log, "auth"))
        .on("ready", recorder(log, "ready"))
        .on("close", recorder(log, "close"))
}

#[tokio::test]
async fn test_connect_auth_ready_sequence() {
    let mut server = MockBelliteServer::start().await;
    let log: Log = Rc::default();

    let client = with_recorders(builder_for(&server), &log)
        .connect()
        .await
        .unwrap();
    assert_eq!(client.state(), SessionState::Authenticating);

    let payload = client.run_until_settled(&client.ready(), LIMIT).await.unwrap();
    assert_eq!(payload, json!([null, true, "authorized"]));
    assert_eq!(client.state(), SessionState::Ready);
    assert_eq!(
        *log.borrow(),
        vec![
            r#"connect[]"#,
            r#"auth[true,[null,true,"authorized"]]"#,
            r#"ready[]"#,
        ]
    );

    let auth = server.wait_for_message().await.unwrap();
    assert_eq!(
        auth,
        json!({"jsonrpc": "2.0", "id": 100, "method": "auth", "params": [common::TOKEN]})
    );

    client.close();
    server.shutdown().await;
}

#[tokio::test]
async fn test_rejected_token_fires_only_auth_false() {
    let server = MockBelliteServer::start().await;
    let log: Log = Rc::default();

    let builder = ClientBuilder::new()
        .with_credentials(server.credentials_with_token("wrong"))
        .poll_timeout(POLL);
    let client = with_recorders(builder, &log).connect().await.unwrap();

    let result = client.run_until_settled(&client.ready(), LIMIT).await;
    assert_eq!(
        result,
        Err(Error::Rpc(json!({"code": 401, "message": "Unauthorized"})))
    );
    assert_eq!(result.unwrap_err().rpc_code(), Some(401));

    // The host hangs up after refusing
    tokio::time::timeout(LIMIT, client.run(POLL)).await.unwrap();
    assert_eq!(client.state(), SessionState::Closed);
    assert_eq!(
        *log.borrow(),
        vec![
            r#"connect[]"#,
            r#"auth[false,{"code":401,"message":"Unauthorized"}]"#,
            r#"close[]"#,
        ]
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_host_hangup_rejects_pending_then_closes() {
    let server = MockBelliteServer::start().await;
    let client = connect_ready(&server).await;

    let closes = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&closes);
    client.on("close", move |_, _| {
        *counter.borrow_mut() += 1;
        Ok(())
    });

    let hung = client.perform(0, "shutdown", PerformArgs::new()).unwrap();
    let result = client.run_until_settled(&hung, LIMIT).await;

    assert_eq!(result, Err(Error::ConnectionClosed));
    assert_eq!(*closes.borrow(), 1);
    assert!(!client.is_connected());
    assert_eq!(client.pending_count(), 0);

    // Calls after close fail synchronously
    assert_eq!(client.ping().outcome(), Some(Err(Error::NotConnected)));

    server.shutdown().await;
}

#[tokio::test]
async fn test_local_close() {
    let server = MockBelliteServer::start().await;
    let client = connect_ready(&server).await;

    assert!(client.is_connected());
    assert!(client.close());
    assert!(!client.close());
    assert!(!client.is_connected());
    assert_eq!(client.state(), SessionState::Closed);
    assert!(!client.run_once(POLL).await);

    server.shutdown().await;
}

#[tokio::test]
async fn test_connect_refused() {
    let server = MockBelliteServer::start().await;
    let credentials = server.credentials();
    server.shutdown().await;

    let result = ClientBuilder::new()
        .with_credentials(credentials)
        .with_reporter(ErrorReporter::silent())
        .connect()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_malformed_credentials_leave_client_disconnected() {
    let log: Log = Rc::default();
    let client = with_recorders(ClientBuilder::new().with_credentials("localhost/token"), &log)
        .connect()
        .await
        .unwrap();

    assert_eq!(client.state(), SessionState::Disconnected);
    assert_eq!(client.ready().outcome(), Some(Err(Error::NotConnected)));
    assert!(log.borrow().is_empty());
    assert!(!client.run_once(POLL).await);
}
