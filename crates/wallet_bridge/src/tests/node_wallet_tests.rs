use super::*;
use std::sync::Mutex;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use shared::protocol::RpcRequest;
use tokio::net::TcpListener;

#[derive(Clone)]
struct NodeState {
    accounts: Arc<Mutex<Vec<String>>>,
    chain_id: Arc<Mutex<String>>,
}

async fn handle_rpc(State(state): State<NodeState>, Json(request): Json<RpcRequest>) -> Json<Value> {
    let body = match request.method.as_str() {
        "eth_chainId" => json!({ "result": state.chain_id.lock().expect("chain").clone() }),
        "eth_accounts" => json!({ "result": state.accounts.lock().expect("accounts").clone() }),
        _ => json!({ "error": { "code": -32601, "message": "Method not found" } }),
    };
    let mut envelope = json!({ "jsonrpc": "2.0", "id": request.id });
    if let (Some(target), Some(source)) = (envelope.as_object_mut(), body.as_object()) {
        target.extend(source.clone());
    }
    Json(envelope)
}

async fn spawn_node(accounts: Vec<String>) -> anyhow::Result<(String, NodeState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = NodeState {
        accounts: Arc::new(Mutex::new(accounts)),
        chain_id: Arc::new(Mutex::new("0x539".to_string())),
    };
    let app = Router::new()
        .route("/", post(handle_rpc))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), state))
}

fn address(byte: u8) -> String {
    format!("0x{}", format!("{byte:02x}").repeat(20))
}

async fn next_event(events: &mut broadcast::Receiver<WalletEvent>) -> WalletEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event before timeout")
        .expect("event channel open")
}

#[tokio::test]
async fn detect_returns_none_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let wallet = NodeWallet::detect(&format!("http://{addr}/"), Duration::from_millis(10)).await;
    assert!(wallet.is_none());
}

#[tokio::test]
async fn request_accounts_falls_back_to_eth_accounts() {
    let (url, _) = spawn_node(vec![address(0xaa)]).await.expect("node");
    let wallet = NodeWallet::detect(&url, Duration::from_secs(60))
        .await
        .expect("wallet detected");

    let accounts = wallet.request_accounts().await.expect("accounts");
    assert_eq!(accounts, vec![AccountAddress::parse(&address(0xaa)).expect("addr")]);
}

#[tokio::test]
async fn polling_emits_account_and_chain_changes() {
    let (url, state) = spawn_node(vec![address(0xaa)]).await.expect("node");
    let wallet = NodeWallet::detect(&url, Duration::from_millis(20))
        .await
        .expect("wallet detected");
    let mut events = wallet.subscribe_events();

    state.accounts.lock().expect("accounts").clear();
    assert_eq!(
        next_event(&mut events).await,
        WalletEvent::AccountsChanged(Vec::new())
    );

    *state.chain_id.lock().expect("chain") = "0xaa36a7".to_string();
    assert_eq!(
        next_event(&mut events).await,
        WalletEvent::ChainChanged(ChainId(11_155_111))
    );
}
