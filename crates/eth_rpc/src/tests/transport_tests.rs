use super::*;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;
use shared::{
    domain::{AccountAddress, TxHash},
    protocol::CallRequest,
};
use tokio::net::TcpListener;

use crate::Provider;

#[derive(Clone, Default)]
struct StubState {
    receipt_polls: Arc<AtomicUsize>,
}

fn tx_hash() -> String {
    format!("0x{}", "ab".repeat(32))
}

async fn handle_rpc(
    State(state): State<StubState>,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    let payload = match request.method.as_str() {
        "eth_chainId" => json!({ "result": "0x539" }),
        "eth_accounts" => json!({ "result": ["0x00000000000000000000000000000000000000AA"] }),
        "eth_requestAccounts" => json!({
            "error": { "code": 4001, "message": "User rejected the request." }
        }),
        "eth_call" => {
            assert_eq!(request.params[1], "latest");
            json!({ "result": format!("0x{}", "00".repeat(31) + "01") })
        }
        "eth_getTransactionReceipt" => {
            if state.receipt_polls.fetch_add(1, Ordering::SeqCst) < 2 {
                json!({ "result": null })
            } else {
                json!({ "result": {
                    "transactionHash": tx_hash(),
                    "blockNumber": "0x2",
                    "status": "0x1"
                }})
            }
        }
        "broken" => json!({ "result": "not-hex" }),
        other => json!({
            "error": { "code": -32601, "message": format!("method {other} not found") }
        }),
    };
    let mut envelope = json!({ "jsonrpc": "2.0", "id": request.id });
    if let (Some(target), Some(source)) = (envelope.as_object_mut(), payload.as_object()) {
        target.extend(source.clone());
    }
    Json(envelope)
}

async fn handle_unavailable() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "upstream down")
}

async fn spawn_rpc_stub() -> anyhow::Result<(String, StubState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = StubState::default();
    let app = Router::new()
        .route("/", post(handle_rpc))
        .route("/down", post(handle_unavailable))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), state))
}

#[tokio::test]
async fn request_returns_result_payload() {
    let (url, _) = spawn_rpc_stub().await.expect("spawn stub");
    let transport = HttpTransport::new(&url).expect("transport");
    let value = transport
        .request("eth_chainId", json!([]))
        .await
        .expect("chain id");
    assert_eq!(value, json!("0x539"));
}

#[tokio::test]
async fn request_surfaces_rpc_error_object() {
    let (url, _) = spawn_rpc_stub().await.expect("spawn stub");
    let transport = HttpTransport::new(&url).expect("transport");
    let err = transport
        .request("eth_requestAccounts", json!([]))
        .await
        .expect_err("must be rejected");
    assert!(err.is_user_rejection(), "unexpected error: {err}");

    let err = transport
        .request("eth_unknown", json!([]))
        .await
        .expect_err("must be unknown");
    assert!(err.is_method_not_found());
}

#[tokio::test]
async fn non_json_error_status_is_a_transport_failure() {
    let (url, _) = spawn_rpc_stub().await.expect("spawn stub");
    let transport = HttpTransport::new(&format!("{url}down")).expect("transport");
    let err = transport
        .request("eth_chainId", json!([]))
        .await
        .expect_err("must fail");
    assert!(matches!(err, RpcError::Transport(_)), "unexpected error: {err}");
}

#[test]
fn rejects_invalid_url() {
    assert!(HttpTransport::new("not a url").is_err());
}

#[tokio::test]
async fn provider_decodes_typed_results() {
    let (url, _) = spawn_rpc_stub().await.expect("spawn stub");
    let provider = Provider::new(Arc::new(HttpTransport::new(&url).expect("transport")));

    assert_eq!(provider.chain_id().await.expect("chain").0, 1337);

    let signer = provider.signer().await.expect("accounts").expect("signer");
    assert_eq!(
        signer.address().as_str(),
        "0x00000000000000000000000000000000000000aa"
    );

    let output = provider
        .call(&CallRequest {
            from: None,
            to: AccountAddress::from_bytes([1; 20]),
            data: "0x".into(),
        })
        .await
        .expect("call");
    assert_eq!(output.len(), 32);
    assert_eq!(output[31], 1);

    let err = provider
        .request::<String>("broken", json!([]))
        .await
        .and_then(|raw| crate::decode_hex(&raw))
        .expect_err("bad hex");
    assert!(matches!(err, RpcError::Malformed(_)));
}

#[tokio::test]
async fn wait_for_receipt_polls_until_mined() {
    let (url, state) = spawn_rpc_stub().await.expect("spawn stub");
    let provider = Provider::new(Arc::new(HttpTransport::new(&url).expect("transport")))
        .with_receipt_poll_interval(Duration::from_millis(5));
    let hash = TxHash::parse(&tx_hash()).expect("hash");

    let receipt = provider.wait_for_receipt(&hash).await.expect("receipt");
    assert!(receipt.succeeded());
    assert_eq!(receipt.transaction_hash, hash);
    assert_eq!(state.receipt_polls.load(Ordering::SeqCst), 3);
}
