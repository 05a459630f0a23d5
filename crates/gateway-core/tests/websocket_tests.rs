//! End to end over a real websocket

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

mod common;

use common::mock_engine;
use rvoip_gateway_core::{GatewayClient, GatewayConfig, GatewayError, SessionState};

/// Minimal gateway: echoes the subprotocol, answers create and attach, reports every verb
async fn spawn_gateway() -> (String, mpsc::UnboundedReceiver<Value>, tokio::sync::oneshot::Receiver<Option<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/janus", listener.local_addr().unwrap());
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (protocol_tx, protocol_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut offered = None;
        let mut ws = tokio_tungstenite::accept_hdr_async(socket, |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            if let Some(protocol) = request.headers().get("sec-websocket-protocol") {
                offered = protocol.to_str().ok().map(str::to_owned);
                response.headers_mut().insert("sec-websocket-protocol", protocol.clone());
            }
            Ok(response)
        })
        .await
        .unwrap();
        let _ = protocol_tx.send(offered);

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else { continue };
            let request: Value = serde_json::from_str(text.as_str()).unwrap();
            let reply = match request["janus"].as_str() {
                Some("create") => Some(json!({"janus": "success", "transaction": request["transaction"], "data": {"id": 11}})),
                Some("attach") => Some(json!({
                    "janus": "success", "session_id": 11, "transaction": request["transaction"], "data": {"id": 22}
                })),
                _ => None,
            };
            let _ = requests_tx.send(request);
            if let Some(reply) = reply {
                ws.send(Message::text(reply.to_string())).await.unwrap();
            }
        }
    });

    (url, requests_rx, protocol_rx)
}

#[tokio::test]
async fn test_connect_bootstrap_and_disconnect() {
    let (url, mut requests, protocol) = spawn_gateway().await;
    let (engine, _probe) = mock_engine();

    let (client, _events) = GatewayClient::connect(GatewayConfig::new(url), engine).await.unwrap();
    client.wait_until_ready().await.unwrap();
    assert_eq!(protocol.await.unwrap().as_deref(), Some("janus-protocol"));

    let snapshot = client.snapshot();
    assert_eq!(snapshot.session_state, SessionState::HandleAttached);
    assert_eq!(snapshot.session_id, Some(11));
    assert_eq!(snapshot.handle_id, Some(22));

    client.disconnect().await.unwrap();

    let mut verbs = Vec::new();
    while let Ok(Some(request)) = tokio::time::timeout(Duration::from_secs(2), requests.recv()).await {
        verbs.push(request["janus"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(verbs, vec!["create", "attach", "destroy"]);
}

#[tokio::test]
async fn test_server_close_stops_client() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_hdr_async(socket, |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            if let Some(protocol) = request.headers().get("sec-websocket-protocol") {
                response.headers_mut().insert("sec-websocket-protocol", protocol.clone());
            }
            Ok(response)
        })
        .await
        .unwrap();
        // Read the create, then hang up
        let _ = ws.next().await;
        let _ = ws.close(None).await;
    });

    let (engine, _probe) = mock_engine();
    let (client, _events) = GatewayClient::connect(GatewayConfig::new(url), engine).await.unwrap();
    let err = client.wait_until_ready().await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport { .. }), "got {:?}", err);
    assert!(client.snapshot().stopped);
}
