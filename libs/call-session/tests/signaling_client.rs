use std::time::Duration;

use call_session::{BackoffConfig, ClientError, SignalingClient, SignalingConfig};
use futures_util::{SinkExt, StreamExt};
use shared_proto::signaling::{ClientEvent, ServerEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_async, accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        Message,
    },
    WebSocketStream,
};
use uuid::Uuid;

fn fast_backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        jitter_ratio: 0.0,
        max_attempts,
    }
}

fn client(addr: std::net::SocketAddr, booking_id: Uuid, backoff: BackoffConfig) -> SignalingClient {
    SignalingClient::new(SignalingConfig {
        server_url: format!("ws://{addr}/ws"),
        token: "test-token".to_string(),
        booking_id,
        backoff,
    })
}

async fn next_event(ws: &mut WebSocketStream<TcpStream>) -> ClientEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within timeout")
            .expect("socket open")
            .expect("frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("client event");
        }
    }
}

#[tokio::test]
async fn rejoins_after_drop_and_leaves_on_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let booking_id = Uuid::new_v4();

    let relay = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let first = next_event(&mut ws).await;
        ws.close(None).await.expect("close");
        drop(ws);

        let (stream, _) = listener.accept().await.expect("accept again");
        let mut ws = accept_async(stream).await.expect("handshake again");
        let second = next_event(&mut ws).await;
        let joined = ServerEvent::SessionJoined { booking_id, room_size: 1 };
        ws.send(Message::Text(serde_json::to_string(&joined).expect("encode")))
            .await
            .expect("send");
        let forwarded = next_event(&mut ws).await;
        let last = next_event(&mut ws).await;
        vec![first, second, forwarded, last]
    });

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, mut in_rx) = mpsc::unbounded_channel();
    let signaling = client(addr, booking_id, fast_backoff(3));
    let running = tokio::spawn(async move { signaling.run(out_rx, in_tx).await });

    let event = tokio::time::timeout(Duration::from_secs(5), in_rx.recv())
        .await
        .expect("event within timeout");
    assert_eq!(event, Some(ServerEvent::SessionJoined { booking_id, room_size: 1 }));

    out_tx.send(ClientEvent::Typing { booking_id }).expect("queue");
    drop(out_tx);

    let result = running.await.expect("client task");
    assert!(result.is_ok(), "client ended with {result:?}");
    assert_eq!(
        relay.await.expect("relay task"),
        vec![
            ClientEvent::JoinSession { booking_id },
            ClientEvent::JoinSession { booking_id },
            ClientEvent::Typing { booking_id },
            ClientEvent::LeaveSession { booking_id },
        ]
    );
}

#[tokio::test]
async fn refused_credentials_stop_reconnecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let refuse = |_: &Request, _: Response| -> Result<Response, ErrorResponse> {
            let mut response = ErrorResponse::new(Some("unauthenticated".to_string()));
            *response.status_mut() = StatusCode::UNAUTHORIZED;
            Err(response)
        };
        let _ = accept_hdr_async(stream, refuse).await;
    });

    let (_out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, _in_rx) = mpsc::unbounded_channel();
    let result = client(addr, Uuid::new_v4(), fast_backoff(5))
        .run(out_rx, in_tx)
        .await;
    assert!(matches!(result, Err(ClientError::Rejected(401))), "got {result:?}");
}

#[tokio::test]
async fn gives_up_after_bounded_attempts() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr")
    };

    let (_out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, _in_rx) = mpsc::unbounded_channel();
    let result = client(addr, Uuid::new_v4(), fast_backoff(2))
        .run(out_rx, in_tx)
        .await;
    assert!(
        matches!(result, Err(ClientError::ReconnectExhausted { attempts: 2 })),
        "got {result:?}"
    );
}
