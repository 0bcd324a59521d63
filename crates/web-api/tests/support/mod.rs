//! 集成测试脚手架：内存存储 + 真实 HTTP/WebSocket 服务。

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};

use application::{
    repository::memory::InMemoryMessageRepository, Clock, ConnectionRegistry, DeliveryRouter,
    MessageRepository, PresenceRegistry, SystemClock, TokenVerifier,
};
use config::JwtConfig;
use domain::UserId;
use infrastructure::JwtTokenService;
use web_api::{router, AppState};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestApp {
    pub addr: SocketAddr,
    pub tokens: JwtTokenService,
    pub repository: Arc<InMemoryMessageRepository>,
}

pub async fn spawn_app() -> TestApp {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repository = Arc::new(InMemoryMessageRepository::new());
    let presence = Arc::new(PresenceRegistry::new(clock.clone(), chrono::Duration::minutes(5)));
    let connections = Arc::new(ConnectionRegistry::new());
    let delivery = Arc::new(DeliveryRouter::new(
        repository.clone() as Arc<dyn MessageRepository>,
        presence.clone(),
        connections.clone(),
        clock,
    ));
    let tokens = JwtTokenService::new(JwtConfig {
        secret: "test-secret-key-with-at-least-32-characters".to_string(),
        expiration_hours: 24,
    });

    let state = AppState::new(
        presence,
        connections,
        delivery,
        repository.clone() as Arc<dyn MessageRepository>,
        Arc::new(tokens.clone()) as Arc<dyn TokenVerifier>,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    TestApp {
        addr,
        tokens,
        repository,
    }
}

impl TestApp {
    pub fn token_for(&self, user_id: UserId) -> String {
        self.tokens.issue_token(user_id).expect("issue token")
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect_ws(&self) -> WsClient {
        let (ws, _) = connect_async(format!("ws://{}/api/ws", self.addr))
            .await
            .expect("websocket connect");
        ws
    }
}

pub async fn send_event(ws: &mut WsClient, event: Value) {
    ws.send(TungsteniteMessage::text(event.to_string()))
        .await
        .expect("send event");
}

/// 读取下一个文本事件，忽略其他帧类型。
pub async fn recv_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(&text).expect("event json");
        }
    }
}

/// 跳过无关事件直到收到指定名字的事件。
/// 在线状态广播等事件的到达顺序和数量与时序相关，测试只认目标事件。
pub async fn recv_until(ws: &mut WsClient, event_name: &str) -> Value {
    for _ in 0..20 {
        let event = recv_event(ws).await;
        if event["event"] == event_name {
            return event;
        }
    }
    panic!("did not receive {event_name} event");
}

/// 在短窗口内断言不会收到指定名字的事件。
pub async fn assert_no_event(ws: &mut WsClient, event_name: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, ws.next()).await {
            Err(_) => return,
            Ok(None) => return,
            Ok(Some(frame)) => {
                if let Ok(TungsteniteMessage::Text(text)) = frame {
                    let event: Value = serde_json::from_str(&text).expect("event json");
                    assert_ne!(
                        event["event"], event_name,
                        "unexpected {event_name} event: {event}"
                    );
                }
            }
        }
    }
}

/// 认证当前连接并返回 old_messages 事件。
pub async fn authenticate(ws: &mut WsClient, token: &str) -> Value {
    send_event(ws, serde_json::json!({"event": "authenticate", "token": token})).await;
    recv_until(ws, "old_messages").await
}
