use std::{net::SocketAddr, sync::Arc, time::Duration};

use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use infrastructure::{InMemoryNotificationStore, InMemorySocialGraph};
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;
use web_api::{router, AppState, FanoutConfig, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub jwt: Arc<JwtService>,
    pub graph: Arc<InMemorySocialGraph>,
    pub notifications: Arc<InMemoryNotificationStore>,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub async fn start(announce_online: bool) -> Self {
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "integration-test-secret-key-with-enough-length".to_string(),
            expiration_hours: 1,
        }));
        let graph = Arc::new(InMemorySocialGraph::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());

        let fanout = FanoutConfig {
            connection_buffer: 64,
            announce_online,
        };
        let state = AppState::new(&fanout, jwt.clone(), graph.clone(), notifications.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router(state).into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            jwt,
            graph,
            notifications,
            _shutdown: shutdown_tx,
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn token(&self, user_id: UserId) -> String {
        self.jwt.generate_token(user_id).expect("token")
    }

    /// 建立连接，并用一次在线查询确认已完成加入
    pub async fn connect(&self, user_id: UserId) -> WsClient {
        let url = format!("ws://{}/api/v1/ws?token={}", self.addr, self.token(user_id));
        let (mut ws, _) = connect_async(url).await.expect("websocket connect");

        send_json(&mut ws, serde_json::json!({ "event": "checkUserOnline", "data": { "ids": [] } })).await;
        let reply = next_event(&mut ws, "checkUserOnlineToMe").await;
        assert_eq!(reply["data"]["online_ids"], serde_json::json!([]));
        ws
    }
}

pub fn user() -> UserId {
    UserId::from(Uuid::new_v4())
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一条文本帧
pub async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

/// 读取下一条帧并校验事件名
pub async fn next_event(ws: &mut WsClient, event: &str) -> Value {
    let frame = next_json(ws).await;
    assert_eq!(frame["event"], event, "unexpected frame: {frame}");
    frame
}

/// 在给定时间内没有收到文本帧
pub async fn assert_silent(ws: &mut WsClient) {
    match timeout(Duration::from_millis(200), ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(TungsteniteMessage::Text(text)))) => panic!("unexpected frame: {text}"),
        Ok(_) => {}
    }
}
