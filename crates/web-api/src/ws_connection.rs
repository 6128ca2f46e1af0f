use application::Credentials;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, ConnectionPhase, EventKind, OutboundMessage, UserId};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use crate::protocol::ClientCommand;
use crate::state::AppState;

/// 单个 WebSocket 连接
///
/// 建立后先注册出站队列，再加入在线状态表；
/// 断开时先注销出站队列，再离开在线状态表。
pub struct WebSocketConnection {
    socket: Option<WebSocket>,
    state: AppState,
    connection_id: ConnectionId,
    user_id: Option<UserId>,
    phase: ConnectionPhase,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState) -> Self {
        Self {
            socket: Some(socket),
            state,
            connection_id: ConnectionId::generate(),
            user_id: None,
            phase: ConnectionPhase::Connecting,
        }
    }

    /// 运行连接的主循环，直到任意一端断开
    pub async fn run(mut self, credentials: Credentials) {
        let Some(mut socket) = self.socket.take() else {
            return;
        };

        let mut outbound = self.state.hub.register(self.connection_id);

        let joined = match self
            .state
            .lifecycle
            .on_join(self.connection_id, &credentials)
            .await
        {
            Ok(joined) => joined,
            Err(err) => {
                tracing::warn!(error = %err, connection_id = %self.connection_id, "连接加入失败");
                self.state.hub.unregister(self.connection_id);
                self.phase = self.phase.leave();
                let frame = OutboundMessage::error(err.to_string());
                if let Ok(text) = serde_json::to_string(&frame) {
                    let _ = socket.send(WsMessage::Text(text.into())).await;
                }
                let _ = socket.send(WsMessage::Close(None)).await;
                return;
            }
        };

        match self.phase.join() {
            Ok(phase) => self.phase = phase,
            Err(err) => {
                tracing::warn!(error = %err, "连接状态异常");
                return;
            }
        }
        self.user_id = Some(joined.user_id);
        let user_id = joined.user_id;
        let connection_id = self.connection_id;

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let text = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendText(text) => text,
                        WsCommand::SendPong(data) => {
                            if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                                tracing::warn!("Failed to send pong message");
                                break;
                            }
                            continue;
                        }
                    },
                    // 路由器写入的出站消息，按分发顺序到达
                    Some(message) = outbound.recv() => match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize websocket payload");
                            continue;
                        }
                    },
                    else => break,
                };

                if sender.send(WsMessage::Text(text.into())).await.is_err() {
                    tracing::debug!("WebSocket 写入失败，连接已关闭");
                    break;
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收任务：处理来自WebSocket客户端的消息
        let mut recv_task = {
            let state = self.state.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if Self::handle_incoming(&state, user_id, connection_id, message, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        // 等待任意一个任务完成（连接断开），另一个随即中止
        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!("WebSocket发送任务完成");
                recv_task.abort();
            }
            _ = &mut recv_task => {
                tracing::debug!("WebSocket接收任务完成");
                send_task.abort();
            }
        }

        self.close().await;
    }

    async fn close(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = self.phase.leave();

        self.state.hub.unregister(self.connection_id);
        self.state.lifecycle.on_leave(self.connection_id).await;
    }

    /// 处理来自客户端的消息
    async fn handle_incoming(
        state: &AppState,
        user_id: UserId,
        connection_id: ConnectionId,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!("WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    tracing::warn!("Failed to send pong command");
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Text(text) => {
                if let Some(reply) =
                    Self::handle_command(state, user_id, connection_id, text.as_str()).await
                {
                    let payload = serde_json::to_string(&reply).map_err(|_| ())?;
                    cmd_tx
                        .send(WsCommand::SendText(payload))
                        .await
                        .map_err(|_| ())?;
                }
            }
            WsMessage::Binary(_) => {
                tracing::debug!("忽略二进制消息");
            }
        }
        Ok(())
    }

    /// 执行客户端命令，返回需要直接回复给本连接的消息
    async fn handle_command(
        state: &AppState,
        user_id: UserId,
        connection_id: ConnectionId,
        text: &str,
    ) -> Option<OutboundMessage> {
        let command = match ClientCommand::parse(text) {
            Ok(command) => command,
            Err(err) => {
                tracing::debug!(error = %err, connection_id = %connection_id, "无法解析客户端消息");
                return Some(OutboundMessage::error(err.to_string()));
            }
        };

        if let ClientCommand::CheckOnline { ids } = &command {
            let online = match ids {
                Some(ids) => state.presence.online_subset_of(ids.iter().copied()),
                None => state.presence.online_following(user_id),
            };
            let mut online_ids: Vec<UserId> = online.into_iter().collect();
            online_ids.sort();
            return Some(OutboundMessage::new(
                "checkUserOnlineToMe",
                json!({ "online_ids": online_ids }),
            ));
        }

        let event = command.into_event(user_id)?;
        let kind = event.kind;
        let target = event.subject_owner_id;

        if let Err(err) = state.router.dispatch(event).await {
            return Some(OutboundMessage::error(err.to_string()));
        }

        // 关注关系变化后重新拉取双方的快照
        if matches!(kind, EventKind::Follow | EventKind::Unfollow) {
            let mut users = vec![user_id];
            users.extend(target);
            for user in users {
                if let Err(err) = state.lifecycle.refresh_user(user).await {
                    tracing::warn!(error = %err, user_id = %user, "刷新关系快照失败");
                }
            }
        }

        None
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        tracing::debug!(
            connection_id = %self.connection_id,
            user_id = ?self.user_id,
            phase = ?self.phase,
            "WebSocketConnection 被销毁"
        );
    }
}
