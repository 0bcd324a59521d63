//! 单条 WebSocket 连接的生命周期。
//!
//! 连接一建立就分配 ConnectionId 并注册出站通道，认证在连接内
//! 通过 authenticate 事件完成。发送任务统一负责对 socket 的写，
//! 接收任务把入站帧交给会话状态机；任一侧结束就整体清理。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

use application::{ClientEvent, ConnectionSession, ServerEvent, SessionDependencies};
use domain::ConnectionId;

use crate::state::AppState;

pub async fn run(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::generate();
    tracing::info!(connection_id = %connection_id, "WebSocket 连接已建立");

    let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.connections.register(connection_id, event_tx.clone()).await;
    let presence_rx = state.presence.subscribe();

    let session = ConnectionSession::new(
        connection_id,
        SessionDependencies {
            verifier: state.verifier.clone(),
            repository: state.repository.clone(),
            presence: state.presence.clone(),
            router: state.router.clone(),
        },
    );

    let (sender, incoming) = socket.split();

    let send_task = tokio::spawn(send_loop(sender, event_rx, presence_rx));
    let recv_task = tokio::spawn(recv_loop(incoming, session, event_tx, state.clone()));

    // 任一方向结束都视为连接终止
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.connections.unregister(connection_id).await;
    if let Some(user_id) = state.presence.unbind_connection(connection_id).await {
        tracing::info!(connection_id = %connection_id, user_id = %user_id, "用户连接断开");
    } else {
        tracing::debug!(connection_id = %connection_id, "连接断开");
    }
}

/// 发送任务：串行消费两个来源的出站事件。
///
/// `event_rx` 是本连接的专属通道（会话回执和投递给本人的消息），
/// `presence_rx` 是全局在线状态变化的广播。
async fn send_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    mut presence_rx: broadcast::Receiver<application::PresenceEvent>,
) {
    loop {
        let event = tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => event,
                    // 所有发送端都已释放，连接收尾
                    None => break,
                }
            }
            presence = presence_rx.recv() => {
                match presence {
                    Ok(change) => ServerEvent::UserStatusChanged {
                        user_id: change.user_id,
                        is_online: change.is_online,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "在线状态广播积压，丢弃过期事件");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        let payload = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(error = %err, "出站事件序列化失败");
                continue;
            }
        };
        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
            break;
        }
    }
}

/// 接收任务：逐帧解析入站事件并交给会话状态机。
///
/// 格式错误的帧只回一条 message_error，不断开连接；
/// 只有认证失败这类致命错误会终止循环。
async fn recv_loop(
    mut incoming: futures_util::stream::SplitStream<WebSocket>,
    mut session: ConnectionSession,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    state: AppState,
) {
    while let Some(Ok(frame)) = incoming.next().await {
        match frame {
            WsMessage::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(err) => {
                        let _ = event_tx.send(ServerEvent::MessageError {
                            error: format!("malformed event: {err}"),
                        });
                        continue;
                    }
                };

                match session.handle_event(event).await {
                    Ok(events) => {
                        for event in events {
                            if event_tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) if err.is_fatal() => {
                        tracing::warn!(
                            connection_id = %session.connection_id(),
                            error = %err,
                            "会话遇到致命错误，关闭连接"
                        );
                        let _ = event_tx.send(ServerEvent::MessageError {
                            error: err.to_string(),
                        });
                        return;
                    }
                    Err(err) => {
                        let _ = event_tx.send(ServerEvent::MessageError {
                            error: err.to_string(),
                        });
                    }
                }
            }
            // 底层 ping/pong 也算活动信号
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                if let Some(user_id) = session.user_id() {
                    state.presence.touch(user_id).await;
                }
            }
            WsMessage::Close(_) => break,
            WsMessage::Binary(_) => {
                let _ = event_tx.send(ServerEvent::MessageError {
                    error: "binary frames are not supported".to_string(),
                });
            }
        }
    }
}
