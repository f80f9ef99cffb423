use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pazaak_core::{ClientMessage, ConnectionId, Dispatch, RoomRegistry, ServerMessage};

mod config;

use crate::config::ServerConfig;

// 服务器全局状态
struct AppState {
    // 房间与游戏状态全部由注册表持有，房间锁在注册表内部管理
    registry: RoomRegistry,
    // 将连接 id 映射到该连接的发送通道
    connections: DashMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    channel_capacity: usize,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    info!(?config, "加载配置");

    let state = SharedState::new(AppState {
        registry: RoomRegistry::new(config.registry),
        connections: DashMap::new(),
        channel_capacity: config.channel_capacity,
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    info!("服务器正在监听 {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.channel_capacity);

    // 每个连接一个不透明 id，同时作为玩家 id
    let connection_id: ConnectionId = Uuid::new_v4();
    state.connections.insert(connection_id, tx.clone());
    info!(%connection_id, "客户端已连接");

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(client_msg) => {
                    let dispatches = state.registry.handle(connection_id, client_msg);
                    deliver(&state, dispatches).await;
                }
                Err(e) => {
                    warn!(%connection_id, "解析消息失败: {}", e);
                    let _ = tx
                        .send(ServerMessage::GameError { message: format!("无法解析的消息: {}", e) })
                        .await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // 客户端断开连接，执行清理工作。断线与其他动作一样经过房间锁串行化。
    let dispatches = state.registry.remove_player(connection_id);
    state.connections.remove(&connection_id);
    deliver(&state, dispatches).await;
    info!(%connection_id, "客户端连接关闭");
}

/// 把注册表产生的消息投递到各个连接
async fn deliver(state: &AppState, dispatches: Vec<Dispatch>) {
    for Dispatch { recipients, message } in dispatches {
        for player_id in recipients {
            // 先克隆发送端，不跨 await 持有 DashMap 的引用
            let Some(conn) = state.connections.get(&player_id).map(|c| c.value().clone()) else {
                continue;
            };
            if conn.send(message.clone()).await.is_err() {
                // 发送失败，说明该玩家也断开了，后续由其自己的 handle_socket 任务处理
                warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
            }
        }
    }
}
