use crate::card::CardId;
use crate::state::{ConnectionId, GameSnapshot, PlayerId, RoomId};
use serde::{Deserialize, Serialize};

// --- 客户端 -> 服务器 的消息 ---
// 传输层会为每条消息附上发起连接的 id。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// 加入指定房间；不带 room_id 或房间不存在时创建新房间
    JoinGame {
        room_id: Option<RoomId>,
        multiplayer: bool,
    },
    PlayerReady,
    Hit,
    Stand,
    PlaySideCard {
        card_id: CardId,
        target_player_id: PlayerId,
    },
    /// 主动离开房间，效果与断开连接相同
    Disconnect,
}

// --- 服务器 -> 客户端 的消息 ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// 只发给房间创建者
    GameCreated { room_id: RoomId },
    /// 入座成功后私密地发给该玩家，告知其 id
    RoomJoined { room_id: RoomId, your_id: PlayerId },
    /// 每次状态变化后广播给房间内所有人
    GameState(GameSnapshot),
    /// 进入 Finished 时广播一次；winner 为 None 表示平局
    GameOver {
        winner: Option<PlayerId>,
        results: Vec<PlayerResult>,
    },
    /// 只发给出错的连接
    GameError { message: String },
    PlayerDisconnected { player_id: PlayerId },
}

/// 在 GameOver 消息中，用于描述单个玩家的结果
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlayerResult {
    pub player_id: PlayerId,
    pub score: i32,
    pub has_won: bool,
}

/// 一条待投递的消息以及它的接收者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub recipients: Vec<ConnectionId>,
    pub message: ServerMessage,
}

impl Dispatch {
    pub fn unicast(to: ConnectionId, message: ServerMessage) -> Self {
        Dispatch { recipients: vec![to], message }
    }

    pub fn broadcast(to: Vec<ConnectionId>, message: ServerMessage) -> Self {
        Dispatch { recipients: to, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_client_message_json_shape() {
        let target = Uuid::new_v4();
        let msg = ClientMessage::PlaySideCard { card_id: 3, target_player_id: target };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["PlaySideCard"]["card_id"], 3);
        assert_eq!(json["PlaySideCard"]["target_player_id"], target.to_string());

        let parsed: ClientMessage = serde_json::from_str(r#""Hit""#).unwrap();
        assert_eq!(parsed, ClientMessage::Hit);

        let join: ClientMessage =
            serde_json::from_str(r#"{"JoinGame":{"room_id":null,"multiplayer":true}}"#).unwrap();
        assert_eq!(join, ClientMessage::JoinGame { room_id: None, multiplayer: true });
    }

    #[test]
    fn test_malformed_client_message_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"PlaySideCard":{"card_id":"x"}}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#""Fold""#).is_err());
    }
}
