use serde::{Deserialize, Serialize};

/// 引擎与房间注册表可能返回的错误
///
/// 所有错误都可以在本地恢复：房间保持在最后一个合法状态，
/// 错误由传输层以 `GameError` 消息单播回发起请求的连接。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("房间不存在")]
    RoomNotFound,
    #[error("房间已满")]
    RoomFull,
    #[error("非法操作: {0}")]
    InvalidMove(MoveRejection),
    #[error("人数不足，无法开始游戏")]
    NoOpponent,
    #[error("你已经在一个房间里了")]
    AlreadyInRoom,
    #[error("请先加入或创建房间")]
    NotInRoom,
}

/// `InvalidMove` 的具体原因
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveRejection {
    #[error("还没轮到你")]
    NotYourTurn,
    #[error("当前阶段不允许该操作")]
    WrongPhase,
    #[error("你已经停牌")]
    AlreadyStood,
    #[error("手牌中没有这张副牌")]
    UnknownCard,
    #[error("目标玩家不存在")]
    UnknownPlayer,
}

impl From<MoveRejection> for GameError {
    fn from(reason: MoveRejection) -> Self {
        GameError::InvalidMove(reason)
    }
}

pub type GameResult<T> = Result<T, GameError>;
