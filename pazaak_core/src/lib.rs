//! # Pazaak 核心逻辑库
//!
//! 这个 `core` crate 包含了 Pazaak 对局的所有核心状态管理、
//! 游戏逻辑、庄家 AI、房间注册表以及客户端-服务器通信消息的定义。
//! 它与具体的网络传输解耦：注册表接收 `ClientMessage`，
//! 返回带有接收者列表的 `Dispatch`，由上层负责投递。

mod card;
mod dealer;
mod error;
mod logic;
mod message;
mod room;
mod state;

pub use card::*;

pub use dealer::*;

pub use error::*;

pub use message::*;

pub use room::*;

pub use state::*;
