use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;
use uuid::Uuid;

use pazaak_core::{CardId, ClientMessage, GameSnapshot, PlayerId, RoomId, ServerMessage};

#[derive(Parser)]
#[command(name = "pazaak-client")]
#[command(about = "Pazaak 命令行客户端")]
struct Args {
    /// 服务器地址：命令行参数 > PAZAAK_URL > 默认值
    #[arg(env = "PAZAAK_URL", default_value = "ws://127.0.0.1:25917/ws")]
    url: Url,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Args { url } = Args::parse();

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 启动一个任务来处理从服务器接收的消息
    tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                    Ok(server_msg) => {
                        println!("\n<-- {}", describe(&server_msg));
                        print!("> "); // 重新显示输入提示符
                        let _ = std::io::stdout().flush();
                    }
                    Err(e) => eprintln!("解析服务器消息失败: {}", e),
                },
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- Pazaak 客户端 ---");
    println!("可用命令:");
    println!("  solo                      - 创建单人房间 (对战庄家)");
    println!("  create                    - 创建双人房间");
    println!("  join <房间ID>             - 加入一个双人房间");
    println!("  ready                     - 准备");
    println!("  hit                       - 要牌");
    println!("  stand                     - 停牌");
    println!("  play <副牌ID> <目标玩家ID> - 打出副牌");
    println!("  leave                     - 离开房间");
    println!("  exit                      - 退出");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let parts: Vec<&str> = line.split_whitespace().collect();

        let client_msg = match parts.as_slice() {
            ["solo"] => ClientMessage::JoinGame { room_id: None, multiplayer: false },
            ["create"] => ClientMessage::JoinGame { room_id: None, multiplayer: true },
            ["join", room] => match room.parse::<RoomId>() {
                Ok(room_id) => ClientMessage::JoinGame { room_id: Some(room_id), multiplayer: true },
                Err(_) => {
                    println!("无效的房间ID格式");
                    continue;
                }
            },
            ["ready"] => ClientMessage::PlayerReady,
            ["hit"] => ClientMessage::Hit,
            ["stand"] => ClientMessage::Stand,
            ["play", card, target] => match (card.parse::<CardId>(), target.parse::<PlayerId>()) {
                (Ok(card_id), Ok(target_player_id)) => ClientMessage::PlaySideCard { card_id, target_player_id },
                _ => {
                    println!("用法: play <副牌ID> <目标玩家ID>");
                    continue;
                }
            },
            ["leave"] => ClientMessage::Disconnect,
            ["exit"] => {
                println!("正在断开连接...");
                break;
            }
            [] => continue,
            _ => {
                println!("未知命令: {}", line);
                continue;
            }
        };

        let payload = serde_json::to_string(&client_msg)?;
        write.send(Message::Text(payload.into())).await?;
    }

    Ok(())
}

fn describe(msg: &ServerMessage) -> String {
    match msg {
        ServerMessage::GameCreated { room_id } => format!("房间已创建: {}", room_id),
        ServerMessage::RoomJoined { room_id, your_id } => format!("已加入房间 {}，你的ID: {}", room_id, your_id),
        ServerMessage::GameState(snapshot) => describe_snapshot(snapshot),
        ServerMessage::GameOver { winner, results } => {
            let mut out = match winner {
                Some(id) => format!("游戏结束，胜者: {}", short(id)),
                None => "游戏结束，平局".to_string(),
            };
            for r in results {
                out.push_str(&format!("\n    {} 分数 {}{}", short(&r.player_id), r.score, if r.has_won { " (胜)" } else { "" }));
            }
            out
        }
        ServerMessage::GameError { message } => format!("错误: {}", message),
        ServerMessage::PlayerDisconnected { player_id } => format!("玩家 {} 已离开", short(player_id)),
    }
}

fn describe_snapshot(snapshot: &GameSnapshot) -> String {
    let mut out = format!(
        "[{:?}] 当前: {} 剩余时间: {}s",
        snapshot.phase,
        snapshot.current_player_id.as_ref().map_or("-".to_string(), short),
        snapshot.turn_time_left_ms / 1000,
    );
    for p in &snapshot.players {
        let board: Vec<String> = p.board.iter().map(|c| c.to_string()).collect();
        let hand: Vec<String> = p.hand.iter().map(|c| c.to_string()).collect();
        out.push_str(&format!(
            "\n    {}{} 分数 {:>3} 桌面 [{}] 手牌 [{}] ({}张){}",
            p.id,
            if p.is_dealer { " (庄家)" } else { "" },
            p.score,
            board.join(" "),
            hand.join(" "),
            p.hand_size,
            if p.has_stood { " 已停牌" } else { "" },
        ));
    }
    out
}

fn short(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_argument() {
        let args = Args::try_parse_from(["pazaak-client", "ws://10.0.0.2:9000/ws"]).unwrap();
        assert_eq!(args.url.as_str(), "ws://10.0.0.2:9000/ws");
        assert!(Args::try_parse_from(["pazaak-client", "不是地址"]).is_err());
    }
}
