//! 服务器配置，全部从环境变量读取

use std::env;
use std::net::{Ipv4Addr, SocketAddr};

use pazaak_core::RegistryConfig;

const DEFAULT_PORT: u16 = 25917;
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// 每个连接的发送队列长度
    pub channel_capacity: usize,
    pub registry: RegistryConfig,
}

impl ServerConfig {
    /// - `PAZAAK_ADDR`：完整监听地址，例如 `127.0.0.1:9000`
    /// - `PORT`：只指定端口，监听 0.0.0.0 (默认 25917)
    /// - `PAZAAK_CONCEAL_HANDS`：`1`/`true` 时对其他玩家隐藏副牌点数
    /// - `PAZAAK_CHANNEL_CAPACITY`：每个连接的发送队列长度 (默认 32)
    pub fn from_env() -> Self {
        ServerConfig {
            addr: server_addr(),
            channel_capacity: env::var("PAZAAK_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_CHANNEL_CAPACITY),
            registry: RegistryConfig {
                conceal_opponent_hands: env::var("PAZAAK_CONCEAL_HANDS")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(false),
            },
        }
    }
}

fn server_addr() -> SocketAddr {
    if let Some(addr) = env::var("PAZAAK_ADDR").ok().and_then(|v| v.parse().ok()) {
        return addr;
    }
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        for on in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(parse_flag(on), "{:?}", on);
        }
        for off in ["0", "false", "", "nope"] {
            assert!(!parse_flag(off), "{:?}", off);
        }
    }
}
