//! 服务端配置
//!
//! TOML 配置文件 + 命令行参数。配置文件不存在时使用默认值，
//! 命令行参数覆盖文件中的设置。

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::warn;

use protocol::{
    ABANDONED_LOBBY_SECS, DISPROVE_TIMEOUT_SECS, HEARTBEAT_TIMEOUT_SECS, MAX_CONNECTIONS,
    TURN_TIMEOUT_SECS,
};

use crate::disprove::DisproveTimeoutPolicy;
use crate::game::GameRules;

/// 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Clue-Less game server", long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "clue-server.toml")]
    pub config: PathBuf,

    /// 监听地址，覆盖配置文件（如 0.0.0.0:9000）
    #[arg(short, long)]
    pub listen: Option<String>,

    /// 启用 debug 日志
    #[arg(short, long)]
    pub debug: bool,

    /// 固定随机种子，用于复现对局
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("clue-server.toml"),
            listen: None,
            debug: false,
            seed: None,
        }
    }
}

/// 配置根
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub game: GameSettings,
    pub logging: LoggingSettings,
}

/// 网络设置
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: String,
    /// 最大同时连接数
    pub max_connections: usize,
    /// 多久收不到客户端消息视为断线（秒）
    pub heartbeat_timeout_secs: u64,
    /// 对局中所有玩家离线多久后移除大厅（秒）
    pub abandoned_lobby_secs: u64,
}

/// 规则设置
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct GameSettings {
    /// 开局前每个玩家必须自己选择角色
    pub require_character_selection: bool,
    /// 服务端代替没有匹配牌的玩家声明无法反驳
    pub auto_skip_non_holders: bool,
    /// 反驳时限（秒），0 表示不限时
    pub disprove_timeout_secs: u64,
    pub disprove_timeout_policy: DisproveTimeoutPolicy,
    /// 回合时限（秒），0 表示不限时
    pub turn_timeout_secs: u64,
    /// 固定随机种子
    pub rng_seed: Option<u64>,
}

/// 日志设置
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace / debug / info / warn / error
    pub level: String,
    /// 输出 JSON 格式日志
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9000".to_string(),
            max_connections: MAX_CONNECTIONS,
            heartbeat_timeout_secs: HEARTBEAT_TIMEOUT_SECS,
            abandoned_lobby_secs: ABANDONED_LOBBY_SECS,
        }
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            require_character_selection: false,
            auto_skip_non_holders: false,
            disprove_timeout_secs: DISPROVE_TIMEOUT_SECS,
            disprove_timeout_policy: DisproveTimeoutPolicy::default(),
            turn_timeout_secs: TURN_TIMEOUT_SECS,
            rng_seed: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ServerSettings {
    pub fn abandoned_lobby_timeout(&self) -> Duration {
        Duration::from_secs(self.abandoned_lobby_secs)
    }
}

impl GameSettings {
    pub fn rules(&self) -> GameRules {
        GameRules {
            auto_skip_non_holders: self.auto_skip_non_holders,
            disprove_timeout_policy: self.disprove_timeout_policy,
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn disprove_timeout(&self) -> Duration {
        Duration::from_secs(self.disprove_timeout_secs)
    }
}

impl ServerConfig {
    /// 从 TOML 文件读取；文件不存在时返回默认配置
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("配置文件 {} 不存在，使用默认配置", path.display());
            return Ok(Self::default());
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("配置文件格式错误 {}", path.display()))
    }

    /// 用命令行参数覆盖
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(listen) = &args.listen {
            self.server.listen_addr = listen.clone();
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
        if args.seed.is_some() {
            self.game.rng_seed = args.seed;
        }
    }

    /// 读取配置文件并应用命令行参数
    pub async fn from_args(args: &Args) -> Result<Self> {
        let mut config = Self::load(&args.config).await?;
        config.apply_args(args);
        Ok(config)
    }
}
