// src/config.rs
use std::env;
use std::path::PathBuf;

/// 从环境变量 (及 .env) 读取的服务配置
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// JSON 表文件所在目录
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    /// RUST_LOG 未设置时使用的日志级别
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过任意查找函数构建，测试中不必修改进程环境变量
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set"))?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("invalid PORT {raw:?}: {e}"))?,
            None => 3000,
        };

        let token_ttl_minutes = match lookup("TOKEN_TTL_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| anyhow::anyhow!("invalid TOKEN_TTL_MINUTES {raw:?}: {e}"))?,
            None => 24 * 60,
        };
        if token_ttl_minutes <= 0 {
            anyhow::bail!("TOKEN_TTL_MINUTES must be positive");
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            jwt_secret,
            token_ttl_minutes,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
