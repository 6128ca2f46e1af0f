//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - 数据库连接（通知存储、社交关系）
//! - JWT认证
//! - 实时分发参数

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// 环境变量覆盖前缀，例如 `SOCIAL__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "SOCIAL__";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// JWT认证配置
    pub jwt: JwtConfig,
    /// 实时分发配置
    pub fanout: FanoutConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 数据库配置
///
/// `url` 为空时使用内存存储（仅开发环境）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.url.trim().is_empty()
    }
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

/// 实时分发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// 每个连接的出站队列深度，队列满视为一次瞬时投递失败
    pub connection_buffer: usize,
    /// 用户第一个会话上线时是否通知在线的关注者
    pub announce_online: bool,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            connection_buffer: 64,
            announce_online: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn fanout_from_env() -> FanoutConfig {
    let defaults = FanoutConfig::default();
    FanoutConfig {
        connection_buffer: env_parse("FANOUT_CONNECTION_BUFFER")
            .unwrap_or(defaults.connection_buffer),
        announce_online: env_parse("FANOUT_ANNOUNCE_ONLINE").unwrap_or(defaults.announce_online),
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    /// 关键安全配置（DATABASE_URL, JWT_SECRET）缺失时返回错误
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;

        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_parse("SERVER_PORT").unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiration_hours: env_parse("JWT_EXPIRATION_HOURS").unwrap_or(24),
            },
            fanout: fanout_from_env(),
        })
    }

    /// 从环境变量加载配置，开发环境版本
    /// 提供不安全的默认值，仅用于测试和开发；未设置 DATABASE_URL 时使用内存存储
    pub fn from_env_with_defaults() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_parse("SERVER_PORT").unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_default(),
                max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                    "dev-secret-key-not-for-production-use-minimum-32-chars".to_string()
                }),
                expiration_hours: env_parse("JWT_EXPIRATION_HOURS").unwrap_or(24),
            },
            fanout: fanout_from_env(),
        }
    }

    /// 分层加载：开发默认值 → YAML 文件 → `SOCIAL__` 前缀环境变量
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: AppConfig = Figment::from(Serialized::defaults(Self::from_env_with_defaults()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidServerPort(
                "port must be greater than 0".to_string(),
            ));
        }

        // 验证JWT密钥长度（至少256位/32字节）
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        if self.jwt.expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT expiration must be positive".to_string(),
            ));
        }

        if !self.database.is_in_memory() && self.database.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        if self.fanout.connection_buffer == 0 {
            return Err(ConfigError::InvalidFanoutConfig(
                "connection buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid server port: {0}")]
    InvalidServerPort(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid fanout configuration: {0}")]
    InvalidFanoutConfig(String),
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl Default for AppConfig {
    /// 默认配置使用开发环境版本
    /// 注意：生产环境应该明确调用 from_env() 而不是依赖默认值
    fn default() -> Self {
        Self::from_env_with_defaults()
    }
}
