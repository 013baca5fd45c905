//! 应用配置
//!
//! 加载顺序：内置默认值 → 可选 TOML 文件 → `MLQUEUE__` 前缀环境变量。
//! 所有键都有默认值，零配置即可启动。

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub queue: QueueConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: u32,
}

/// JWT 配置（保留位：当前认证路径为 API Key 精确匹配，不走 JWT）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiry_hours: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub standard: u32,
    pub premium: u32,
    pub batch: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub worker_count: usize,
    pub max_size: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub timeout_seconds: u64,
    pub retry_count: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                env: "development".to_string(),
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/mlqueue".to_string(),
                max_connections: 100,
                min_connections: 10,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                pool_size: 100,
            },
            jwt: JwtConfig {
                secret: "default-secret-change-me".to_string(),
                expiry_hours: 24,
            },
            rate_limit: RateLimitConfig {
                standard: 100,
                premium: 1000,
                batch: 10,
            },
            queue: QueueConfig {
                worker_count: 10,
                max_size: 10000,
            },
            webhook: WebhookConfig {
                timeout_seconds: 30,
                retry_count: 3,
            },
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.env", "development")?
            .set_default("database.url", "postgresql://localhost/mlqueue")?
            .set_default("database.max_connections", 100)?
            .set_default("database.min_connections", 10)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("redis.pool_size", 100)?
            .set_default("jwt.secret", "default-secret-change-me")?
            .set_default("jwt.expiry_hours", 24)?
            .set_default("rate_limit.standard", 100)?
            .set_default("rate_limit.premium", 1000)?
            .set_default("rate_limit.batch", 10)?
            .set_default("queue.worker_count", 10)?
            .set_default("queue.max_size", 10000)?
            .set_default("webhook.timeout_seconds", 30)?
            .set_default("webhook.retry_count", 3)?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("MLQUEUE")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.worker_count == 0 {
            return Err(anyhow::anyhow!("queue.worker_count 必须大于 0"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("database.max_connections 必须大于 0"));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(anyhow::anyhow!(
                "database.min_connections 不能大于 max_connections"
            ));
        }
        if self.rate_limit.standard == 0
            || self.rate_limit.premium == 0
            || self.rate_limit.batch == 0
        {
            return Err(anyhow::anyhow!("rate_limit 各限额必须大于 0"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server.port 无效"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.queue.worker_count, 10);
        assert_eq!(config.rate_limit.standard, 100);
        assert_eq!(config.rate_limit.premium, 1000);
        assert_eq!(config.rate_limit.batch, 10);
        assert_eq!(config.webhook.retry_count, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.database.max_connections, 100);
        assert_eq!(config.redis.pool_size, 100);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some("/nonexistent/mlqueue.toml")).is_err());
    }

    #[test]
    fn test_from_toml_overrides() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9090
            env = "test"

            [database]
            url = "postgresql://localhost/mlqueue_test"
            max_connections = 5
            min_connections = 1

            [redis]
            url = "redis://localhost:6380"
            pool_size = 10

            [jwt]
            secret = "s"
            expiry_hours = 1

            [rate_limit]
            standard = 10
            premium = 20
            batch = 2

            [queue]
            worker_count = 2
            max_size = 100

            [webhook]
            timeout_seconds = 5
            retry_count = 1
        "#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.server.bind_address(), "127.0.0.1:9090");
        assert_eq!(config.queue.worker_count, 2);
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.queue.worker_count = 0;
        assert!(config.validate().is_err());
    }
}
