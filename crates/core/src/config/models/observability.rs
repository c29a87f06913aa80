use serde::{Deserialize, Serialize};

/// 日志输出格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.level,
                valid_levels
            ));
        }
        Ok(())
    }
}

/// 审计日志后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditBackend {
    #[default]
    Log,
    Database,
}

/// 审计日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub backend: AuditBackend,
    pub database_url: Option<String>,
    pub table: String,
    pub max_connections: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::default(),
            database_url: None,
            table: "integration_log".to_string(),
            max_connections: 5,
        }
    }
}

impl AuditConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == AuditBackend::Database {
            match &self.database_url {
                Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {}
                Some(url) => {
                    return Err(anyhow::anyhow!("审计数据库URL必须是PostgreSQL格式: {}", url))
                }
                None => return Err(anyhow::anyhow!("使用数据库审计时必须配置database_url")),
            }
        }

        if self.table.is_empty()
            || !self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(anyhow::anyhow!("无效的审计表名: {}", self.table));
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("审计数据库最大连接数必须大于0"));
        }

        Ok(())
    }
}

/// 指标导出配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Prometheus 指标监听地址，未配置时不导出
    pub metrics_bind_address: Option<String>,
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(addr) = &self.metrics_bind_address {
            addr.parse::<std::net::SocketAddr>()
                .map_err(|e| anyhow::anyhow!("无效的指标监听地址 {}: {}", addr, e))?;
        }
        Ok(())
    }
}
