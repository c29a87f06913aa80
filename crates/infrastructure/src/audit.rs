use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use match_core::{
    config::AuditConfig,
    traits::{AuditCategory, AuditOperation, AuditSink},
    MatchError, MatchResult,
};
use sqlx::PgPool;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// 以结构化tracing事件输出的审计日志
///
/// 事件目标为 `audit`，可通过 `RUST_LOG=audit=info` 单独过滤。
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn log(&self, category: AuditCategory, operation: AuditOperation, source: &str, message: &str) {
        info!(
            target: "audit",
            category = category.as_str(),
            operation = operation.as_str(),
            source = source,
            "{message}"
        );
    }
}

/// 写入数据库 `integration_log` 表的审计日志
///
/// 每条记录在独立任务中异步插入，调用方不等待结果；插入失败只记录警告日志。
/// 进程退出前用 [`AuditSink::flush`] 等待尚未完成的插入。
#[derive(Debug, Clone)]
pub struct DbAuditSink {
    pool: PgPool,
    insert_sql: Arc<str>,
    inserts: TaskTracker,
}

impl DbAuditSink {
    pub fn new(pool: PgPool, table: &str) -> Self {
        let insert_sql = format!(
            "INSERT INTO {table} (category, operation, source, message, created_at) \
             VALUES ($1, $2, $3, $4, $5)"
        );
        Self {
            pool,
            insert_sql: insert_sql.into(),
            inserts: TaskTracker::new(),
        }
    }

    /// 尚未完成的插入数
    pub fn pending(&self) -> usize {
        self.inserts.len()
    }

    /// 按配置建立连接池
    pub async fn connect(config: &AuditConfig) -> MatchResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| MatchError::Configuration("审计数据库URL未配置".to_string()))?;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| MatchError::Audit(format!("连接审计数据库失败: {e}")))?;

        info!("审计数据库连接成功, 表: {}", config.table);
        Ok(Self::new(pool, &config.table))
    }
}

#[async_trait]
impl AuditSink for DbAuditSink {
    fn log(&self, category: AuditCategory, operation: AuditOperation, source: &str, message: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("不在Tokio运行时中, 丢弃审计记录: {} {} {}", category, operation, source);
            return;
        };

        let pool = self.pool.clone();
        let sql = Arc::clone(&self.insert_sql);
        let source = source.to_string();
        let message = message.to_string();

        self.inserts.spawn_on(
            async move {
                let result = sqlx::query(&sql)
                    .bind(category.as_str())
                    .bind(operation.as_str())
                    .bind(&source)
                    .bind(&message)
                    .bind(Utc::now())
                    .execute(&pool)
                    .await;

                match result {
                    Ok(_) => debug!("审计记录已写入: {} {} {}", category, operation, source),
                    Err(e) => warn!("写入审计记录失败: {e}"),
                }
            },
            &runtime,
        );
    }

    async fn flush(&self, grace: Duration) {
        self.inserts.close();
        if timeout(grace, self.inserts.wait()).await.is_err() {
            warn!(
                "审计记录在 {:?} 内未能全部写入, 放弃 {} 条",
                grace,
                self.inserts.len()
            );
        }
        self.inserts.reopen();
    }
}
