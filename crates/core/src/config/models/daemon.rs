use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 守护进程（Supervisor + PollWorker）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// 两次拉取之间的间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 首次尝试前的退避时间（毫秒）
    pub initial_backoff_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: u32,
    /// 退避上限（毫秒）
    pub backoff_max_ms: u64,
    /// 最大尝试次数，None 表示无限重试
    pub max_attempts: Option<u64>,
    /// 单个匹配任务的等待时间（秒）
    pub dispatch_timeout_seconds: u64,
    /// 工作池关闭时等待在途任务的宽限期（秒）
    pub pool_shutdown_grace_seconds: u64,
    /// 关闭消息队列连接的宽限期（毫秒）
    pub connection_close_grace_ms: u64,
    /// 守护进程永久退出时是否告警
    pub alert_on_exit: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            initial_backoff_ms: 500,
            backoff_multiplier: 2,
            backoff_max_ms: 20_000,
            max_attempts: None,
            dispatch_timeout_seconds: 20,
            pool_shutdown_grace_seconds: 5,
            connection_close_grace_ms: 500,
            alert_on_exit: true,
        }
    }
}

impl DaemonConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        if self.initial_backoff_ms == 0 {
            return Err(anyhow::anyhow!("初始退避时间必须大于0"));
        }

        if self.backoff_multiplier < 1 {
            return Err(anyhow::anyhow!("退避倍数不能小于1"));
        }

        if self.backoff_max_ms < self.initial_backoff_ms {
            return Err(anyhow::anyhow!(
                "退避上限 {}ms 不能小于初始退避 {}ms",
                self.backoff_max_ms,
                self.initial_backoff_ms
            ));
        }

        if self.max_attempts == Some(0) {
            return Err(anyhow::anyhow!("最大尝试次数必须大于0"));
        }

        if self.dispatch_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("任务等待时间必须大于0"));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }

    pub fn pool_shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.pool_shutdown_grace_seconds)
    }

    pub fn connection_close_grace(&self) -> Duration {
        Duration::from_millis(self.connection_close_grace_ms)
    }
}

/// 工作池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { size: 10 }
    }
}

impl WorkerPoolConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.size == 0 {
            return Err(anyhow::anyhow!("工作池大小必须大于0"));
        }
        Ok(())
    }
}

/// 业务匹配处理器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// 匹配服务地址，未配置时只记录日志
    pub endpoint: Option<String>,
    pub request_timeout_seconds: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_seconds: 15,
        }
    }
}

impl HandlerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(anyhow::anyhow!("匹配服务地址必须是HTTP格式: {}", endpoint));
            }
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("匹配服务请求超时必须大于0"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
