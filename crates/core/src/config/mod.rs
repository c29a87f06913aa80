//! 配置管理
//!
//! 配置按以下顺序加载，后者覆盖前者：
//!
//! 1. 各配置段的默认值
//! 2. TOML 配置文件
//! 3. 环境变量（前缀 `MATCH_`，层级分隔符 `__`，如 `MATCH_DAEMON__POLL_INTERVAL_MS=500`）
//!
//! 配置对象在启动时构造一次，之后以只读方式在各组件之间共享。

pub mod models;

pub use models::*;
