// SDK 配置分子模块

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 休眠模式：Active 时 SDK 将自身活动压到最低
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SleepMode {
    Active,
    #[default]
    Inactive,
}

/// SDK 启动配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    // 应用标识
    pub app_id: String,
    pub app_version: String,

    // 休眠模式
    pub sleep_mode: SleepMode,

    // SDK 数据目录覆写（None 时按默认顺序解析）
    pub sdk_directory: Option<PathBuf>,

    // 启动完成前门面调用的缓存上限，超限丢弃最旧的调用
    pub max_buffered_logs: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            app_id: "unknown".to_string(),
            app_version: "unknown".to_string(),
            sleep_mode: SleepMode::default(),
            sdk_directory: None,
            max_buffered_logs: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = Configuration::default();

        assert_eq!(config.sleep_mode, SleepMode::Inactive);
        assert_eq!(config.max_buffered_logs, 1024);
        assert_eq!(config.sdk_directory, None);
    }

    #[test]
    fn configuration_round_trips_through_json() {
        let config = Configuration {
            app_id: "io.lumen.demo".to_string(),
            app_version: "2.0.0".to_string(),
            sleep_mode: SleepMode::Active,
            sdk_directory: Some(PathBuf::from("/tmp/lumen")),
            max_buffered_logs: 64,
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Configuration = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.app_id, config.app_id);
        assert_eq!(parsed.sleep_mode, SleepMode::Active);
        assert_eq!(parsed.max_buffered_logs, 64);
    }
}
