// 启动设置分子模块
// 从宿主持久化的设置文件读出启动参数；示例应用的各种初始化变体统一走这条路

use crate::molecules::config::Configuration;
use crate::molecules::session::SessionStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 设置文件中的会话策略选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StrategyKind {
    #[default]
    Fixed,
    ActivityBased,
}

/// 持久化的 SDK 启动设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkInitSettings {
    pub api_key: String,
    pub api_url: String,

    #[serde(default)]
    pub strategy: StrategyKind,

    // 活跃度策略的静默阈值（分钟）
    #[serde(default = "default_inactivity_threshold")]
    pub inactivity_threshold_mins: i64,

    #[serde(default)]
    pub configuration: Configuration,
}

fn default_inactivity_threshold() -> i64 {
    30
}

impl SdkInitSettings {
    /// 按设置构造会话策略
    pub fn session_strategy(&self) -> SessionStrategy {
        match self.strategy {
            StrategyKind::Fixed => SessionStrategy::fixed(),
            StrategyKind::ActivityBased => {
                SessionStrategy::activity_based_with(self.inactivity_threshold_mins, None)
            }
        }
    }
}

/// 设置读取结果
#[derive(Debug)]
pub enum SettingsResult {
    Success(SdkInitSettings),
    Failed(String),
}

/// 读取并校验设置文件
//
// API 密钥或 API 地址缺失、留空时返回 Failed——未配置是正常状态，
// 调用方应跳过初始化而不是报错退出。
pub fn load_settings(path: &Path) -> SettingsResult {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            return SettingsResult::Failed(format!("无法读取设置文件：{}", e));
        }
    };

    let settings: SdkInitSettings = match serde_json::from_str(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            return SettingsResult::Failed(format!("设置文件解析失败：{}", e));
        }
    };

    if settings.api_key.trim().is_empty() || settings.api_url.trim().is_empty() {
        return SettingsResult::Failed(format!(
            "设置不完整。api_url: {} . api_key 长度: {}",
            settings.api_url,
            settings.api_key.len()
        ));
    }

    SettingsResult::Success(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn valid_settings_load_successfully() {
        let file = write_settings(
            r#"{
                "api_key": "key-123",
                "api_url": "https://api.lumenlabs.io",
                "strategy": "ActivityBased",
                "inactivity_threshold_mins": 5
            }"#,
        );

        let SettingsResult::Success(settings) = load_settings(file.path()) else {
            panic!("应当读取成功");
        };

        assert_eq!(settings.api_key, "key-123");
        assert_eq!(settings.strategy, StrategyKind::ActivityBased);
        assert_eq!(settings.inactivity_threshold_mins, 5);
        assert!(matches!(
            settings.session_strategy(),
            SessionStrategy::ActivityBased {
                inactivity_threshold_mins: 5,
                ..
            }
        ));
    }

    #[test]
    fn blank_api_key_is_a_skip_not_a_crash() {
        let file = write_settings(
            r#"{ "api_key": "  ", "api_url": "https://api.lumenlabs.io" }"#,
        );

        assert!(matches!(
            load_settings(file.path()),
            SettingsResult::Failed(_)
        ));
    }

    #[test]
    fn missing_file_reports_failure() {
        let result = load_settings(Path::new("/nonexistent/lumen-settings.json"));

        assert!(matches!(result, SettingsResult::Failed(_)));
    }

    #[test]
    fn malformed_json_reports_failure() {
        let file = write_settings("{ not json");

        assert!(matches!(
            load_settings(file.path()),
            SettingsResult::Failed(_)
        ));
    }

    #[test]
    fn defaults_fill_missing_optional_fields() {
        let file = write_settings(
            r#"{ "api_key": "key", "api_url": "https://api.lumenlabs.io" }"#,
        );

        let SettingsResult::Success(settings) = load_settings(file.path()) else {
            panic!("应当读取成功");
        };

        assert_eq!(settings.strategy, StrategyKind::Fixed);
        assert_eq!(settings.inactivity_threshold_mins, 30);
        assert_eq!(settings.configuration.max_buffered_logs, 1024);
    }
}
