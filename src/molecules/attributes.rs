// 内置属性分子模块
// 随每条日志附带的应用与运行环境属性

use crate::molecules::providers::FieldProvider;
use std::collections::HashMap;
use std::env;

/// 应用与平台属性提供者
//
// app_id / app_version 由宿主在配置中给出；操作系统、架构与区域
// 在构造时采集一次，之后不再变化。
pub struct AppAttributes {
    app_id: String,
    app_version: String,
    locale: Option<String>,
}

impl AppAttributes {
    pub fn new(app_id: String, app_version: String) -> Self {
        Self {
            app_id,
            app_version,
            locale: detect_locale(),
        }
    }
}

impl FieldProvider for AppAttributes {
    fn fields(&self) -> HashMap<String, Option<String>> {
        let mut fields = HashMap::with_capacity(6);
        fields.insert("app_id".to_string(), Some(self.app_id.clone()));
        fields.insert("app_version".to_string(), Some(self.app_version.clone()));
        fields.insert("os".to_string(), Some(os_name().to_string()));
        fields.insert(
            "_architecture".to_string(),
            Some(env::consts::ARCH.to_string()),
        );
        // 区域探测可能失败，缺失条目由字段转换层丢弃
        fields.insert("_locale".to_string(), self.locale.clone());
        fields
    }
}

fn os_name() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "android") {
        "android"
    } else if cfg!(target_os = "ios") {
        "ios"
    } else {
        "unknown"
    }
}

// 从环境变量解析区域（"en_US.UTF-8" 取 "en_US"），探测不到返回 None
fn detect_locale() -> Option<String> {
    let raw = env::var("LC_ALL")
        .or_else(|_| env::var("LANG"))
        .ok()
        .filter(|value| !value.trim().is_empty())?;

    let locale = raw.split('.').next().unwrap_or(&raw);
    if locale == "C" || locale == "POSIX" {
        return None;
    }
    Some(locale.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecules::fields::Fields;

    #[test]
    fn provides_app_identity_and_platform() {
        let attributes = AppAttributes::new("io.lumen.demo".to_string(), "1.2.3".to_string());

        let fields = attributes.fields();

        assert_eq!(
            fields.get("app_id"),
            Some(&Some("io.lumen.demo".to_string()))
        );
        assert_eq!(fields.get("app_version"), Some(&Some("1.2.3".to_string())));
        assert!(fields.contains_key("os"));
        assert!(fields.contains_key("_architecture"));
    }

    #[test]
    fn absent_locale_is_dropped_by_conversion() {
        let attributes = AppAttributes {
            app_id: "io.lumen.demo".to_string(),
            app_version: "1.2.3".to_string(),
            locale: None,
        };

        let converted = Fields::from_optional_map(&attributes.fields());

        assert_eq!(converted.get("_locale"), None);
        assert_eq!(converted.get("app_id"), Some("io.lumen.demo"));
    }
}
