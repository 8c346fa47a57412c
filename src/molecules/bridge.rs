// 核心桥接分子模块
// 采集核心（批处理、传输、持久化）对本 crate 是不透明的外部依赖，
// 这里只定义调用它的接缝；内置实现是一个刻意保持单薄的终端落点

use crate::molecules::config::Configuration;
use crate::molecules::fields::Fields;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// 日志级别（编号与核心侧约定一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
}

impl LogLevel {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// 日志类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    Normal,
    Lifecycle,
    Ux,
    Span,
    InternalSdk,
}

impl LogType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Normal => "normal",
            LogType::Lifecycle => "lifecycle",
            LogType::Ux => "ux",
            LogType::Span => "span",
            LogType::InternalSdk => "internal_sdk",
        }
    }
}

/// 移交给核心的单条日志记录
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub log_type: LogType,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub fields: Fields,
    pub session_id: String,
}

/// 核心启动上下文
pub struct StartContext {
    pub api_key: String,
    pub api_url: String,
    pub configuration: Configuration,
    pub sdk_directory: std::path::PathBuf,
    pub sleep_mode_active: bool,
}

/// 采集核心的调用接缝
//
// create_logger 失败意味着启动整体失败；其余调用失败由错误处理器兜底。
pub trait Bridge: Send + Sync {
    fn create_logger(&self, context: &StartContext) -> Result<(), String>;
    fn start_logger(&self);
    fn write_log(&self, record: &LogRecord) -> Result<(), String>;
    fn set_sleep_mode(&self, active: bool);
    fn flush(&self, blocking: bool);
    fn shutdown(&self);
}

/// 内置终端落点：把记录转发到诊断日志门面并计数
//
// 不做批处理、传输与持久化——那些属于核心内部，不在本 crate 范围内。
#[derive(Default)]
pub struct LocalBridge {
    written: AtomicU64,
}

impl LocalBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写入的记录总数
    pub fn written_count(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    fn facade_level(level: LogLevel) -> log::Level {
        match level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

impl Bridge for LocalBridge {
    fn create_logger(&self, context: &StartContext) -> Result<(), String> {
        if context.api_key.trim().is_empty() {
            return Err("API 密钥为空".to_string());
        }
        Ok(())
    }

    fn start_logger(&self) {
        log::debug!("内置核心已就绪");
    }

    fn write_log(&self, record: &LogRecord) -> Result<(), String> {
        self.written.fetch_add(1, Ordering::Relaxed);

        let fields: Vec<String> = record
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        log::log!(
            target: "lumen::core",
            Self::facade_level(record.level),
            "[{}] session={} {} {{{}}}",
            record.log_type.as_str(),
            record.session_id,
            record.message,
            fields.join(", ")
        );

        Ok(())
    }

    fn set_sleep_mode(&self, active: bool) {
        log::debug!("休眠模式切换：active={}", active);
    }

    fn flush(&self, _blocking: bool) {}

    fn shutdown(&self) {
        log::debug!("内置核心已关闭");
    }
}

#[cfg(test)]
pub mod testing {
    // 测试用桥接实现

    use super::*;
    use std::sync::Mutex;

    /// 录制桥：捕获全部写入的记录
    #[derive(Default)]
    pub struct RecordingBridge {
        pub records: Mutex<Vec<LogRecord>>,
        pub started: AtomicU64,
        pub sleep_changes: Mutex<Vec<bool>>,
    }

    impl RecordingBridge {
        pub fn records(&self) -> Vec<LogRecord> {
            self.records.lock().unwrap().clone()
        }

        pub fn messages(&self) -> Vec<String> {
            self.records().iter().map(|r| r.message.clone()).collect()
        }
    }

    impl Bridge for RecordingBridge {
        fn create_logger(&self, _context: &StartContext) -> Result<(), String> {
            Ok(())
        }

        fn start_logger(&self) {
            self.started.fetch_add(1, Ordering::Relaxed);
        }

        fn write_log(&self, record: &LogRecord) -> Result<(), String> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn set_sleep_mode(&self, active: bool) {
            self.sleep_changes.lock().unwrap().push(active);
        }

        fn flush(&self, _blocking: bool) {}

        fn shutdown(&self) {}
    }

    /// 启动即失败的桥：驱动 StartFailure 路径
    pub struct FailingBridge;

    impl Bridge for FailingBridge {
        fn create_logger(&self, _context: &StartContext) -> Result<(), String> {
            Err("核心初始化失败".to_string())
        }

        fn start_logger(&self) {}

        fn write_log(&self, _record: &LogRecord) -> Result<(), String> {
            Err("核心不可用".to_string())
        }

        fn set_sleep_mode(&self, _active: bool) {}

        fn flush(&self, _blocking: bool) {}

        fn shutdown(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecules::fields::fields_of;

    fn record() -> LogRecord {
        LogRecord {
            log_type: LogType::Normal,
            level: LogLevel::Info,
            timestamp: Utc::now(),
            message: "hello".to_string(),
            fields: fields_of(&[("user_id", "u-1")]),
            session_id: "s-1".to_string(),
        }
    }

    #[test]
    fn local_bridge_counts_written_records() {
        let bridge = LocalBridge::new();

        bridge.write_log(&record()).unwrap();
        bridge.write_log(&record()).unwrap();

        assert_eq!(bridge.written_count(), 2);
    }

    #[test]
    fn local_bridge_rejects_blank_api_key() {
        let bridge = LocalBridge::new();
        let context = StartContext {
            api_key: "   ".to_string(),
            api_url: "https://api.lumenlabs.io".to_string(),
            configuration: Configuration::default(),
            sdk_directory: std::path::PathBuf::from("/tmp"),
            sleep_mode_active: false,
        };

        assert!(bridge.create_logger(&context).is_err());
    }

    #[test]
    fn level_values_match_core_contract() {
        assert_eq!(LogLevel::Trace.value(), 0);
        assert_eq!(LogLevel::Debug.value(), 1);
        assert_eq!(LogLevel::Info.value(), 2);
        assert_eq!(LogLevel::Warning.value(), 3);
        assert_eq!(LogLevel::Error.value(), 4);
    }
}
