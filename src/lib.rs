// Lumen 客户端遥测采集 SDK
// L1 入口层：负责模块声明与公共 API 再导出
//
// 初始化入口是 start / start_async：传入 API 密钥、会话策略、配置与
// 字段提供者之后，门面函数与 logger() 句柄即可使用。

pub mod atoms;
pub mod coordinator;
pub mod molecules;

pub use coordinator::capture::{
    DEFAULT_API_URL, LoggerHandle, StartArguments, add_field, device_id, flush, log,
    log_app_launch_tti, log_debug, log_error, log_info, log_screen_view, log_trace, log_warning,
    logger, remove_field, session_id, session_url, set_sleep_mode, start, start_async,
    start_from_settings, start_new_session,
};
pub use coordinator::cleanup;
pub use molecules::bridge::{LogLevel, LogType};
pub use molecules::config::{Configuration, SleepMode};
pub use molecules::fields::{Field, FieldValue, Fields, fields_of, fields_of_optional};
pub use molecules::providers::{DateProvider, FieldProvider, SystemDateProvider};
pub use molecules::reporting::ErrorListener;
pub use molecules::session::SessionStrategy;
pub use molecules::settings::{SdkInitSettings, SettingsResult, StrategyKind};
pub use molecules::span::{Span, SpanResult};
