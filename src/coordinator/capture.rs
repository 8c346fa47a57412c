// 采集门面协调模块
// SDK 的顶层入口：全局启动状态机、预启动缓存、日志器句柄与各项门面操作

use crate::atoms::path_resolver;
use crate::atoms::storage::KeyValueStore;
use crate::atoms::{self, id_generator};
use crate::coordinator::runtime;
use crate::molecules::attributes::AppAttributes;
use crate::molecules::bridge::{Bridge, LocalBridge, LogLevel, LogRecord, LogType, StartContext};
use crate::molecules::config::{Configuration, SleepMode};
use crate::molecules::fields::{Fields, FieldsBuilder};
use crate::molecules::providers::{DateProvider, FieldProvider, MetadataProvider, SystemDateProvider};
use crate::molecules::reporting::{ErrorHandler, ErrorListener};
use crate::molecules::session::{SessionManager, SessionStrategy};
use crate::molecules::settings::{self, SettingsResult};
use crate::molecules::span::{self, Span, SpanSink};
use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Instant;

/// 默认 API 基础地址；除非与服务方另行约定，否则不要覆写
pub const DEFAULT_API_URL: &str = "https://api.lumenlabs.io";

const DEVICE_ID_KEY: &str = "device.id";

/// 启动参数
pub struct StartArguments {
    /// 服务方分配的 API 密钥，必填
    pub api_key: String,
    /// API 基础地址
    pub api_url: String,
    /// 会话 ID 管理策略
    pub session_strategy: SessionStrategy,
    /// SDK 功能配置
    pub configuration: Configuration,
    /// 附加到所有日志上的额外字段提供者
    pub field_providers: Vec<Arc<dyn FieldProvider>>,
    /// 覆写时间戳来源；None 时使用系统时钟
    pub date_provider: Option<Arc<dyn DateProvider>>,
    /// SDK 内部错误监听器
    pub error_listener: Option<ErrorListener>,
}

impl StartArguments {
    pub fn new(api_key: &str, session_strategy: SessionStrategy) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            session_strategy,
            configuration: Configuration::default(),
            field_providers: Vec::new(),
            date_provider: None,
            error_listener: None,
        }
    }
}

// 全局启动状态机；启动中与启动后的访问都经过它
enum LoggerState {
    NotStarted,
    Starting,
    Started(Arc<LoggerCore>),
    StartFailure,
}

static LOGGER_STATE: Lazy<Mutex<LoggerState>> = Lazy::new(|| Mutex::new(LoggerState::NotStarted));

// 预启动缓存：启动完成前的门面调用先排队，启动成功后按序回放
type BufferedCall = Box<dyn FnOnce(&LoggerCore) + Send>;
static PRE_INIT_BUFFER: Lazy<Mutex<VecDeque<BufferedCall>>> =
    Lazy::new(|| Mutex::new(VecDeque::new()));
static PRE_INIT_LIMIT: AtomicUsize = AtomicUsize::new(1024);

/// 启动采集日志器
//
// 幂等：重复调用（包括启动中与启动失败后）只产生告警并返回错误，
// 不影响已有状态。
pub fn start(arguments: StartArguments) -> Result<(), String> {
    start_with_bridge(arguments, Arc::new(LocalBridge::new()))
}

/// 在后台线程上启动；完成回调收到会话地址或错误消息
pub fn start_async(
    arguments: StartArguments,
    completion: impl FnOnce(Result<String, String>) + Send + 'static,
) {
    start_async_with_bridge(arguments, Arc::new(LocalBridge::new()), completion);
}

/// 从持久化设置文件启动；设置不完整时跳过启动
pub fn start_from_settings(path: &Path) -> Result<(), String> {
    match settings::load_settings(path) {
        SettingsResult::Success(loaded) => {
            let strategy = loaded.session_strategy();
            let mut arguments = StartArguments::new(&loaded.api_key, strategy);
            arguments.api_url = loaded.api_url;
            arguments.configuration = loaded.configuration;
            start(arguments)
        }
        SettingsResult::Failed(message) => {
            log::warn!("跳过 SDK 初始化：{}", message);
            Err(message)
        }
    }
}

pub(crate) fn start_with_bridge(
    arguments: StartArguments,
    bridge: Arc<dyn Bridge>,
) -> Result<(), String> {
    begin_start(arguments.configuration.max_buffered_logs)?;
    finish_start(arguments, bridge)
}

pub(crate) fn start_async_with_bridge(
    arguments: StartArguments,
    bridge: Arc<dyn Bridge>,
    completion: impl FnOnce(Result<String, String>) + Send + 'static,
) {
    if let Err(message) = begin_start(arguments.configuration.max_buffered_logs) {
        completion(Err(message));
        return;
    }

    // 启动工作放到独立线程，调用方线程立即返回
    let spawned = std::thread::Builder::new()
        .name("lumen-start".to_string())
        .spawn(move || {
            let result =
                finish_start(arguments, bridge).map(|_| session_url().unwrap_or_default());
            completion(result);
        });

    if let Err(e) = spawned {
        log::error!("启动线程创建失败：{}", e);
        if let Ok(mut state) = LOGGER_STATE.lock() {
            *state = LoggerState::StartFailure;
        }
    }
}

// 状态机推进：NotStarted → Starting；其余状态一律拒绝
fn begin_start(buffer_limit: usize) -> Result<(), String> {
    let mut state = LOGGER_STATE
        .lock()
        .map_err(|_| "启动状态锁已中毒".to_string())?;

    match *state {
        LoggerState::NotStarted => {
            PRE_INIT_LIMIT.store(buffer_limit, Ordering::Relaxed);
            *state = LoggerState::Starting;
            Ok(())
        }
        LoggerState::Starting => {
            log::warn!("采集日志器正在启动，重复调用已忽略");
            Err("采集日志器正在启动".to_string())
        }
        LoggerState::Started(_) => {
            log::warn!("采集日志器已启动，重复调用已忽略");
            Err("采集日志器已启动".to_string())
        }
        LoggerState::StartFailure => {
            log::warn!("采集日志器此前启动失败，重复调用已忽略");
            Err("采集日志器此前启动失败".to_string())
        }
    }
}

// 实际启动流程：构建日志器核心、推进状态、回放预启动缓存
fn finish_start(arguments: StartArguments, bridge: Arc<dyn Bridge>) -> Result<(), String> {
    let started_at = Instant::now();

    runtime::init();
    runtime::set_session_listener(arguments.session_strategy.session_id_changed_listener());
    runtime::set_error_listener(arguments.error_listener.clone());

    match LoggerCore::new(arguments, bridge) {
        Ok(core) => {
            let core = Arc::new(core);
            if let Ok(mut state) = LOGGER_STATE.lock() {
                *state = LoggerState::Started(core.clone());
            }

            core.log_sdk_start(started_at.elapsed().as_millis() as i64);
            flush_pre_init(&core);
            log::info!("采集日志器启动完成，会话地址：{}", core.session_url());
            Ok(())
        }
        Err(message) => {
            if let Ok(mut state) = LOGGER_STATE.lock() {
                *state = LoggerState::StartFailure;
            }
            // 启动失败后监听器不应继续挂着
            runtime::set_session_listener(None);
            runtime::set_error_listener(None);
            log::warn!("采集日志器启动失败：{}", message);
            Err(message)
        }
    }
}

// 回放预启动缓存（按入队顺序）
fn flush_pre_init(core: &LoggerCore) {
    let buffered = match PRE_INIT_BUFFER.lock() {
        Ok(mut buffer) => std::mem::take(&mut *buffer),
        Err(_) => return,
    };

    if !buffered.is_empty() {
        log::debug!("回放预启动缓存：{} 条", buffered.len());
    }
    for call in buffered {
        call(core);
    }
}

// 启动中的门面调用入队；超限时丢弃最旧的调用，上限为 0 表示不缓存
fn buffer_call(call: BufferedCall) {
    let limit = PRE_INIT_LIMIT.load(Ordering::Relaxed);
    if limit == 0 {
        return;
    }

    let Ok(mut buffer) = PRE_INIT_BUFFER.lock() else {
        return;
    };
    while buffer.len() >= limit {
        buffer.pop_front();
    }
    buffer.push_back(call);
}

// 门面调用的统一分发：已启动直达核心，启动中入队，其余丢弃
fn dispatch(call: impl FnOnce(&LoggerCore) + Send + 'static) {
    let state = LOGGER_STATE.lock();
    match state {
        Ok(guard) => match &*guard {
            LoggerState::Started(core) => {
                let core = core.clone();
                drop(guard);
                call(&core);
            }
            LoggerState::Starting => {
                drop(guard);
                buffer_call(Box::new(call));
            }
            LoggerState::NotStarted | LoggerState::StartFailure => {}
        },
        Err(_) => {}
    }
}

/// 日志器句柄；仅在采集日志器启动后可取得
pub fn logger() -> Option<LoggerHandle> {
    let state = LOGGER_STATE.lock().ok()?;
    match &*state {
        LoggerState::Started(core) => Some(LoggerHandle {
            core: core.clone(),
        }),
        _ => None,
    }
}

/// 当前会话 ID；启动前为 None
pub fn session_id() -> Option<String> {
    logger().map(|l| l.session_id())
}

/// 当前会话地址；启动前为 None
pub fn session_url() -> Option<String> {
    logger().map(|l| l.session_url())
}

/// 设备标识；应用不重装则保持稳定，启动前为 None
pub fn device_id() -> Option<String> {
    logger().map(|l| l.device_id())
}

/// 手动开启新会话；未启动时为空操作
pub fn start_new_session() {
    dispatch(|core| core.start_new_session());
}

/// 注册随后续所有日志附带的全局字段；同键覆盖旧值
pub fn add_field(key: &str, value: &str) {
    let key = key.to_string();
    let value = value.to_string();
    dispatch(move |core| core.add_field(&key, &value));
}

/// 移除全局字段；键不存在时为空操作
pub fn remove_field(key: &str) {
    let key = key.to_string();
    dispatch(move |core| core.remove_field(&key));
}

/// 写一条指定级别的日志
//
// message 闭包仅在日志真正被写出时求值。附带的错误会展开为
// `_error` / `_error_details` 字段。
pub fn log(
    level: LogLevel,
    fields: Option<HashMap<String, String>>,
    error: Option<&dyn Error>,
    message: impl FnOnce() -> String + Send + 'static,
) {
    let error_fields = error.map(extract_error_fields);
    dispatch(move |core| {
        core.log_prepared(LogType::Normal, level, fields.as_ref(), error_fields, message);
    });
}

/// trace 级日志
pub fn log_trace(
    fields: Option<HashMap<String, String>>,
    message: impl FnOnce() -> String + Send + 'static,
) {
    log(LogLevel::Trace, fields, None, message);
}

/// debug 级日志
pub fn log_debug(
    fields: Option<HashMap<String, String>>,
    message: impl FnOnce() -> String + Send + 'static,
) {
    log(LogLevel::Debug, fields, None, message);
}

/// info 级日志
pub fn log_info(
    fields: Option<HashMap<String, String>>,
    message: impl FnOnce() -> String + Send + 'static,
) {
    log(LogLevel::Info, fields, None, message);
}

/// warning 级日志
pub fn log_warning(
    fields: Option<HashMap<String, String>>,
    message: impl FnOnce() -> String + Send + 'static,
) {
    log(LogLevel::Warning, fields, None, message);
}

/// error 级日志
pub fn log_error(
    fields: Option<HashMap<String, String>>,
    message: impl FnOnce() -> String + Send + 'static,
) {
    log(LogLevel::Error, fields, None, message);
}

/// 记录一次页面浏览事件
pub fn log_screen_view(screen_name: &str) {
    let screen_name = screen_name.to_string();
    dispatch(move |core| core.log_screen_view(&screen_name));
}

/// 记录应用启动 TTI；每次启动只记录一次，负时长被丢弃
pub fn log_app_launch_tti(duration: chrono::Duration) {
    dispatch(move |core| core.log_app_launch_tti(duration));
}

/// 切换休眠模式
pub fn set_sleep_mode(mode: SleepMode) {
    dispatch(move |core| core.set_sleep_mode(mode));
}

/// 冲刷核心缓冲
pub fn flush(blocking: bool) {
    dispatch(move |core| core.flush(blocking));
}

// 错误字段展开：顶层 Display 进 _error，来源链进 _error_details
fn extract_error_fields(error: &dyn Error) -> (String, String) {
    let mut details = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        details.push(cause.to_string());
        source = cause.source();
    }
    (error.to_string(), details.join(": "))
}

// 会话地址推导：协议保留，主机名中第一个 "api." 替换为 "timeline."，
// 原地址的路径与查询参数丢弃
fn derive_session_url_base(api_url: &str) -> Result<String, String> {
    let (scheme, rest) = api_url
        .split_once("://")
        .ok_or_else(|| format!("API 地址缺少协议：{}", api_url))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    if host.is_empty() {
        return Err(format!("API 地址缺少主机名：{}", api_url));
    }

    let timeline_host = host.replacen("api.", "timeline.", 1);
    Ok(format!("{}://{}", scheme, timeline_host))
}

/// 已启动日志器的操作句柄
#[derive(Clone)]
pub struct LoggerHandle {
    core: Arc<LoggerCore>,
}

impl LoggerHandle {
    pub fn session_id(&self) -> String {
        self.core.session_id()
    }

    pub fn session_url(&self) -> String {
        self.core.session_url()
    }

    pub fn device_id(&self) -> String {
        self.core.device_id()
    }

    pub fn start_new_session(&self) {
        self.core.start_new_session();
    }

    pub fn add_field(&self, key: &str, value: &str) {
        self.core.add_field(key, value);
    }

    pub fn remove_field(&self, key: &str) {
        self.core.remove_field(key);
    }

    pub fn log(
        &self,
        level: LogLevel,
        fields: Option<&HashMap<String, String>>,
        error: Option<&dyn Error>,
        message: impl FnOnce() -> String,
    ) {
        let error_fields = error.map(extract_error_fields);
        self.core
            .log_prepared(LogType::Normal, level, fields, error_fields, message);
    }

    pub fn log_screen_view(&self, screen_name: &str) {
        self.core.log_screen_view(screen_name);
    }

    pub fn log_app_launch_tti(&self, duration: chrono::Duration) {
        self.core.log_app_launch_tti(duration);
    }

    /// 开启一个操作跨度
    pub fn start_span(
        &self,
        name: &str,
        level: LogLevel,
        fields: Option<&HashMap<String, String>>,
        parent_id: Option<&str>,
    ) -> Span {
        Span::start(
            self.core.clone(),
            self.core.date_provider.clone(),
            name,
            level,
            fields,
            parent_id,
        )
    }

    /// 包裹一段代码并按结果自动结束跨度
    pub fn track_span<T, E>(
        &self,
        name: &str,
        level: LogLevel,
        fields: Option<&HashMap<String, String>>,
        block: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        span::track_span(
            self.core.clone(),
            self.core.date_provider.clone(),
            name,
            level,
            fields,
            block,
        )
    }

    pub fn set_sleep_mode(&self, mode: SleepMode) {
        self.core.set_sleep_mode(mode);
    }

    pub fn flush(&self, blocking: bool) {
        self.core.flush(blocking);
    }
}

// 日志器核心：持有桥接、会话、元数据与全局字段，负责组装每条记录
pub(crate) struct LoggerCore {
    bridge: Arc<dyn Bridge>,
    metadata: MetadataProvider,
    session: SessionManager,
    date_provider: Arc<dyn DateProvider>,
    error_handler: ErrorHandler,
    global_fields: Mutex<HashMap<String, String>>,
    session_url_base: String,
    device_id: String,
    tti_once: Once,
}

impl LoggerCore {
    fn new(arguments: StartArguments, bridge: Arc<dyn Bridge>) -> Result<Self, String> {
        let configuration = arguments.configuration.clone();
        let sdk_dir = path_resolver::sdk_directory(configuration.sdk_directory.as_ref())?;
        std::fs::create_dir_all(&sdk_dir).map_err(|e| format!("无法创建 SDK 数据目录：{}", e))?;

        // 诊断日志尽早就位，启动失败也有迹可查
        atoms::logger::init(Some(path_resolver::diagnostics_file(&sdk_dir)));

        let session_url_base = derive_session_url_base(&arguments.api_url)?;

        let store = Arc::new(KeyValueStore::new(path_resolver::storage_dir(&sdk_dir))?);
        let device_id = match store.get_string(DEVICE_ID_KEY) {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = id_generator::new_id();
                store.set_string(DEVICE_ID_KEY, &id)?;
                id
            }
        };

        let date_provider = arguments
            .date_provider
            .unwrap_or_else(|| Arc::new(SystemDateProvider));

        let error_handler = match runtime::error_sender() {
            Some(tx) => ErrorHandler::new(tx),
            None => ErrorHandler::disconnected(),
        };

        let ootb_providers: Vec<Arc<dyn FieldProvider>> = vec![Arc::new(AppAttributes::new(
            configuration.app_id.clone(),
            configuration.app_version.clone(),
        ))];
        let metadata = MetadataProvider::new(
            date_provider.clone(),
            ootb_providers,
            arguments.field_providers,
            error_handler.clone(),
        );

        let now_ms = date_provider.now().timestamp_millis();
        let session = SessionManager::new(
            &arguments.session_strategy,
            store,
            runtime::session_sender(),
            now_ms,
        );

        let sleep_mode_active = configuration.sleep_mode == SleepMode::Active;
        let context = StartContext {
            api_key: arguments.api_key,
            api_url: arguments.api_url,
            configuration,
            sdk_directory: sdk_dir,
            sleep_mode_active,
        };
        bridge
            .create_logger(&context)
            .map_err(|e| format!("核心初始化失败：{}", e))?;
        bridge.start_logger();
        bridge.set_sleep_mode(sleep_mode_active);

        Ok(Self {
            bridge,
            metadata,
            session,
            date_provider,
            error_handler,
            global_fields: Mutex::new(HashMap::new()),
            session_url_base,
            device_id,
            tti_once: Once::new(),
        })
    }

    fn now_ms(&self) -> i64 {
        self.date_provider.now().timestamp_millis()
    }

    fn session_id(&self) -> String {
        self.session.session_id()
    }

    fn session_url(&self) -> String {
        format!(
            "{}/s/{}?utm_source=sdk",
            self.session_url_base,
            self.session_id()
        )
    }

    fn device_id(&self) -> String {
        self.device_id.clone()
    }

    fn start_new_session(&self) {
        self.session.start_new_session(self.now_ms());
    }

    fn add_field(&self, key: &str, value: &str) {
        if let Ok(mut fields) = self.global_fields.lock() {
            fields.insert(key.to_string(), value.to_string());
        }
    }

    fn remove_field(&self, key: &str) {
        if let Ok(mut fields) = self.global_fields.lock() {
            fields.remove(key);
        }
    }

    fn log_prepared(
        &self,
        log_type: LogType,
        level: LogLevel,
        fields: Option<&HashMap<String, String>>,
        error_fields: Option<(String, String)>,
        message: impl FnOnce() -> String,
    ) {
        let mut extra = match fields {
            Some(fields) => fields.clone(),
            None => HashMap::new(),
        };
        if let Some((error, details)) = error_fields {
            extra.insert("_error".to_string(), error);
            extra.insert("_error_details".to_string(), details);
        }

        self.write(log_type, level, extra, message());
    }

    // 记录组装与移交：字段优先级为 单条日志 > 全局字段 > 提供者字段，
    // 提供者内部则内置属性覆盖自定义提供者
    fn write(&self, log_type: LogType, level: LogLevel, extra: HashMap<String, String>, message: String) {
        let timestamp = self.metadata.timestamp();
        self.session.touch(timestamp.timestamp_millis());

        let mut merged: HashMap<String, String> = HashMap::new();
        for (key, value) in self.metadata.custom_fields().iter() {
            merged.insert(key.to_string(), value.to_string());
        }
        for (key, value) in self.metadata.ootb_fields().iter() {
            merged.insert(key.to_string(), value.to_string());
        }
        if let Ok(global) = self.global_fields.lock() {
            for (key, value) in global.iter() {
                merged.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in extra {
            merged.insert(key, value);
        }

        let mut builder = FieldsBuilder::with_capacity(merged.len());
        for (key, value) in &merged {
            builder.add(key, value);
        }

        let record = LogRecord {
            log_type,
            level,
            timestamp,
            message,
            fields: builder.build(),
            session_id: self.session_id(),
        };

        if let Err(e) = self.bridge.write_log(&record) {
            self.error_handler.handle_error("写入日志失败", &e);
        }
    }

    fn log_screen_view(&self, screen_name: &str) {
        let mut extra = HashMap::with_capacity(1);
        extra.insert("_screen_name".to_string(), screen_name.to_string());
        self.write(LogType::Ux, LogLevel::Info, extra, "ScreenView".to_string());
    }

    // TTI 只记录一次；负时长同样消耗掉这次机会（与核心侧约定一致）
    fn log_app_launch_tti(&self, duration: chrono::Duration) {
        self.tti_once.call_once(|| {
            let duration_ms = duration.num_milliseconds();
            if duration_ms < 0 {
                log::warn!("丢弃应用启动 TTI：时长为负（{} 毫秒）", duration_ms);
                return;
            }

            let mut extra = HashMap::with_capacity(1);
            extra.insert("_duration_ms".to_string(), duration_ms.to_string());
            self.write(
                LogType::Lifecycle,
                LogLevel::Info,
                extra,
                "AppLaunchTTI".to_string(),
            );
        });
    }

    fn log_sdk_start(&self, duration_ms: i64) {
        let mut extra = HashMap::with_capacity(2);
        extra.insert("_duration_ms".to_string(), duration_ms.to_string());
        if let Some(thread_name) = std::thread::current().name() {
            extra.insert("_start_thread".to_string(), thread_name.to_string());
        }
        self.write(
            LogType::Lifecycle,
            LogLevel::Info,
            extra,
            "SDKStarted".to_string(),
        );
    }

    fn set_sleep_mode(&self, mode: SleepMode) {
        self.bridge.set_sleep_mode(mode == SleepMode::Active);
    }

    fn flush(&self, blocking: bool) {
        self.bridge.flush(blocking);
    }
}

impl SpanSink for LoggerCore {
    fn write_span_log(&self, level: LogLevel, fields: Fields, message: &str) {
        let mut extra = HashMap::with_capacity(fields.len());
        for (key, value) in fields.iter() {
            extra.insert(key.to_string(), value.to_string());
        }
        self.write(LogType::Span, level, extra, message.to_string());
    }
}

// 测试辅助：重置全局状态机
#[cfg(test)]
pub(crate) fn reset_shared() {
    if let Ok(mut state) = LOGGER_STATE.lock() {
        *state = LoggerState::NotStarted;
    }
    if let Ok(mut buffer) = PRE_INIT_BUFFER.lock() {
        buffer.clear();
    }
    runtime::set_session_listener(None);
    runtime::set_error_listener(None);
}
