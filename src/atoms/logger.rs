// SDK 诊断日志原子模块（SDK 自身的运行日志，区别于宿主应用通过门面写入的采集日志）
// 统一格式、双输出（控制台+文件）、自动轮转（10MB）、可在运行时整体关闭

use chrono::Local;
use log;
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

#[cfg(not(target_os = "android"))]
use env_logger;

#[cfg(target_os = "android")]
use android_logger::{Config, FilterBuilder};

const MAX_DIAGNOSTICS_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB 轮转阈值

// 诊断级别环境变量（宿主进程可覆写，取值同 RUST_LOG 语法）
const INTERNAL_LOG_ENV: &str = "LUMEN_INTERNAL_LOG";

static DIAGNOSTICS_FILE_PATH: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));
static DIAGNOSTICS_ENABLED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(true));

static LOGGER: Lazy<()> = Lazy::new(|| {
    // 级别解析：环境变量优先；Release 不能为 "off"（否则 format 回调不执行，文件无法写入）
    let default_level = if cfg!(debug_assertions) {
        "debug,tokio=warn,mio=warn"
    } else {
        "info,tokio=warn,mio=warn"
    };
    let level = std::env::var(INTERNAL_LOG_ENV).unwrap_or_else(|_| default_level.to_string());

    #[cfg(target_os = "android")]
    {
        // Android 平台：输出到 logcat，文件写入由 format 回调兜底
        android_logger::init_once(
            Config::default()
                .with_max_level(if cfg!(debug_assertions) {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                })
                .with_tag("lumen")
                .with_filter(FilterBuilder::new().parse(&level).build())
                .format(|f, record| {
                    let timestamp = Local::now().format("%Y/%m/%d %H:%M:%S");
                    let module = record.module_path().unwrap_or("unknown");
                    let path_with_dots = module.replace("::", ".");
                    let line = format!(
                        "[{}] {} {} >> {}",
                        level_tag(record.level()),
                        timestamp,
                        path_with_dots,
                        record.args()
                    );
                    let _ = write_to_file(&line);
                    write!(f, "{}", line)
                }),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // 桌面平台：env_logger 自定义格式
        let env = env_logger::Env::default().default_filter_or(level);

        env_logger::Builder::from_env(env)
            .format(|buf, record| {
                let timestamp = Local::now().format("%Y/%m/%d %H:%M:%S");
                let module = record.module_path().unwrap_or("unknown");
                let path_with_dots = module.replace("::", ".");

                const GREEN: &str = "\x1B[32m";
                const YELLOW: &str = "\x1B[33m";
                const RED: &str = "\x1B[31m";
                const CYAN: &str = "\x1B[36m";
                const RESET: &str = "\x1B[0m";

                let tag = level_tag(record.level());
                let color = match record.level() {
                    log::Level::Error => RED,
                    log::Level::Warn => YELLOW,
                    log::Level::Info => GREEN,
                    log::Level::Debug | log::Level::Trace => CYAN,
                };

                writeln!(
                    buf,
                    "{}[{}]{} {} {} >> {}",
                    color, tag, RESET, timestamp, path_with_dots, record.args()
                )?;

                // 文件输出：Debug 带模块路径便于定位，Release 精简
                let file_line = if cfg!(debug_assertions) {
                    format!(
                        "[{}] {} {} >> {}",
                        tag,
                        timestamp,
                        path_with_dots,
                        record.args()
                    )
                } else {
                    format!("[{}] {} >> {}", tag, timestamp, record.args())
                };
                let _ = write_to_file(&file_line);

                Ok(())
            })
            .init();
    }
});

fn level_tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "SdkError",
        log::Level::Warn => "SdkWarn",
        log::Level::Info => "SdkInfo",
        log::Level::Debug => "SdkDebug",
        log::Level::Trace => "SdkTrace",
    }
}

// 写入诊断日志文件（受开关控制，追加写入，失败静默）
fn write_to_file(line: &str) -> std::io::Result<()> {
    let enabled = DIAGNOSTICS_ENABLED.lock().map(|g| *g).unwrap_or(true);
    if !enabled {
        return Ok(());
    }

    let path_guard = match DIAGNOSTICS_FILE_PATH.lock() {
        Ok(guard) => guard,
        Err(_) => return Ok(()), // 锁失败，静默返回
    };

    if let Some(ref path) = *path_guard {
        check_and_rotate(path)?;

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
    }

    Ok(())
}

// 超过阈值时把当前文件挪到 .old 并重新开始
fn check_and_rotate(path: &PathBuf) -> std::io::Result<()> {
    if let Ok(metadata) = fs::metadata(path)
        && metadata.len() > MAX_DIAGNOSTICS_FILE_SIZE
    {
        let backup_path = path.with_extension("logs.old");
        let _ = fs::remove_file(&backup_path);
        let _ = fs::rename(path, &backup_path); // 失败时下次再试
    }

    Ok(())
}

/// 设置诊断日志开关（线程安全，实时生效）
pub fn set_diagnostics_enabled(enabled: bool) {
    if let Ok(mut guard) = DIAGNOSTICS_ENABLED.lock() {
        *guard = enabled;
    }
}

/// 设置诊断日志文件路径（应在 setup_logger 之前调用）
pub fn set_diagnostics_file(path: PathBuf) {
    if let Ok(mut guard) = DIAGNOSTICS_FILE_PATH.lock() {
        *guard = Some(path);
    }
}

/// 初始化诊断日志系统（幂等、懒加载、线程安全）
pub fn setup_logger() {
    Lazy::force(&LOGGER);
}

/// 统一初始化：注入文件路径并启动日志系统
pub fn init(diagnostics_file: Option<PathBuf>) {
    if let Some(path) = diagnostics_file {
        set_diagnostics_file(path);
    }
    setup_logger();
}
