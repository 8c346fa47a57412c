// L2 协调层模块入口

pub mod capture;
pub mod runtime;

pub use capture::{LoggerHandle, StartArguments};

/// 关闭 SDK 的后台资源（监听运行时与回调通道）
pub fn cleanup() {
    log::info!("清理协调层资源");
    runtime::cleanup();
}
