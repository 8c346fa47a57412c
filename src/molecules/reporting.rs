// 内部错误上报分子模块
// SDK 内部故障统一经此上报：写诊断日志，并转发给宿主注册的错误监听器

use tokio::sync::mpsc::UnboundedSender;

/// 错误监听器：依次收到错误上下文与详情，在监听运行时线程上被调用
pub type ErrorListener = std::sync::Arc<dyn Fn(&str, &str) + Send + Sync>;

/// 一次内部错误上报
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub context: String,
    pub detail: String,
}

/// 错误处理器：可克隆的轻量句柄
//
// 上报永不失败：通道缺失或已关闭时仅保留诊断日志输出。
#[derive(Clone)]
pub struct ErrorHandler {
    tx: Option<UnboundedSender<ErrorReport>>,
}

impl ErrorHandler {
    pub fn new(tx: UnboundedSender<ErrorReport>) -> Self {
        Self { tx: Some(tx) }
    }

    /// 无通道的处理器（启动早期或测试场景）
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// 上报一次内部错误
    pub fn handle_error(&self, context: &str, detail: &str) {
        log::warn!("内部错误：{}（{}）", context, detail);

        if let Some(ref tx) = self.tx {
            let _ = tx.send(ErrorReport {
                context: context.to_string(),
                detail: detail.to_string(),
            });
        }
    }
}
