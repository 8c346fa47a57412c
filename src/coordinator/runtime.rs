// 监听运行时协调模块
// 独立线程上的 current_thread tokio 运行时；会话变化与内部错误
// 经通道投递到这里，再回调宿主注册的监听器

use crate::molecules::reporting::{ErrorListener, ErrorReport};
use crate::molecules::session::{SessionEvent, SessionIdChangedListener};
use once_cell::sync::Lazy;
use std::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;

struct RuntimeState {
    session_tx: UnboundedSender<SessionEvent>,
    error_tx: UnboundedSender<ErrorReport>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

static RUNTIME: Lazy<Mutex<Option<RuntimeState>>> = Lazy::new(|| Mutex::new(None));

static SESSION_LISTENER: Lazy<Mutex<Option<SessionIdChangedListener>>> =
    Lazy::new(|| Mutex::new(None));
static ERROR_LISTENER: Lazy<Mutex<Option<ErrorListener>>> = Lazy::new(|| Mutex::new(None));

// 测试串行锁：监听器注册是全局的，相关测试不能并行跑
#[cfg(test)]
pub(crate) static LISTENER_TEST_LOCK: Mutex<()> = Mutex::new(());

/// 初始化监听运行时（幂等）
pub fn init() {
    let Ok(mut guard) = RUNTIME.lock() else {
        return;
    };
    if guard.is_some() {
        return;
    }

    let (session_tx, session_rx) = unbounded_channel();
    let (error_tx, error_rx) = unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("监听运行时创建失败：{}", e);
            return;
        }
    };

    let thread = std::thread::Builder::new()
        .name("lumen-listener".to_string())
        .spawn(move || {
            runtime.block_on(run(session_rx, error_rx, shutdown_rx));
        });

    let thread = match thread {
        Ok(thread) => thread,
        Err(e) => {
            log::error!("监听线程创建失败：{}", e);
            return;
        }
    };

    log::info!("监听运行时已启动");
    *guard = Some(RuntimeState {
        session_tx,
        error_tx,
        shutdown_tx: Some(shutdown_tx),
        thread: Some(thread),
    });
}

async fn run(
    mut session_rx: UnboundedReceiver<SessionEvent>,
    mut error_rx: UnboundedReceiver<ErrorReport>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    // 会话变化监听器
    let session_loop = tokio::spawn(async move {
        while let Some(event) = session_rx.recv().await {
            let listener = SESSION_LISTENER.lock().ok().and_then(|g| g.clone());
            if let Some(listener) = listener {
                listener(event.session_id);
            }
        }
    });

    // 内部错误监听器
    let error_loop = tokio::spawn(async move {
        while let Some(report) = error_rx.recv().await {
            let listener = ERROR_LISTENER.lock().ok().and_then(|g| g.clone());
            if let Some(listener) = listener {
                listener(&report.context, &report.detail);
            }
        }
    });

    let _ = shutdown_rx.await;
    session_loop.abort();
    error_loop.abort();
}

/// 会话变化事件的发送端
pub fn session_sender() -> Option<UnboundedSender<SessionEvent>> {
    RUNTIME
        .lock()
        .ok()
        .and_then(|g| g.as_ref().map(|s| s.session_tx.clone()))
}

/// 内部错误上报的发送端
pub fn error_sender() -> Option<UnboundedSender<ErrorReport>> {
    RUNTIME
        .lock()
        .ok()
        .and_then(|g| g.as_ref().map(|s| s.error_tx.clone()))
}

/// 注册（或清除）会话变化监听器
pub fn set_session_listener(listener: Option<SessionIdChangedListener>) {
    if let Ok(mut guard) = SESSION_LISTENER.lock() {
        *guard = listener;
    }
}

/// 注册（或清除）内部错误监听器
pub fn set_error_listener(listener: Option<ErrorListener>) {
    if let Ok(mut guard) = ERROR_LISTENER.lock() {
        *guard = listener;
    }
}

/// 关闭监听运行时并等待线程退出
pub fn cleanup() {
    let state = match RUNTIME.lock() {
        Ok(mut guard) => guard.take(),
        Err(_) => return,
    };

    if let Some(mut state) = state {
        if let Some(shutdown_tx) = state.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(thread) = state.thread.take() {
            let _ = thread.join();
        }
        log::info!("监听运行时已退出");
    }

    set_session_listener(None);
    set_error_listener(None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    // 轮询等待断言成立（监听回调是异步投递的）
    fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn session_events_reach_registered_listener() {
        let _guard = LISTENER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        init();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let observed_clone = observed.clone();
        set_session_listener(Some(Arc::new(move |id: String| {
            observed_clone.lock().unwrap().push(id);
        })));

        let tx = session_sender().unwrap();
        tx.send(SessionEvent {
            session_id: "session-1".to_string(),
        })
        .unwrap();

        assert!(wait_until(|| {
            observed.lock().unwrap().contains(&"session-1".to_string())
        }));
        set_session_listener(None);
    }

    #[test]
    fn error_reports_reach_registered_listener() {
        let _guard = LISTENER_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        init();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let observed_clone = observed.clone();
        set_error_listener(Some(Arc::new(move |context: &str, detail: &str| {
            observed_clone
                .lock()
                .unwrap()
                .push(format!("{}:{}", context, detail));
        })));

        let tx = error_sender().unwrap();
        tx.send(ErrorReport {
            context: "写入失败".to_string(),
            detail: "磁盘已满".to_string(),
        })
        .unwrap();

        assert!(wait_until(|| {
            observed
                .lock()
                .unwrap()
                .contains(&"写入失败:磁盘已满".to_string())
        }));
        set_error_listener(None);
    }
}
