// 会话管理分子模块
// 会话策略决定会话 ID 的轮转时机：固定会话 vs 基于活跃度的自动轮转

use crate::atoms::id_generator;
use crate::atoms::storage::KeyValueStore;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

const SESSION_ID_KEY: &str = "session.id";
const LAST_ACTIVITY_KEY: &str = "session.last_activity_ms";

// 活跃时间落盘节流：同一秒内的活动不重复写盘
const ACTIVITY_PERSIST_INTERVAL_MS: i64 = 1_000;

/// 会话 ID 生成回调
pub type SessionIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// 会话 ID 变化回调（在监听运行时线程上被调用）
pub type SessionIdChangedListener = Arc<dyn Fn(String) + Send + Sync>;

/// 会话策略
pub enum SessionStrategy {
    /// 固定会话：永不过期，不跨进程存活；
    /// 初始化与每次手动开启新会话时调用生成回调
    Fixed { session_id_generator: SessionIdGenerator },

    /// 活跃度会话：超过静默阈值后自动轮转；
    /// 会话 ID 落盘，跨进程重启存活；每条日志都算一次活动
    ActivityBased {
        inactivity_threshold_mins: i64,
        on_session_id_changed: Option<SessionIdChangedListener>,
    },
}

impl SessionStrategy {
    /// 默认固定会话（UUID 生成器）
    pub fn fixed() -> Self {
        SessionStrategy::Fixed {
            session_id_generator: Arc::new(id_generator::new_id),
        }
    }

    /// 自定义生成器的固定会话
    pub fn fixed_with(generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        SessionStrategy::Fixed {
            session_id_generator: Arc::new(generator),
        }
    }

    /// 活跃度会话，默认 30 分钟静默阈值
    pub fn activity_based() -> Self {
        SessionStrategy::ActivityBased {
            inactivity_threshold_mins: 30,
            on_session_id_changed: None,
        }
    }

    /// 活跃度会话，指定阈值与变化回调
    pub fn activity_based_with(
        inactivity_threshold_mins: i64,
        on_session_id_changed: Option<SessionIdChangedListener>,
    ) -> Self {
        SessionStrategy::ActivityBased {
            inactivity_threshold_mins,
            on_session_id_changed,
        }
    }

    /// 取出变化回调（仅活跃度策略存在）
    pub fn session_id_changed_listener(&self) -> Option<SessionIdChangedListener> {
        match self {
            SessionStrategy::Fixed { .. } => None,
            SessionStrategy::ActivityBased {
                on_session_id_changed,
                ..
            } => on_session_id_changed.clone(),
        }
    }
}

/// 会话 ID 变化事件（经通道投递到监听运行时）
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub session_id: String,
}

enum StrategyState {
    Fixed {
        generator: SessionIdGenerator,
    },
    ActivityBased {
        threshold_ms: i64,
        last_activity_ms: i64,
        last_persisted_ms: i64,
    },
}

/// 会话管理器：持有当前会话 ID，执行策略约定的轮转与持久化
pub struct SessionManager {
    store: Arc<KeyValueStore>,
    events: Option<UnboundedSender<SessionEvent>>,
    inner: Mutex<Inner>,
}

struct Inner {
    session_id: String,
    strategy: StrategyState,
}

impl SessionManager {
    /// 按策略初始化会话
    //
    // 固定策略：调用生成器取初始 ID，不落盘。
    // 活跃度策略：静默窗口内的落盘状态被恢复；窗口已过、状态缺失
    // 或损坏时立即生成新会话。新生成的 ID 会发出变化事件。
    pub fn new(
        strategy: &SessionStrategy,
        store: Arc<KeyValueStore>,
        events: Option<UnboundedSender<SessionEvent>>,
        now_ms: i64,
    ) -> Self {
        match strategy {
            SessionStrategy::Fixed {
                session_id_generator,
            } => {
                let session_id = session_id_generator();
                Self {
                    store,
                    events,
                    inner: Mutex::new(Inner {
                        session_id,
                        strategy: StrategyState::Fixed {
                            generator: session_id_generator.clone(),
                        },
                    }),
                }
            }
            SessionStrategy::ActivityBased {
                inactivity_threshold_mins,
                ..
            } => {
                let threshold_ms = inactivity_threshold_mins.saturating_mul(60_000);
                let persisted = Self::load_persisted(&store);

                let (session_id, fresh) = match persisted {
                    Some((id, last_ms)) if now_ms.saturating_sub(last_ms) <= threshold_ms => {
                        (id, false)
                    }
                    _ => (id_generator::new_id(), true),
                };

                let manager = Self {
                    store,
                    events,
                    inner: Mutex::new(Inner {
                        session_id: session_id.clone(),
                        strategy: StrategyState::ActivityBased {
                            threshold_ms,
                            last_activity_ms: now_ms,
                            last_persisted_ms: now_ms,
                        },
                    }),
                };

                manager.persist(&session_id, now_ms);
                if fresh {
                    manager.emit(session_id);
                }
                manager
            }
        }
    }

    /// 当前会话 ID
    pub fn session_id(&self) -> String {
        match self.inner.lock() {
            Ok(inner) => inner.session_id.clone(),
            Err(_) => String::new(),
        }
    }

    /// 记录一次活动（每条日志调用一次）；静默超限时轮转会话
    pub fn touch(&self, now_ms: i64) {
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        let inner = &mut *guard;

        let StrategyState::ActivityBased {
            threshold_ms,
            last_activity_ms,
            last_persisted_ms,
        } = &mut inner.strategy
        else {
            return; // 固定策略没有活跃度概念
        };

        let rotated = now_ms.saturating_sub(*last_activity_ms) > *threshold_ms;
        *last_activity_ms = now_ms;

        if rotated {
            let new_id = id_generator::new_id();
            inner.session_id = new_id.clone();
            *last_persisted_ms = now_ms;
            drop(guard);

            log::info!("会话静默超限，已轮转会话 ID");
            self.persist(&new_id, now_ms);
            self.emit(new_id);
            return;
        }

        // 仅刷新活跃时间；同一秒内不重复写盘
        if now_ms.saturating_sub(*last_persisted_ms) >= ACTIVITY_PERSIST_INTERVAL_MS {
            *last_persisted_ms = now_ms;
            let session_id = inner.session_id.clone();
            drop(guard);
            self.persist(&session_id, now_ms);
        }
    }

    /// 手动开启新会话
    pub fn start_new_session(&self, now_ms: i64) {
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        let inner = &mut *guard;

        let (new_id, persist) = match &mut inner.strategy {
            StrategyState::Fixed { generator } => (generator(), false),
            StrategyState::ActivityBased {
                last_activity_ms,
                last_persisted_ms,
                ..
            } => {
                *last_activity_ms = now_ms;
                *last_persisted_ms = now_ms;
                (id_generator::new_id(), true)
            }
        };

        inner.session_id = new_id.clone();
        drop(guard);

        if persist {
            self.persist(&new_id, now_ms);
        }
        self.emit(new_id);
    }

    fn load_persisted(store: &KeyValueStore) -> Option<(String, i64)> {
        let id = store.get_string(SESSION_ID_KEY)?;
        let last_ms = store.get_string(LAST_ACTIVITY_KEY)?.parse::<i64>().ok()?;
        if id.is_empty() {
            return None;
        }
        Some((id, last_ms))
    }

    fn persist(&self, session_id: &str, now_ms: i64) {
        // 落盘失败只上报诊断日志，不影响当前会话
        if let Err(e) = self.store.set_string(SESSION_ID_KEY, session_id) {
            log::warn!("会话 ID 落盘失败：{}", e);
        }
        if let Err(e) = self
            .store
            .set_string(LAST_ACTIVITY_KEY, &now_ms.to_string())
        {
            log::warn!("会话活跃时间落盘失败：{}", e);
        }
    }

    fn emit(&self, session_id: String) {
        if let Some(ref events) = self.events {
            let _ = events.send(SessionEvent { session_id });
        }
    }
}
