// 字段提供者分子模块
// 每条日志写入时内联调用，产出附加字段；提供者实现必须保持轻量

use crate::molecules::fields::{Fields, FieldsBuilder};
use crate::molecules::reporting::ErrorHandler;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// 字段提供者：零参回调，产出字段名到可能缺失的字段值的映射
//
// 值为 None 的条目在转换时丢弃（见 fields 模块），提供者因此可以
// 直接透传来路不明的查询结果而无需自行过滤。
pub trait FieldProvider: Send + Sync {
    fn fields(&self) -> HashMap<String, Option<String>>;
}

impl<F> FieldProvider for F
where
    F: Fn() -> HashMap<String, Option<String>> + Send + Sync,
{
    fn fields(&self) -> HashMap<String, Option<String>> {
        self()
    }
}

/// 时间提供者：覆写日志时间戳的来源
pub trait DateProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 默认时间提供者（系统时钟）
pub struct SystemDateProvider;

impl DateProvider for SystemDateProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 元数据提供者：聚合内置与调用方自定义的字段提供者
//
// 键冲突时内置提供者优先；单个提供者 panic 会被隔离上报，
// 不影响其余提供者，也不影响当前日志的写入。
pub struct MetadataProvider {
    date_provider: Arc<dyn DateProvider>,
    ootb_providers: Vec<Arc<dyn FieldProvider>>,
    custom_providers: Vec<Arc<dyn FieldProvider>>,
    error_handler: ErrorHandler,
}

impl MetadataProvider {
    pub fn new(
        date_provider: Arc<dyn DateProvider>,
        ootb_providers: Vec<Arc<dyn FieldProvider>>,
        custom_providers: Vec<Arc<dyn FieldProvider>>,
        error_handler: ErrorHandler,
    ) -> Self {
        Self {
            date_provider,
            ootb_providers,
            custom_providers,
            error_handler,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.date_provider.now()
    }

    pub fn ootb_fields(&self) -> Fields {
        self.collect(&self.ootb_providers)
    }

    pub fn custom_fields(&self) -> Fields {
        self.collect(&self.custom_providers)
    }

    fn collect(&self, providers: &[Arc<dyn FieldProvider>]) -> Fields {
        if providers.is_empty() {
            return Fields::EMPTY;
        }

        let mut builder = FieldsBuilder::new();
        for provider in providers {
            // 提供者是外部代码，panic 不能放行到写日志路径上；
            // 此处也不能用门面日志上报，否则会形成日志的无限循环
            match panic::catch_unwind(AssertUnwindSafe(|| provider.fields())) {
                Ok(provided) => {
                    for (key, value) in &provided {
                        builder.add_if_some(key, value.as_deref());
                    }
                }
                Err(_) => {
                    self.error_handler
                        .handle_error("字段提供者执行失败", "提供者回调 panic，已跳过");
                }
            }
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecules::fields::fields_of;

    fn provider_of(pairs: &[(&str, Option<&str>)]) -> Arc<dyn FieldProvider> {
        let owned: Vec<(String, Option<String>)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect();
        Arc::new(move || owned.iter().cloned().collect::<HashMap<_, _>>())
    }

    #[test]
    fn custom_fields_come_from_all_providers() {
        let metadata = MetadataProvider::new(
            Arc::new(SystemDateProvider),
            vec![],
            vec![
                provider_of(&[("user_id", Some("user-1"))]),
                provider_of(&[("tenant", Some("acme"))]),
            ],
            ErrorHandler::disconnected(),
        );

        let fields = metadata.custom_fields();

        assert_eq!(fields.get("user_id"), Some("user-1"));
        assert_eq!(fields.get("tenant"), Some("acme"));
    }

    #[test]
    fn absent_values_are_dropped_on_the_way_through() {
        let metadata = MetadataProvider::new(
            Arc::new(SystemDateProvider),
            vec![],
            vec![provider_of(&[
                ("user_id", Some("user-1")),
                ("exception_message", None),
            ])],
            ErrorHandler::disconnected(),
        );

        let fields = metadata.custom_fields();

        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("exception_message"), None);
    }

    #[test]
    fn panicking_provider_is_isolated() {
        let panicking: Arc<dyn FieldProvider> =
            Arc::new(|| -> HashMap<String, Option<String>> { panic!("宿主代码缺陷") });

        let metadata = MetadataProvider::new(
            Arc::new(SystemDateProvider),
            vec![],
            vec![panicking, provider_of(&[("user_id", Some("user-1"))])],
            ErrorHandler::disconnected(),
        );

        let fields = metadata.custom_fields();

        // 后续提供者不受影响
        assert_eq!(fields.get("user_id"), Some("user-1"));
    }

    #[test]
    fn empty_provider_lists_yield_empty_fields() {
        let metadata = MetadataProvider::new(
            Arc::new(SystemDateProvider),
            vec![],
            vec![],
            ErrorHandler::disconnected(),
        );

        assert_eq!(metadata.ootb_fields(), fields_of(&[]));
        assert!(metadata.custom_fields().is_empty());
    }
}
