// 操作跨度分子模块
// 每个跨度产生两条日志：开启时一条 start，结束时一条 end（带时长与结果）

use crate::atoms::id_generator;
use crate::molecules::bridge::LogLevel;
use crate::molecules::fields::{Fields, FieldsBuilder};
use crate::molecules::providers::DateProvider;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

// 跨度字段键
const SPAN_ID: &str = "_span_id";
const SPAN_NAME: &str = "_span_name";
const SPAN_TYPE: &str = "_span_type";
const SPAN_DURATION: &str = "_duration_ms";
const SPAN_RESULT: &str = "_result";
const SPAN_PARENT: &str = "_span_parent_id";

const TYPE_START: &str = "start";
const TYPE_END: &str = "end";

/// 跨度结束结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanResult {
    Success,
    Failure,
    Unknown,
}

impl SpanResult {
    fn as_str(self) -> &'static str {
        match self {
            SpanResult::Success => "success",
            SpanResult::Failure => "failure",
            SpanResult::Unknown => "unknown",
        }
    }
}

/// 跨度日志的落点（由日志器实现）
pub trait SpanSink: Send + Sync {
    fn write_span_log(&self, level: LogLevel, fields: Fields, message: &str);
}

/// 一次已开启的操作
pub struct Span {
    sink: Arc<dyn SpanSink>,
    date_provider: Arc<dyn DateProvider>,
    /// 跨度的自动生成唯一标识
    pub id: String,
    /// 人类可读的操作名，无需唯一
    pub name: String,
    /// 父跨度 ID；无父跨度即为根跨度
    pub parent_id: Option<String>,
    level: LogLevel,
    started_at: DateTime<Utc>,
}

impl Span {
    /// 开启跨度并立即写出 start 日志
    pub fn start(
        sink: Arc<dyn SpanSink>,
        date_provider: Arc<dyn DateProvider>,
        name: &str,
        level: LogLevel,
        fields: Option<&HashMap<String, String>>,
        parent_id: Option<&str>,
    ) -> Self {
        let span = Self {
            sink,
            date_provider: date_provider.clone(),
            id: id_generator::new_id(),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
            level,
            started_at: date_provider.now(),
        };

        let mut builder = FieldsBuilder::new();
        append_custom(&mut builder, fields);
        builder
            .add(SPAN_ID, &span.id)
            .add(SPAN_NAME, &span.name)
            .add(SPAN_TYPE, TYPE_START)
            .add_if_some(SPAN_PARENT, span.parent_id.as_deref());

        span.sink
            .write_span_log(span.level, builder.build(), &span.name);
        span
    }

    /// 结束跨度并写出 end 日志（消费自身，结束只会发生一次）
    pub fn end(self, result: SpanResult, fields: Option<&HashMap<String, String>>) {
        let duration_ms = self
            .date_provider
            .now()
            .signed_duration_since(self.started_at)
            .num_milliseconds();

        let mut builder = FieldsBuilder::new();
        append_custom(&mut builder, fields);
        builder
            .add(SPAN_ID, &self.id)
            .add(SPAN_NAME, &self.name)
            .add(SPAN_TYPE, TYPE_END)
            .add(SPAN_DURATION, &duration_ms.to_string())
            .add(SPAN_RESULT, result.as_str())
            .add_if_some(SPAN_PARENT, self.parent_id.as_deref());

        self.sink
            .write_span_log(self.level, builder.build(), &self.name);
    }
}

fn append_custom(builder: &mut FieldsBuilder, fields: Option<&HashMap<String, String>>) {
    if let Some(fields) = fields {
        for (key, value) in fields {
            builder.add(key, value);
        }
    }
}

/// 包裹一段代码：自动按返回结果结束跨度
pub fn track_span<T, E>(
    sink: Arc<dyn SpanSink>,
    date_provider: Arc<dyn DateProvider>,
    name: &str,
    level: LogLevel,
    fields: Option<&HashMap<String, String>>,
    block: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let span = Span::start(sink, date_provider, name, level, fields, None);
    match block() {
        Ok(value) => {
            span.end(SpanResult::Success, None);
            Ok(value)
        }
        Err(e) => {
            span.end(SpanResult::Failure, None);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecules::providers::SystemDateProvider;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        logs: Mutex<Vec<(LogLevel, Fields, String)>>,
    }

    impl SpanSink for CollectingSink {
        fn write_span_log(&self, level: LogLevel, fields: Fields, message: &str) {
            self.logs
                .lock()
                .unwrap()
                .push((level, fields, message.to_string()));
        }
    }

    #[test]
    fn span_emits_start_and_end_logs() {
        let sink = Arc::new(CollectingSink::default());
        let span = Span::start(
            sink.clone(),
            Arc::new(SystemDateProvider),
            "load_profile",
            LogLevel::Info,
            None,
            None,
        );
        let span_id = span.id.clone();

        span.end(SpanResult::Success, None);

        let logs = sink.logs.lock().unwrap();
        assert_eq!(logs.len(), 2);

        let (_, start_fields, start_message) = &logs[0];
        assert_eq!(start_message, "load_profile");
        assert_eq!(start_fields.get("_span_type"), Some("start"));
        assert_eq!(start_fields.get("_span_id"), Some(span_id.as_str()));
        assert_eq!(start_fields.get("_span_parent_id"), None);

        let (_, end_fields, _) = &logs[1];
        assert_eq!(end_fields.get("_span_type"), Some("end"));
        assert_eq!(end_fields.get("_span_id"), Some(span_id.as_str()));
        assert_eq!(end_fields.get("_result"), Some("success"));
        assert!(end_fields.get("_duration_ms").is_some());
    }

    #[test]
    fn child_span_carries_parent_id() {
        let sink = Arc::new(CollectingSink::default());
        let parent = Span::start(
            sink.clone(),
            Arc::new(SystemDateProvider),
            "parent",
            LogLevel::Debug,
            None,
            None,
        );

        let child = Span::start(
            sink.clone(),
            Arc::new(SystemDateProvider),
            "child",
            LogLevel::Debug,
            None,
            Some(&parent.id),
        );

        let logs = sink.logs.lock().unwrap();
        let (_, child_fields, _) = &logs[1];
        assert_eq!(
            child_fields.get("_span_parent_id"),
            Some(parent.id.as_str())
        );
        drop(logs);
        child.end(SpanResult::Unknown, None);
    }

    #[test]
    fn track_span_maps_result_to_outcome() {
        let sink = Arc::new(CollectingSink::default());

        let outcome: Result<i32, String> = track_span(
            sink.clone(),
            Arc::new(SystemDateProvider),
            "compute",
            LogLevel::Info,
            None,
            || Err("坏输入".to_string()),
        );

        assert!(outcome.is_err());
        let logs = sink.logs.lock().unwrap();
        let (_, end_fields, _) = &logs[1];
        assert_eq!(end_fields.get("_result"), Some("failure"));
    }
}
