// 字段模型分子模块
// 日志附加字段的内部表示：键值平行数组，构建后不再修改

use std::collections::HashMap;

/// 单个字段值：字符串或二进制
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    String(String),
    Binary(Vec<u8>),
}

impl FieldValue {
    /// 值类型编号：0 为二进制，1 为字符串（与核心侧约定一致）
    pub fn value_type(&self) -> u8 {
        match self {
            FieldValue::Binary(_) => 0,
            FieldValue::String(_) => 1,
        }
    }

    /// 字符串视图；二进制值返回 None
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(value) => Some(value),
            FieldValue::Binary(_) => None,
        }
    }

    /// 字节视图；两种值均可取
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::String(value) => value.as_bytes(),
            FieldValue::Binary(bytes) => bytes,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Binary(value)
    }
}

/// 单个字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

/// 字段集合：键数组与值数组一一对应
//
// 平行数组是跨边界传递时省去包装对象的紧凑表示，keys[i] 对应 values[i]。
// 请通过 fields_of / fields_of_optional / FieldsBuilder 构造。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fields {
    keys: Vec<String>,
    values: Vec<String>,
}

impl Fields {
    /// 空字段集合
    pub const EMPTY: Fields = Fields {
        keys: Vec::new(),
        values: Vec::new(),
    };

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 按键查值（线性查找，字段数量通常很小）
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| self.values[i].as_str())
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    /// 从值可能缺失的映射构造字段集合
    //
    // 值为 None 的条目静默丢弃，其余条目原样保留——下游消费方
    // 永远不会看到缺失值，转换本身也绝不失败。
    pub fn from_optional_map(map: &HashMap<String, Option<String>>) -> Fields {
        if map.is_empty() {
            return Fields::EMPTY;
        }

        let mut builder = FieldsBuilder::with_capacity(map.len());
        for (key, value) in map {
            builder.add_if_some(key, value.as_deref());
        }
        builder.build()
    }
}

/// 从键值对构造字段集合
pub fn fields_of(pairs: &[(&str, &str)]) -> Fields {
    if pairs.is_empty() {
        return Fields::EMPTY;
    }

    let mut builder = FieldsBuilder::with_capacity(pairs.len());
    for (key, value) in pairs {
        builder.add(key, value);
    }
    builder.build()
}

/// 从值可能缺失的键值对构造字段集合，None 条目被丢弃
pub fn fields_of_optional(pairs: &[(&str, Option<&str>)]) -> Fields {
    let mut builder = FieldsBuilder::with_capacity(pairs.len());
    for (key, value) in pairs {
        builder.add_if_some(key, *value);
    }
    builder.build()
}

/// 按顺序拼接多个字段集合
pub fn combine_fields(arrays: &[&Fields]) -> Fields {
    let total: usize = arrays.iter().map(|a| a.len()).sum();
    if total == 0 {
        return Fields::EMPTY;
    }

    let mut builder = FieldsBuilder::with_capacity(total);
    for array in arrays {
        builder.add_all(array);
    }
    builder.build()
}

/// 字段集合的增量构建器
pub struct FieldsBuilder {
    keys: Vec<String>,
    values: Vec<String>,
}

impl FieldsBuilder {
    pub fn new() -> Self {
        Self::with_capacity(8)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, key: &str, value: &str) -> &mut Self {
        self.keys.push(key.to_string());
        self.values.push(value.to_string());
        self
    }

    pub fn add_if_some(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.add(key, value);
        }
        self
    }

    pub fn add_all(&mut self, other: &Fields) -> &mut Self {
        for (key, value) in other.iter() {
            self.add(key, value);
        }
        self
    }

    /// 追加字段并为每个键加前缀
    pub fn add_all_prefixed(&mut self, prefix: &str, other: &Fields) -> &mut Self {
        for (key, value) in other.iter() {
            self.keys.push(format!("{}{}", prefix, key));
            self.values.push(value.to_string());
        }
        self
    }

    pub fn build(self) -> Fields {
        if self.keys.is_empty() {
            return Fields::EMPTY;
        }
        Fields {
            keys: self.keys,
            values: self.values,
        }
    }
}

impl Default for FieldsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
