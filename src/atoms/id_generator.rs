// 标识符生成原子模块
// 会话 ID、设备 ID 与跨度 ID 统一使用 UUID v4 文本形式

use uuid::Uuid;

/// 生成一个新的随机标识符（UUID v4，小写连字符格式）
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_unique_and_well_formed() {
        let a = new_id();
        let b = new_id();

        assert_ne!(a, b);
        // UUID 文本形式：8-4-4-4-12
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
    }
}
