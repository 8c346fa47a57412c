// 键值存储原子模块
// 磁盘文件承载、内存缓存直读；键名经哈希后作为文件名，避免非法路径字符

use std::collections::HashMap;
use std::fs;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;

/// 磁盘键值存储（读穿缓存，写同步落盘）
pub struct KeyValueStore {
    root: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl KeyValueStore {
    /// 创建存储实例，目录不存在时自动创建
    pub fn new(root: PathBuf) -> Result<Self, String> {
        fs::create_dir_all(&root).map_err(|e| format!("无法创建存储目录：{}", e))?;

        Ok(Self {
            root,
            state: Mutex::new(HashMap::new()),
        })
    }

    fn path(&self, key: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        self.root.join(hasher.finish().to_string())
    }

    /// 写入字符串值（先落盘，成功后更新缓存）
    pub fn set_string(&self, key: &str, value: &str) -> Result<(), String> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| "存储缓存锁已中毒".to_string())?;

        fs::write(self.path(key), value.as_bytes()).map_err(|e| format!("写入存储失败：{}", e))?;
        guard.insert(key.to_string(), value.to_string());

        Ok(())
    }

    /// 读取字符串值；缓存命中直接返回，未命中回源磁盘，文件缺失视为无值
    pub fn get_string(&self, key: &str) -> Option<String> {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return None, // 锁失败，静默返回
        };

        if let Some(value) = guard.get(key) {
            return Some(value.clone());
        }

        match fs::read_to_string(self.path(key)) {
            Ok(value) => {
                guard.insert(key.to_string(), value.clone());
                Some(value)
            }
            Err(_) => None,
        }
    }

    /// 删除键（缓存与磁盘同时清理，磁盘缺失不算错误）
    pub fn delete(&self, key: &str) {
        if let Ok(mut guard) = self.state.lock() {
            guard.remove(key);
        }
        let _ = fs::remove_file(self.path(key));
    }
}
