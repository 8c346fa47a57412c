// SDK 数据目录解析原子模块
// 解析顺序：调用方覆写 > LUMEN_SDK_DIR 环境变量 > 可执行文件同级 data/ 目录

use std::env;
use std::path::PathBuf;

const SDK_DIR_ENV: &str = "LUMEN_SDK_DIR";

/// 解析 SDK 数据目录（不负责创建目录）
pub fn sdk_directory(override_dir: Option<&PathBuf>) -> Result<PathBuf, String> {
    if let Some(dir) = override_dir {
        return Ok(dir.join("lumen"));
    }

    if let Ok(dir) = env::var(SDK_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir).join("lumen"));
    }

    let binary_path = env::current_exe().map_err(|e| format!("无法获取可执行文件路径：{}", e))?;
    let binary_dir = binary_path
        .parent()
        .ok_or_else(|| "无法获取可执行文件目录".to_string())?;

    Ok(binary_dir.join("data").join("lumen"))
}

/// 诊断日志文件路径（位于 SDK 数据目录下）
pub fn diagnostics_file(sdk_dir: &PathBuf) -> PathBuf {
    sdk_dir.join("diagnostics.logs")
}

/// 键值存储目录（位于 SDK 数据目录下）
pub fn storage_dir(sdk_dir: &PathBuf) -> PathBuf {
    sdk_dir.join("storage")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_takes_precedence() {
        let base = PathBuf::from("/tmp/custom");
        let dir = sdk_directory(Some(&base)).unwrap();

        assert_eq!(dir, PathBuf::from("/tmp/custom/lumen"));
    }

    #[test]
    fn derived_paths_live_under_sdk_dir() {
        let sdk_dir = PathBuf::from("/tmp/custom/lumen");

        assert_eq!(
            diagnostics_file(&sdk_dir),
            PathBuf::from("/tmp/custom/lumen/diagnostics.logs")
        );
        assert_eq!(
            storage_dir(&sdk_dir),
            PathBuf::from("/tmp/custom/lumen/storage")
        );
    }
}
