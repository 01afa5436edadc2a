//! 文件大小与传输速率格式化
//!
//! 纯函数，无状态。输出格式与网页端保持一致：
//! - 文件大小以 kB 起步，最小显示 0.1kB
//! - 速率按 bytes/ms 近似为 KB/s，>= 1024 KB/s 时切换为 MB/s

/// 文件大小单位（从 kB 开始）
const BYTE_UNITS: [&str; 8] = ["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// 最小显示值，0 字节也显示为 0.1kB
const MIN_DISPLAY_SIZE: f64 = 0.1;

/// 将字节数转换为可读字符串
///
/// 至少除一次 1024，因此结果单位最小为 kB
///
/// # 示例
/// * `0` -> `"0.1kB"`
/// * `1024` -> `"1.0kB"`
/// * `1048576` -> `"1.0MB"`
pub fn readable_file_size(size_bytes: u64) -> String {
    let mut value = size_bytes as f64 / 1024.0;
    let mut unit = 0;

    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.1}{}", value.max(MIN_DISPLAY_SIZE), BYTE_UNITS[unit])
}

/// 格式化速率（输入单位 KB/s）
pub fn humanize_rate(kb_per_sec: f64) -> String {
    if kb_per_sec >= 1024.0 {
        format!("{:.1}MB/s", kb_per_sec / 1024.0)
    } else {
        format!("{:.1}KB/s", kb_per_sec)
    }
}

/// 根据已发送字节数和耗时计算速率文本
///
/// 耗时为 0 时无法给出有效数值，返回 None（调用方显示 "Uploading..."）
pub fn transfer_rate(bytes_sent: u64, elapsed_ms: u64) -> Option<String> {
    if elapsed_ms == 0 {
        return None;
    }

    let rate = bytes_sent as f64 / elapsed_ms as f64;
    if !rate.is_finite() {
        return None;
    }

    Some(humanize_rate(rate))
}
