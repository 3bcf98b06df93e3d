pub mod ip;

/// 追踪标识符长度（256 bit，十六进制）
pub const TRACKING_ID_LEN: usize = 64;

/// 生成新的追踪标识符：32 字节 CSPRNG 随机数的小写十六进制编码
///
/// 标识符与定义的任何属性无关，不可推导
pub fn generate_tracking_id() -> String {
    let bytes: [u8; TRACKING_ID_LEN / 2] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 标识符语法检查：恰好 64 个小写十六进制字符
pub fn is_valid_tracking_id(id: &str) -> bool {
    id.len() == TRACKING_ID_LEN && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
