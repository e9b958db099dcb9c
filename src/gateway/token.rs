//! Token 估算
//!
//! 网关不做精确分词，只按字符长度粗略估算，用于限流和上游缺失 usage 时的兜底

use super::types::ChatMessage;

pub trait TokenEstimator: Send + Sync {
    /// 估算一段文本的 token 数
    fn estimate(&self, text: &str) -> u64;

    /// 估算请求输入 token：序列化后的消息加上模型前置指令
    fn estimate_request(&self, messages: &[ChatMessage], preamble: &str) -> u64 {
        let mut text = serde_json::to_string(messages).unwrap_or_default();
        text.push_str(preamble);
        self.estimate(&text)
    }
}

/// 字符数 ÷ 4，向上取整
#[derive(Debug, Clone, Copy, Default)]
pub struct CharLengthEstimator;

impl TokenEstimator for CharLengthEstimator {
    fn estimate(&self, text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::Role;

    #[test]
    fn test_char_length_rounds_up() {
        let estimator = CharLengthEstimator;
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abcd"), 1);
        assert_eq!(estimator.estimate("abcde"), 2);
        // 按字符而不是字节计数
        assert_eq!(estimator.estimate("你好世界"), 1);
    }

    #[test]
    fn test_estimate_request_includes_preamble() {
        let estimator = CharLengthEstimator;
        let messages = vec![ChatMessage {
            role: Role::User,
            content: "hi".to_string(),
        }];
        // [{"role":"user","content":"hi"}] = 32 个字符
        assert_eq!(estimator.estimate_request(&messages, ""), 8);
        assert_eq!(estimator.estimate_request(&messages, "be nice"), 10);
    }
}
