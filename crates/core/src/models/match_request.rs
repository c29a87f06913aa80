use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MatchError, MatchResult};

/// 匹配请求
///
/// 由队列消息负载反序列化得到，创建后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub request_id: Uuid,
    /// 需要匹配的对象标识
    pub subject: String,
    /// 匹配参数，由业务匹配算法解释
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub requested_at: DateTime<Utc>,
}

impl MatchRequest {
    pub fn new(subject: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            subject: subject.into(),
            parameters,
            requested_at: Utc::now(),
        }
    }

    /// 从消息负载反序列化
    pub fn from_slice(payload: &[u8]) -> MatchResult<Self> {
        let request: MatchRequest = serde_json::from_slice(payload)?;
        request.validate()?;
        Ok(request)
    }

    /// 序列化为消息负载
    pub fn to_vec(&self) -> MatchResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| MatchError::Internal(format!("序列化匹配请求失败: {e}")))
    }

    pub fn validate(&self) -> MatchResult<()> {
        if self.subject.trim().is_empty() {
            return Err(MatchError::Deserialization(
                "匹配请求的subject不能为空".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for MatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchRequest[{} subject={}]", self.request_id, self.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_slice_accepts_valid_payload() {
        let original = MatchRequest::new("user-42", json!({"radius_km": 10}));
        let payload = original.to_vec().unwrap();

        let parsed = MatchRequest::from_slice(&payload).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_from_slice_defaults_optional_fields() {
        let payload = br#"{"request_id":"1b4e28ba-2fa1-11d2-883f-0016d3cca427","subject":"user-7"}"#;
        let parsed = MatchRequest::from_slice(payload).unwrap();
        assert_eq!(parsed.subject, "user-7");
        assert!(parsed.parameters.is_null());
    }

    #[test]
    fn test_from_slice_rejects_garbage() {
        let result = MatchRequest::from_slice(b"\x00\x01not json");
        assert!(matches!(result, Err(MatchError::Deserialization(_))));
    }

    #[test]
    fn test_from_slice_rejects_empty_subject() {
        let payload = br#"{"request_id":"1b4e28ba-2fa1-11d2-883f-0016d3cca427","subject":"  "}"#;
        let result = MatchRequest::from_slice(payload);
        assert!(matches!(result, Err(MatchError::Deserialization(_))));
    }
}
