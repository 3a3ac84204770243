use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::SchedulerResult;

/// 请求负载
///
/// 对调度引擎而言是不透明的字节，只有处理函数知道具体类型。
/// 默认编解码为 JSON，压缩等由调用方在写入前自行处理。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TickerRequest(Vec<u8>);

impl TickerRequest {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn encode<T: Serialize>(value: &T) -> SchedulerResult<Self> {
        Ok(Self(serde_json::to_vec(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> SchedulerResult<T> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
