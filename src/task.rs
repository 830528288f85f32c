// Update task descriptor and the OneNET fuse-ota wire records

use serde::de::Unexpected;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A candidate firmware update as reported by the last task check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTask {
    pub available: bool,
    pub task_id: String,
    pub target_version: String,
    /// Expected payload length, 0 when unknown
    pub declared_size: u64,
    /// Lowercase hex MD5 of the payload
    pub expected_digest: String,
}

impl UpdateTask {
    pub fn none() -> Self {
        Self::default()
    }
}

// Example check response:
// {
//     "code": 0,
//     "msg": "succ",
//     "data": {
//         "target": "0.0.3",
//         "tid": 1266435,
//         "size": 3871360,
//         "md5": "761bf238d3b3cbc718ed0e84191bd70c",
//         "status": 1,
//         "type": 1
//     },
//     "request_id": "59db175991ef4b7c8551e6d2fa6affe4"
// }

/// Top-level check response. Each field falls back to `None` on its own
/// when it is missing or has the wrong type.
#[derive(Debug, Default, Deserialize)]
pub struct CheckResponse {
    #[serde(default, deserialize_with = "lenient::integer")]
    pub code: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub msg: Option<String>,
    #[serde(default, deserialize_with = "lenient::record")]
    pub data: Option<TaskRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskRecord {
    #[serde(default, deserialize_with = "lenient::string")]
    pub target: Option<String>,
    #[serde(default, deserialize_with = "lenient::id")]
    pub tid: Option<String>,
    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub md5: Option<String>,
}

impl CheckResponse {
    /// Decode a check response. The body must be a JSON object; a derived
    /// struct would otherwise also accept an array in field order.
    pub fn parse(body: &[u8]) -> serde_json::Result<Self> {
        match serde_json::from_slice::<Value>(body)? {
            value @ Value::Object(_) => serde_json::from_value(value),
            other => Err(serde::de::Error::invalid_type(
                unexpected(&other),
                &"a JSON object",
            )),
        }
    }

    /// `code == 0` is the only value that means a task is pending.
    pub fn has_task(&self) -> bool {
        self.code == Some(0)
    }

    pub fn into_task(self) -> UpdateTask {
        if !self.has_task() {
            return UpdateTask::none();
        }
        let record = self.data.unwrap_or_default();
        UpdateTask {
            available: true,
            task_id: record.tid.unwrap_or_default(),
            target_version: record.target.unwrap_or_default(),
            declared_size: record.size.unwrap_or(0),
            expected_digest: record.md5.unwrap_or_default(),
        }
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

#[derive(Debug, Serialize)]
pub struct VersionReport<'a> {
    pub s_version: &'a str,
    pub f_version: &'a str,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub step: i32,
}

/// Field-level fallbacks: decode whatever JSON value is present and keep it
/// only if it has the expected shape.
pub(crate) mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ => None,
        })
    }

    pub fn unsigned<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_u64(),
            _ => None,
        })
    }

    /// Task ids arrive as numbers but are used as path segments
    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => n
                .as_u64()
                .map(|v| v.to_string())
                .or_else(|| n.as_i64().map(|v| v.to_string())),
            _ => None,
        })
    }

    pub fn record<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            v @ Value::Object(_) => serde_json::from_value(v).ok(),
            _ => None,
        })
    }
}
