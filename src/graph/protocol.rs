use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Response status codes defined by the Gremlin Server protocol.
pub mod codes {
    pub const SUCCESS: u16 = 200;
    pub const NO_CONTENT: u16 = 204;
    pub const PARTIAL_CONTENT: u16 = 206;
}

/// One `eval` request frame submitted over the WebSocket session.
#[derive(Debug, Clone, Serialize)]
pub struct GremlinRequest {
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    pub op: String,
    pub processor: String,
    pub args: RequestArgs,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestArgs {
    pub gremlin: String,
    pub bindings: serde_json::Map<String, serde_json::Value>,
    pub language: String,
}

impl GremlinRequest {
    /// Script evaluation with parameter bindings. Bindings keep values out
    /// of the script text, which is what makes arbitrary property values
    /// safe to write.
    pub fn eval(
        gremlin: impl Into<String>,
        bindings: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            op: "eval".to_string(),
            processor: String::new(),
            args: RequestArgs {
                gremlin: gremlin.into(),
                bindings,
                language: "gremlin-groovy".to_string(),
            },
        }
    }
}

/// One response frame. A single request may produce several frames; every
/// frame before the last carries status 206.
#[derive(Debug, Clone, Deserialize)]
pub struct GremlinResponse {
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    pub status: ResponseStatus,
    #[serde(default)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseStatus {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseResult {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl GremlinResponse {
    pub fn is_terminal(&self) -> bool {
        self.status.code != codes::PARTIAL_CONTENT
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status.code, codes::SUCCESS | codes::NO_CONTENT)
    }

    /// The result rows of this frame, GraphSON unwrapped.
    pub fn rows(&self) -> Vec<serde_json::Value> {
        match &self.result.data {
            Some(data) => match flatten_graphson(data) {
                serde_json::Value::Array(items) => items,
                other => vec![other],
            },
            None => Vec::new(),
        }
    }
}

/// Unwrap GraphSON 3 typed values into plain JSON.
///
/// Gremlin Server wraps scalars as `{"@type": "g:Int64", "@value": 42}`,
/// lists as `g:List`, and `elementMap` results as `g:Map` with the entries
/// flattened into an alternating key/value array. Downstream code only ever
/// sees the plain shapes.
pub fn flatten_graphson(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            match (map.get("@type").and_then(|t| t.as_str()), map.get("@value")) {
                (Some("g:List" | "g:Set"), Some(serde_json::Value::Array(items))) => {
                    serde_json::Value::Array(items.iter().map(flatten_graphson).collect())
                }
                (Some("g:Map"), Some(serde_json::Value::Array(pairs))) => {
                    let mut object = serde_json::Map::new();
                    for chunk in pairs.chunks(2) {
                        if let [key, val] = chunk {
                            let key = match flatten_graphson(key) {
                                serde_json::Value::String(s) => s,
                                other => other.to_string(),
                            };
                            object.insert(key, flatten_graphson(val));
                        }
                    }
                    serde_json::Value::Object(object)
                }
                (Some(_), Some(inner)) => flatten_graphson(inner),
                _ => {
                    let mut object = serde_json::Map::new();
                    for (key, val) in map {
                        object.insert(key.clone(), flatten_graphson(val));
                    }
                    serde_json::Value::Object(object)
                }
            }
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(flatten_graphson).collect())
        }
        other => other.clone(),
    }
}

/// Convenience for building binding maps.
pub fn bindings(entries: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}
