use crate::error::{BoothError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// One call against the booth backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get<S: Into<String>>(path: S) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post<S: Into<String>>(path: S, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// `METHOD /path`, without the query string
    pub fn route(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// The `{status, message, data}` shape every endpoint answers with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Build from any JSON body; bare arrays and scalars become `data`
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            Value::Null => Ok(Self::default()),
            other => Ok(Self {
                data: Some(other),
                ..Self::default()
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        match &self.status {
            Some(Value::String(s)) => {
                let s = s.to_ascii_lowercase();
                s == "error" || s == "failed" || s == "fail"
            }
            Some(Value::Number(n)) => n.as_u64().map(|code| code >= 400).unwrap_or(false),
            Some(Value::Bool(ok)) => !ok,
            _ => false,
        }
    }

    /// Turn an error-status envelope into [`BoothError::Api`]
    pub fn into_result(self) -> Result<Self> {
        if self.is_error() {
            let status = match &self.status {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "error".to_string(),
            };
            return Err(BoothError::api(status, self.message));
        }
        Ok(self)
    }

    /// Look a key up in `data` first, then at the top level
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .or_else(|| self.extra.get(key))
    }

    /// First string found under any of `keys`, or `data` itself when it is a string
    pub fn string_field(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| self.field(key).and_then(value_to_string))
            .or_else(|| self.data.as_ref().and_then(|d| d.as_str().map(str::to_string)))
            .filter(|s| !s.is_empty())
    }

    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.data {
            None | Some(Value::Null) => Ok(None),
            Some(data) => Ok(Some(serde_json::from_value(data.clone())?)),
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
