use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// Response envelope shared by every endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default)]
    pub path_view_count: u64,
    #[serde(default)]
    pub message: String,
}

/// One page of a cursor-paginated endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub resources: Vec<T>,
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub next_cursor: Option<Cursor>,
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub prev_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(
        resources: Vec<T>,
        next_cursor: Option<Cursor>,
        prev_cursor: Option<Cursor>,
    ) -> Self {
        Self {
            resources,
            next_cursor,
            prev_cursor,
        }
    }
}

/// Opaque pagination token. The backend sends either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Falsy values (`null`, `""`, `0`, `false`) mean there is no page in that direction.
fn deserialize_cursor<'de, D>(deserializer: D) -> Result<Option<Cursor>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(Cursor(s)),
        serde_json::Value::Number(n) if n.as_f64() != Some(0.0) => Some(Cursor(n.to_string())),
        serde_json::Value::Bool(true) => Some(Cursor("true".to_string())),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: i64,
    pub object_url: String,
    pub size: Size,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub timeline_background: Option<Asset>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: i64,
    pub create_by: User,
    pub content: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
    pub create_at: DateTime<Utc>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub poster: Asset,
    #[serde(default)]
    pub content: Option<String>,
    pub create_at: DateTime<Utc>,
    #[serde(default)]
    pub publish_year: Option<i32>,
}
