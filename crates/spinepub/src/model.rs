use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

pub type Timestamp = DateTime<Utc>;

/// Current time at millisecond precision, matching what JSON consumers expect.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(3)
}

/// Sibling order. Live storage keeps fractional positions; whole numbers serialize
/// as integers so published documents stay byte-stable.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Position(pub f64);

impl Position {
    pub fn ordinal(index: usize) -> Self {
        Position((index + 1) as f64)
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.fract() == 0.0 && self.0.abs() < 9.0e15 {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

/// Element identifier. Stored elements use numeric ids, embedded primitives use
/// client-generated string ids.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ElementId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Number(id) => write!(f, "{id}"),
            ElementId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for ElementId {
    fn from(value: i64) -> Self {
        ElementId::Number(value)
    }
}

impl From<i32> for ElementId {
    fn from(value: i32) -> Self {
        ElementId::Number(value.into())
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        ElementId::Text(value.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    pub repository_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: Value,
    /// Typed relationships to other activities, keyed by relationship type.
    #[serde(default)]
    pub refs: Map<String, Value>,
    #[serde(default)]
    pub published_at: Option<Timestamp>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    pub activity_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

/// Atomic content unit. Also used for primitives embedded in composite elements,
/// which is why unknown attributes are carried through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeachingElement {
    pub id: ElementId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub refs: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TeachingElement {
    pub fn new(id: impl Into<ElementId>, kind: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            uid: None,
            kind: kind.into(),
            content_id: None,
            content_signature: None,
            position: None,
            data,
            meta: Value::Null,
            refs: Value::Null,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn with_position(mut self, position: f64) -> Self {
        self.position = Some(Position(position));
        self
    }

    pub fn data_field(&self, name: &str) -> Option<&Value> {
        self.data.as_object().and_then(|data| data.get(name))
    }

    /// Question elements carry their sub-items under `data.question`.
    pub fn is_question(&self) -> bool {
        self.data_field("question").is_some_and(|q| !q.is_null())
    }

    /// Composite elements embed primitives under `data.embeds`.
    pub fn is_composite(&self) -> bool {
        self.data_field("embeds").is_some_and(|e| !e.is_null())
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_composite()
    }

    pub fn label(&self) -> String {
        format!("{}#{}", self.kind, self.id)
    }
}
