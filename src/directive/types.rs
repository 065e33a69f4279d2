use crate::audit::Flag;
use serde::Serialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};

/// The single decision extracted from one reasoning-service response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// Request to execute a named capability.
    ToolCall {
        name: String,
        args: Value,
        comment: Option<String>,
        flags: Vec<Flag>,
    },
    /// Intermediate deliverable of a sub-session; never ends a top-level run.
    Result { payload: Value, flags: Vec<Flag> },
    /// Terminal outcome of a top-level run.
    Final { payload: Value, flags: Vec<Flag> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DirectiveKind {
    ToolCall,
    Result,
    Final,
}

/// Keys that make a bare object count as an implicit `Result`.
const RESULT_SHAPED_KEYS: [&str; 3] = ["manifestUrl", "directUrl", "headers"];

/// Loose truthiness: null, false, zero, NaN and empty strings are absent.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Directive {
    /// Decode a parsed object, applying the acceptance rule. Precedence when
    /// several keys are present: `final`, then `result`, then `tool`.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut object) = value else {
            return None;
        };
        let flags = Flag::from_json(object.get("flags"));

        if is_truthy(object.get("final")) {
            let payload = object.remove("final").unwrap_or(Value::Null);
            return Some(Self::Final { payload, flags });
        }
        if is_truthy(object.get("result")) {
            let payload = object.remove("result").unwrap_or(Value::Null);
            return Some(Self::Result { payload, flags });
        }
        if is_truthy(object.get("tool")) {
            let name = object.get("tool").map(text_of).unwrap_or_default();
            let args = match object.remove("args") {
                Some(Value::Null) | None => Value::Object(Map::new()),
                Some(args) => args,
            };
            let comment = object
                .get("comment")
                .filter(|c| is_truthy(Some(c)))
                .map(text_of);
            return Some(Self::ToolCall {
                name,
                args,
                comment,
                flags,
            });
        }
        if RESULT_SHAPED_KEYS.iter().any(|key| is_truthy(object.get(*key))) {
            object.remove("flags");
            return Some(Self::Result {
                payload: Value::Object(object),
                flags,
            });
        }
        None
    }

    pub fn kind(&self) -> DirectiveKind {
        match self {
            Self::ToolCall { .. } => DirectiveKind::ToolCall,
            Self::Result { .. } => DirectiveKind::Result,
            Self::Final { .. } => DirectiveKind::Final,
        }
    }

    pub fn flags(&self) -> &[Flag] {
        match self {
            Self::ToolCall { flags, .. } | Self::Result { flags, .. } | Self::Final { flags, .. } => {
                flags
            }
        }
    }
}
