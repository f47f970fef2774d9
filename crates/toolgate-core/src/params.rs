//! Declarative parameter schemas and boundary validation.
//!
//! A tool declares its parameters once; validation happens in the dispatch
//! layer before any network call, so handlers only ever see normalized input.

use crate::{FailureKind, ToolFailure};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Value kinds a parameter may declare.
#[derive(Debug, Clone)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Bool,
    /// One of a fixed set of strings.
    StrEnum(&'static [&'static str]),
    /// One of a fixed set of integers.
    IntEnum(&'static [i64]),
    /// UUID in canonical textual form.
    Uuid,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String | Self::StrEnum(_) | Self::Uuid | Self::Date => "string",
            Self::Integer | Self::IntEnum(_) => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
    pub default: Option<Value>,
}

/// Schema of `{name -> {required, kind}}` for one tool.
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    specs: Vec<ParamSpec>,
}

impl ParamSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn required(mut self, name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        self.specs.push(ParamSpec {
            name,
            kind,
            required: true,
            description,
            default: None,
        });
        self
    }

    #[must_use]
    pub fn optional(mut self, name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        self.specs.push(ParamSpec {
            name,
            kind,
            required: false,
            description,
            default: None,
        });
        self
    }

    #[must_use]
    pub fn optional_with_default(
        mut self,
        name: &'static str,
        kind: ParamKind,
        description: &'static str,
        default: Value,
    ) -> Self {
        self.specs.push(ParamSpec {
            name,
            kind,
            required: false,
            description,
            default: Some(default),
        });
        self
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Validate a caller-supplied argument object against this schema.
    ///
    /// Side-effect-free. Returns the normalized parameter set, or an
    /// `InvalidParameter` failure naming the offending field and, for
    /// enumerated kinds, the allowed set.
    pub fn validate(&self, args: &Value) -> Result<Params, ToolFailure> {
        let supplied = match args {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(ToolFailure::new(
                    FailureKind::InvalidParameter,
                    format!("arguments must be an object, got {}", type_name(other)),
                ))
            }
        };

        let mut values = Map::new();
        for spec in &self.specs {
            match supplied.get(spec.name) {
                Some(value) if !value.is_null() => {
                    let normalized = check_kind(spec, value)?;
                    values.insert(spec.name.to_string(), normalized);
                }
                _ if spec.required => {
                    return Err(ToolFailure::invalid_parameter(
                        spec.name,
                        format!("missing required parameter '{}'", spec.name),
                    ));
                }
                _ => {
                    if let Some(default) = &spec.default {
                        values.insert(spec.name.to_string(), default.clone());
                    }
                }
            }
        }

        Ok(Params { values })
    }

    /// JSON Schema describing this parameter set, for tool listings.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.specs {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(spec.kind.json_type()));
            prop.insert("description".to_string(), json!(spec.description));
            match &spec.kind {
                ParamKind::StrEnum(allowed) => {
                    prop.insert("enum".to_string(), json!(allowed));
                }
                ParamKind::IntEnum(allowed) => {
                    prop.insert("enum".to_string(), json!(allowed));
                }
                ParamKind::Uuid => {
                    prop.insert("format".to_string(), json!("uuid"));
                }
                ParamKind::Date => {
                    prop.insert("format".to_string(), json!("date"));
                }
                _ => {}
            }
            properties.insert(spec.name.to_string(), Value::Object(prop));
            if spec.required {
                required.push(json!(spec.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn check_kind(spec: &ParamSpec, value: &Value) -> Result<Value, ToolFailure> {
    let mismatch = || {
        ToolFailure::invalid_parameter(
            spec.name,
            format!(
                "parameter '{}' must be of type {}",
                spec.name,
                spec.kind.json_type()
            ),
        )
    };

    match &spec.kind {
        ParamKind::String => value.as_str().map(|s| json!(s)).ok_or_else(mismatch),
        ParamKind::Integer => value.as_i64().map(|n| json!(n)).ok_or_else(mismatch),
        ParamKind::Float => value.as_f64().map(|n| json!(n)).ok_or_else(mismatch),
        ParamKind::Bool => value.as_bool().map(|b| json!(b)).ok_or_else(mismatch),
        ParamKind::StrEnum(allowed) => {
            let text = value.as_str().ok_or_else(mismatch)?;
            if allowed.contains(&text) {
                Ok(json!(text))
            } else {
                Err(ToolFailure::invalid_parameter(
                    spec.name,
                    format!("parameter '{}' must be one of the allowed values", spec.name),
                )
                .with_detail("allowed", json!(allowed)))
            }
        }
        ParamKind::IntEnum(allowed) => {
            let number = value.as_i64().ok_or_else(mismatch)?;
            if allowed.contains(&number) {
                Ok(json!(number))
            } else {
                Err(ToolFailure::invalid_parameter(
                    spec.name,
                    format!("parameter '{}' must be one of the allowed values", spec.name),
                )
                .with_detail("allowed", json!(allowed)))
            }
        }
        ParamKind::Uuid => {
            let text = value.as_str().ok_or_else(mismatch)?;
            Uuid::parse_str(text).map_err(|e| {
                ToolFailure::invalid_parameter(
                    spec.name,
                    format!("parameter '{}' is not a valid uuid: {e}", spec.name),
                )
            })?;
            Ok(json!(text))
        }
        ParamKind::Date => {
            let text = value.as_str().ok_or_else(mismatch)?;
            NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| {
                ToolFailure::invalid_parameter(
                    spec.name,
                    format!("parameter '{}' is not a YYYY-MM-DD date: {e}", spec.name),
                )
            })?;
            Ok(json!(text))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalized parameters, produced only by [`ParamSchema::validate`].
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: Map<String, Value>,
}

impl Params {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Result<&str, ToolFailure> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| missing(name))
    }

    pub fn int(&self, name: &str) -> Result<i64, ToolFailure> {
        self.values
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| missing(name))
    }

    pub fn uuid(&self, name: &str) -> Result<Uuid, ToolFailure> {
        let text = self.str(name)?;
        Uuid::parse_str(text).map_err(|e| {
            ToolFailure::invalid_parameter(name, format!("parameter '{name}' is not a valid uuid: {e}"))
        })
    }

    pub fn date(&self, name: &str) -> Result<NaiveDate, ToolFailure> {
        let text = self.str(name)?;
        NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| {
            ToolFailure::invalid_parameter(name, format!("parameter '{name}' is not a date: {e}"))
        })
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    /// The normalized parameter map, for failure details.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

fn missing(name: &str) -> ToolFailure {
    ToolFailure::invalid_parameter(name, format!("missing required parameter '{name}'"))
}
