//! Declarative argument schemas and the single place untrusted tool arguments
//! are validated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};

/// JSON-friendly type hint for a tool parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn json_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Describes a single parameter that a tool accepts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub required: bool,
    #[serde(default)]
    pub param_type: ParamType,
    /// Allowed values when the parameter is a string enum.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Inclusive lower bound for numeric parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numeric parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Character-count bounds for string parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl ToolParam {
    /// Required string parameter.
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            ..Default::default()
        }
    }

    /// Optional string parameter.
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
            ..Default::default()
        }
    }

    pub fn of_type(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }

    /// Inclusive numeric range.
    pub fn range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    /// Inclusive string length range, in characters.
    pub fn length(mut self, min_length: usize, max_length: usize) -> Self {
        self.min_length = Some(min_length);
        self.max_length = Some(max_length);
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Check one present, non-null value and return it in canonical form.
    ///
    /// Coercion is lax in the same places a JSON-speaking proposer tends to be
    /// sloppy: integral floats and numeric strings for numbers, `"true"` /
    /// `"false"` for booleans.
    fn check(&self, value: &Value) -> Result<Value, String> {
        let name = &self.name;
        let coerced = match self.param_type {
            ParamType::String => match value {
                Value::String(_) => value.clone(),
                _ => return Err(format!("'{name}' must be a string")),
            },
            ParamType::Integer => {
                let n = as_integer(value).ok_or_else(|| format!("'{name}' must be an integer"))?;
                Value::Number(Number::from(n))
            }
            ParamType::Number => {
                let n = as_number(value).ok_or_else(|| format!("'{name}' must be a number"))?;
                Number::from_f64(n)
                    .map(Value::Number)
                    .ok_or_else(|| format!("'{name}' must be a finite number"))?
            }
            ParamType::Boolean => match value {
                Value::Bool(_) => value.clone(),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
                _ => return Err(format!("'{name}' must be a boolean")),
            },
            ParamType::Array => match value {
                Value::Array(_) => value.clone(),
                _ => return Err(format!("'{name}' must be an array")),
            },
            ParamType::Object => match value {
                Value::Object(_) => value.clone(),
                _ => return Err(format!("'{name}' must be an object")),
            },
        };

        if let Some(n) = coerced.as_f64() {
            let below = self.minimum.is_some_and(|min| n < min);
            let above = self.maximum.is_some_and(|max| n > max);
            if below || above {
                return Err(match (self.minimum, self.maximum) {
                    (Some(min), Some(max)) => {
                        format!("'{name}' must be between {min} and {max}, got {n}")
                    }
                    (Some(min), None) => format!("'{name}' must be at least {min}, got {n}"),
                    (None, Some(max)) => format!("'{name}' must be at most {max}, got {n}"),
                    (None, None) => unreachable!("range check without bounds"),
                });
            }
        }

        if let Value::String(s) = &coerced {
            let chars = s.chars().count();
            if self.min_length.is_some_and(|min| chars < min) {
                return Err(format!(
                    "'{name}' must be at least {} characters",
                    self.min_length.unwrap_or_default()
                ));
            }
            if self.max_length.is_some_and(|max| chars > max) {
                return Err(format!(
                    "'{name}' must be at most {} characters",
                    self.max_length.unwrap_or_default()
                ));
            }
            if !self.enum_values.is_empty() && !self.enum_values.iter().any(|v| v == s) {
                return Err(format!(
                    "'{name}' must be one of: {}",
                    self.enum_values.join(", ")
                ));
            }
        }

        Ok(coerced)
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// The argument contract of one tool: a closed set of typed fields plus
/// "at least one of" groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgSchema {
    pub params: Vec<ToolParam>,
    /// Each group names fields of which at least one must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<Vec<String>>,
}

impl ArgSchema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(params: Vec<ToolParam>) -> Self {
        Self {
            params,
            any_of: Vec::new(),
        }
    }

    pub fn require_any(mut self, names: &[&str]) -> Self {
        self.any_of.push(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Validate untrusted arguments.
    ///
    /// On success the returned map holds exactly the declared fields (absent
    /// optional ones as `null`); undeclared keys are dropped.  On failure the
    /// error lists every violation, separated by `"; "`.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        let mut clean = Map::new();
        let mut problems = Vec::new();

        for param in &self.params {
            match args.get(&param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        problems.push(format!("'{}' is required", param.name));
                    }
                    clean.insert(param.name.clone(), Value::Null);
                }
                Some(value) => match param.check(value) {
                    Ok(value) => {
                        clean.insert(param.name.clone(), value);
                    }
                    Err(problem) => problems.push(problem),
                },
            }
        }

        for group in &self.any_of {
            let satisfied = group
                .iter()
                .any(|name| clean.get(name).is_some_and(|v| !v.is_null()));
            if !satisfied {
                let quoted = group.iter().map(|n| format!("'{n}'")).collect::<Vec<_>>();
                problems.push(format!("provide at least one of {}", quoted.join(" or ")));
            }
        }

        if problems.is_empty() {
            Ok(clean)
        } else {
            Err(problems.join("; "))
        }
    }

    /// JSON Schema (draft 2020-12 subset) describing the arguments.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<String> = Vec::new();

        for p in &self.params {
            let mut prop = json!({
                "type": p.param_type.json_name(),
                "description": p.description,
            });
            if !p.enum_values.is_empty() {
                prop["enum"] = json!(p.enum_values);
            }
            if let Some(min) = p.minimum {
                prop["minimum"] = json!(min);
            }
            if let Some(max) = p.maximum {
                prop["maximum"] = json!(max);
            }
            if let Some(min) = p.min_length {
                prop["minLength"] = json!(min);
            }
            if let Some(max) = p.max_length {
                prop["maxLength"] = json!(max);
            }
            properties.insert(p.name.clone(), prop);
            if p.required {
                required.push(p.name.clone());
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if !self.any_of.is_empty() {
            // A single group maps onto `anyOf`; several groups must all hold.
            let groups = self
                .any_of
                .iter()
                .map(|group| {
                    json!({ "anyOf": group.iter().map(|n| json!({ "required": [n] })).collect::<Vec<_>>() })
                })
                .collect::<Vec<_>>();
            schema["allOf"] = Value::Array(groups);
        }
        schema
    }
}
