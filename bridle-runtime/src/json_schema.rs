//! JSON Schema -> regex translation for structured output.
//!
//! Produces a regex matching JSON text that conforms to the schema. Object
//! properties are emitted in schema order; optional properties may be
//! omitted but never reordered.

use bridle_core::{BridleError, Result, SchemaTranslator};
use serde_json::{Map, Value};

/// Whitespace allowed between JSON tokens unless the request overrides it.
pub const DEFAULT_WHITESPACE: &str = r"[ \t\n\r]*";

const STRING_INNER: &str = r#"([^"\\\x00-\x1F\x7F-\x9F]|\\["\\/bfnrt]|\\u[0-9a-fA-F]{4})"#;
const INTEGER: &str = r"-?(0|[1-9][0-9]*)";
const NUMBER: &str = r"-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?";
const BOOLEAN: &str = r"(true|false)";
const NULL: &str = r"null";

const DATE: &str = r"(?:[0-9]{4})-(?:0[1-9]|1[0-2])-(?:0[1-9]|[1-2][0-9]|3[0-1])";
const TIME: &str = r"(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])(\.[0-9]+)?(Z|[+-](2[0-3]|[01][0-9]):[0-5][0-9])?";
const UUID: &str = r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaTranslator;

impl SchemaTranslator for JsonSchemaTranslator {
    fn schema_to_regex(&self, schema: &Value, whitespace: Option<&str>) -> Result<String> {
        SchemaRegex {
            ws: whitespace.unwrap_or(DEFAULT_WHITESPACE),
        }
        .node(schema)
    }
}

/// Convert a JSON Schema string to a regex using the default whitespace.
pub fn schema_str_to_regex(schema: &str) -> Result<String> {
    let schema: Value = serde_json::from_str(schema).map_err(|e| {
        BridleError::GrammarSpecification(format!("invalid JSON schema: {e}"))
    })?;
    JsonSchemaTranslator.schema_to_regex(&schema, None)
}

fn invalid(msg: impl Into<String>) -> BridleError {
    BridleError::GrammarSpecification(msg.into())
}

struct SchemaRegex<'a> {
    ws: &'a str,
}

impl SchemaRegex<'_> {
    fn node(&self, schema: &Value) -> Result<String> {
        match schema {
            Value::Bool(true) => return Ok(self.any_value()),
            Value::Bool(false) => return Err(invalid("false schema rejects all values")),
            _ => {}
        }
        let obj = schema
            .as_object()
            .ok_or_else(|| invalid("schema must be an object or boolean"))?;

        if obj.contains_key("$ref") {
            return Err(invalid("$ref is not supported; inline all definitions"));
        }
        if let Some(values) = obj.get("enum") {
            return self.enumeration(values);
        }
        if let Some(value) = obj.get("const") {
            return Ok(self.literal(value));
        }
        if let Some(members) = obj.get("anyOf").or_else(|| obj.get("oneOf")) {
            return self.alternatives(members, "anyOf/oneOf");
        }
        if let Some(first) = obj
            .get("allOf")
            .and_then(Value::as_array)
            .and_then(|members| members.first())
        {
            return self.node(first);
        }

        match obj.get("type") {
            Some(Value::String(name)) => self.typed(name, obj),
            Some(Value::Array(names)) => {
                let branches = names
                    .iter()
                    .map(|name| {
                        let name = name
                            .as_str()
                            .ok_or_else(|| invalid("`type` entries must be strings"))?;
                        self.typed(name, obj)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", branches.join("|")))
            }
            Some(other) => Err(invalid(format!("invalid `type` value: {other}"))),
            None if obj.contains_key("properties") => self.object(obj),
            None => Ok(self.any_value()),
        }
    }

    fn typed(&self, name: &str, obj: &Map<String, Value>) -> Result<String> {
        match name {
            "string" => self.string(obj),
            "integer" => Ok(INTEGER.to_string()),
            "number" => Ok(NUMBER.to_string()),
            "boolean" => Ok(BOOLEAN.to_string()),
            "null" => Ok(NULL.to_string()),
            "array" => self.array(obj),
            "object" => self.object(obj),
            other => Err(invalid(format!("unsupported JSON Schema type: {other}"))),
        }
    }

    fn string(&self, obj: &Map<String, Value>) -> Result<String> {
        if let Some(pattern) = obj.get("pattern").and_then(Value::as_str) {
            let inner = pattern.strip_prefix('^').unwrap_or(pattern);
            let inner = inner.strip_suffix('$').unwrap_or(inner);
            return Ok(format!(r#""(?:{inner})""#));
        }
        if let Some(format) = obj.get("format").and_then(Value::as_str) {
            let body = match format {
                "date-time" => format!("{DATE}T{TIME}"),
                "date" => DATE.to_string(),
                "time" => TIME.to_string(),
                "uuid" => UUID.to_string(),
                other => return Err(invalid(format!("unsupported string format: {other}"))),
            };
            return Ok(format!(r#""{body}""#));
        }

        let min_len = obj.get("minLength").and_then(Value::as_u64).unwrap_or(0);
        let max_len = obj.get("maxLength").and_then(Value::as_u64);
        let quantifier = match max_len {
            Some(max) if max < min_len => {
                return Err(invalid(format!(
                    "maxLength {max} is smaller than minLength {min_len}"
                )))
            }
            Some(max) => format!("{{{min_len},{max}}}"),
            None if min_len > 0 => format!("{{{min_len},}}"),
            None => "*".to_string(),
        };
        Ok(format!(r#""{STRING_INNER}{quantifier}""#))
    }

    fn array(&self, obj: &Map<String, Value>) -> Result<String> {
        let ws = self.ws;
        let item = match obj.get("items") {
            Some(items) => self.node(items)?,
            None => self.any_value(),
        };
        let next = format!("({ws},{ws}{item})");

        let min_items = obj.get("minItems").and_then(Value::as_u64).unwrap_or(0);
        let max_items = obj.get("maxItems").and_then(Value::as_u64);
        if let Some(max) = max_items {
            if max < min_items {
                return Err(invalid(format!(
                    "maxItems {max} is smaller than minItems {min_items}"
                )));
            }
            if max == 0 {
                return Ok(format!(r"\[{ws}\]"));
            }
        }

        let tail = match (min_items, max_items) {
            (0, None) | (1, None) => format!("{next}*"),
            (min, None) => format!("{next}{{{},}}", min - 1),
            (0, Some(max)) => format!("{next}{{0,{}}}", max - 1),
            (min, Some(max)) => format!("{next}{{{},{}}}", min - 1, max - 1),
        };
        if min_items == 0 {
            Ok(format!(r"\[{ws}({item}{tail})?{ws}\]"))
        } else {
            Ok(format!(r"\[{ws}{item}{tail}{ws}\]"))
        }
    }

    fn object(&self, obj: &Map<String, Value>) -> Result<String> {
        let ws = self.ws;
        let properties = match obj.get("properties").and_then(Value::as_object) {
            Some(props) if !props.is_empty() => props,
            _ => return Ok(self.free_object()),
        };
        let required: Vec<&str> = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut fields = Vec::with_capacity(properties.len());
        for (name, schema) in properties {
            let key = regex_syntax::escape(&Value::String(name.clone()).to_string());
            let value = self.node(schema)?;
            fields.push((required.contains(&name.as_str()), format!("{key}{ws}:{ws}{value}")));
        }
        let sep = format!("{ws},{ws}");

        let body = match fields.iter().rposition(|(req, _)| *req) {
            Some(last_required) => {
                let mut body = String::new();
                for (i, (req, field)) in fields.iter().enumerate() {
                    if i < last_required {
                        if *req {
                            body.push_str(&format!("{field}{sep}"));
                        } else {
                            body.push_str(&format!("({field}{sep})?"));
                        }
                    } else if i == last_required {
                        body.push_str(field);
                    } else {
                        body.push_str(&format!("({sep}{field})?"));
                    }
                }
                body
            }
            None => {
                // Every property optional: pick which one comes first.
                let starts: Vec<String> = (0..fields.len())
                    .map(|first| {
                        let rest: String = fields[first + 1..]
                            .iter()
                            .map(|(_, field)| format!("({sep}{field})?"))
                            .collect();
                        format!("{}{rest}", fields[first].1)
                    })
                    .collect();
                format!("({})?", starts.join("|"))
            }
        };
        Ok(format!(r"\{{{ws}{body}{ws}\}}"))
    }

    fn free_object(&self) -> String {
        let ws = self.ws;
        let member = format!(r#""{STRING_INNER}*"{ws}:{ws}{}"#, self.any_value());
        format!(r"\{{{ws}({member}({ws},{ws}{member})*)?{ws}\}}")
    }

    fn enumeration(&self, values: &Value) -> Result<String> {
        let values = values
            .as_array()
            .ok_or_else(|| invalid("enum must be an array"))?;
        if values.is_empty() {
            return Err(invalid("enum must not be empty"));
        }
        let branches: Vec<String> = values.iter().map(|v| self.literal(v)).collect();
        Ok(format!("({})", branches.join("|")))
    }

    fn alternatives(&self, members: &Value, keyword: &str) -> Result<String> {
        let members = members
            .as_array()
            .ok_or_else(|| invalid(format!("{keyword} must be an array")))?;
        let branches = members
            .iter()
            .map(|member| self.node(member))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("({})", branches.join("|")))
    }

    /// Regex matching exactly `value`, with flexible whitespace inside
    /// arrays and objects.
    fn literal(&self, value: &Value) -> String {
        let ws = self.ws;
        match value {
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(|v| self.literal(v)).collect();
                format!(r"\[{ws}{}{ws}\]", items.join(&format!("{ws},{ws}")))
            }
            Value::Object(members) => {
                let members: Vec<String> = members
                    .iter()
                    .map(|(k, v)| {
                        let key = regex_syntax::escape(&Value::String(k.clone()).to_string());
                        format!("{key}{ws}:{ws}{}", self.literal(v))
                    })
                    .collect();
                format!(r"\{{{ws}{}{ws}\}}", members.join(&format!("{ws},{ws}")))
            }
            scalar => regex_syntax::escape(&scalar.to_string()),
        }
    }

    /// Any JSON value, approximated without recursion: containers match
    /// any text between their brackets.
    fn any_value(&self) -> String {
        format!(r#"("{STRING_INNER}*"|{NUMBER}|{BOOLEAN}|{NULL}|\[.*\]|\{{.*\}})"#)
    }
}
