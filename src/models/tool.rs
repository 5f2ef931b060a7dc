use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ToolError, ToolResult};

/// A tool the model may call during an agent loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON-schema-shaped spec for the accepted arguments
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Checked at registration: the schema must be an object schema with a
    /// properties map, since that is the only shape every backend accepts.
    pub fn validate_schema(&self) -> ToolResult<()> {
        let schema = self.input_schema.as_object().ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "schema for '{}' must be a JSON object",
                self.name
            ))
        })?;

        if schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(ToolError::InvalidArguments(format!(
                "schema for '{}' must declare \"type\": \"object\"",
                self.name
            )));
        }
        if !schema.get("properties").map_or(false, Value::is_object) {
            return Err(ToolError::InvalidArguments(format!(
                "schema for '{}' must carry a \"properties\" object",
                self.name
            )));
        }

        Ok(())
    }

    /// Checked at call time: the argument map must carry every property the
    /// schema marks as required.
    pub fn check_arguments(&self, arguments: &Value) -> ToolResult<()> {
        let args = arguments.as_object().ok_or_else(|| {
            ToolError::InvalidArguments("arguments must be a JSON object".to_string())
        })?;

        if let Some(required) = self.input_schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !args.contains_key(key) {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required argument '{}'",
                        key
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A concrete call emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Backend-assigned id tying the result message back to this call
    pub id: String,
    /// The name of the tool to execute
    pub name: String,
    /// The resolved argument map
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<I, N>(id: I, name: N, arguments: Value) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_tool() -> ToolDefinition {
        ToolDefinition::new(
            "get_weather",
            "Gets the current weather for a location",
            json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city and state, e.g. New York, NY"
                    }
                },
                "required": ["location"]
            }),
        )
    }

    #[test]
    fn valid_schema_passes() {
        assert!(weather_tool().validate_schema().is_ok());
    }

    #[test]
    fn schema_must_be_an_object_schema() {
        let tool = ToolDefinition::new("bad", "wrong shape", json!({"type": "string"}));
        assert!(matches!(
            tool.validate_schema(),
            Err(ToolError::InvalidArguments(_))
        ));

        let tool = ToolDefinition::new("bad", "not even an object", json!([1, 2]));
        assert!(tool.validate_schema().is_err());
    }

    #[test]
    fn schema_requires_properties_map() {
        let tool = ToolDefinition::new("bad", "no properties", json!({"type": "object"}));
        assert!(tool.validate_schema().is_err());
    }

    #[test]
    fn arguments_checked_against_required_list() {
        let tool = weather_tool();
        assert!(tool
            .check_arguments(&json!({"location": "San Francisco, CA"}))
            .is_ok());

        let missing = tool.check_arguments(&json!({}));
        assert!(matches!(missing, Err(ToolError::InvalidArguments(msg)) if msg.contains("location")));

        let not_a_map = tool.check_arguments(&json!("location=SF"));
        assert!(not_a_map.is_err());
    }
}
