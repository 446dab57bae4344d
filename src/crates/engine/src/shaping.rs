//! Response shaping
//!
//! A `ResponseSpec` pins the result to a fixed set of properties so the
//! returned shape does not drift with controller versions. Without a spec,
//! or with an empty property list, the body passes through untouched.

use definitions::{ResponseSpec, ResponseType};
use serde_json::{Map, Value};

/// Keep only `properties` of an object, filling missing ones with null
///
/// Non-object values are returned unchanged.
pub fn shape_object(properties: &[String], value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            let mut shaped = Map::new();
            for property in properties {
                let kept = map.remove(property).unwrap_or(Value::Null);
                shaped.insert(property.clone(), kept);
            }
            Value::Object(shaped)
        }
        other => other,
    }
}

/// Shape a response body according to `spec`
///
/// A body wrapping its payload in a `response` member is unwrapped first,
/// unless the spec itself lists `response`. For `array` specs each element
/// is shaped.
pub fn shape(spec: Option<&ResponseSpec>, body: Value) -> Value {
    let Some(spec) = spec else {
        return body;
    };
    if spec.properties.is_empty() {
        return body;
    }

    match spec.response_type {
        ResponseType::Object => match body {
            Value::Object(mut map) if is_envelope(&spec.properties, &map) => {
                let inner = map.remove("response").unwrap_or_default();
                shape_object(&spec.properties, inner)
            }
            other => shape_object(&spec.properties, other),
        },
        ResponseType::Array => {
            let items = match body {
                Value::Array(items) => items,
                Value::Object(mut map) => match map.remove("response") {
                    Some(Value::Array(items)) => items,
                    Some(other) => {
                        map.insert("response".to_string(), other);
                        return Value::Object(map);
                    }
                    None => return Value::Object(map),
                },
                other => return other,
            };
            Value::Array(
                items
                    .into_iter()
                    .map(|item| shape_object(&spec.properties, item))
                    .collect(),
            )
        }
    }
}

/// A `response` object member holds the payload unless the spec names it
fn is_envelope(properties: &[String], map: &Map<String, Value>) -> bool {
    !properties.iter().any(|p| p == "response")
        && map.get("response").map_or(false, Value::is_object)
}

/// Shape a single observed object with the properties of a read spec
pub fn shape_element(spec: Option<&ResponseSpec>, element: Value) -> Value {
    match spec {
        Some(spec) if !spec.properties.is_empty() => shape_object(&spec.properties, element),
        _ => element,
    }
}
