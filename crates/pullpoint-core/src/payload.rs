// ── Event payload extraction ──
//
// Protocol libraries hand notification messages over as loosely shaped
// JSON (an xml2js-style rendering of the SOAP body, attributes under `$`,
// text under `_`). Everything that knows about that shape lives here.

use serde_json::Value;

/// Accept a message either as structured JSON or as a JSON string.
pub fn parse_message(value: &Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(text) => serde_json::from_str(text),
        other => Ok(other.clone()),
    }
}

/// Topic path of a notification (`topic._`, or a bare string `topic`).
pub fn extract_topic(message: &Value) -> Option<&str> {
    let topic = message.get("topic")?;
    topic
        .get("_")
        .and_then(Value::as_str)
        .or_else(|| topic.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Boolean state carried by a notification.
///
/// Looks at `message.data.simpleItem` first and one `message` level deeper
/// second. `None` when neither carries a value.
pub fn extract_state(message: &Value) -> Option<bool> {
    let outer = message.get("message")?;
    simple_item_value(outer)
        .or_else(|| outer.get("message").and_then(simple_item_value))
        .map(truthy)
}

fn simple_item_value(message: &Value) -> Option<&Value> {
    let item = message.get("data")?.get("simpleItem")?;
    match item {
        Value::Array(items) => items.iter().find_map(item_value),
        other => item_value(other),
    }
}

fn item_value(item: &Value) -> Option<&Value> {
    item.get("$")?.get("Value")
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}
