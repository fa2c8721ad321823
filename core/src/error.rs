use serde_json::Value;

/// Shown when a failure carries no extractable message at all.
pub const FALLBACK_MESSAGE: &str = "request failed, please retry later";

/// The recognized failure shapes, in precedence order. `classify`
/// walks them top to bottom and stops at the first match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureShape {
    /// Body `detail` is a non-blank string, used verbatim.
    DetailText(String),
    /// Body `detail` is an array; the extractable element messages.
    DetailList(Vec<String>),
    /// Body `detail` is a record with a non-blank `msg` string.
    DetailRecord(String),
    /// Body carries a non-blank top-level `message`.
    BodyMessage(String),
    /// No usable body; transport-level message (timeout, refused, HTTP
    /// status line).
    Transport(String),
    /// Any other error that still carries text.
    Generic(String),
    /// Nothing extractable.
    Opaque,
}

/// Reduce any failure to one non-empty display string. Total and pure.
pub fn normalize(body: Option<&Value>, transport: Option<&str>, generic: Option<&str>) -> String {
    render(&classify(body, transport, generic))
}

pub fn classify(body: Option<&Value>, transport: Option<&str>, generic: Option<&str>) -> FailureShape {
    if let Some(body) = body {
        if let Some(shape) = classify_detail(body.get("detail")) {
            return shape;
        }
        if let Some(message) = non_blank(body.get("message").and_then(Value::as_str)) {
            return FailureShape::BodyMessage(message);
        }
    }
    if let Some(message) = non_blank(transport) {
        return FailureShape::Transport(message);
    }
    if let Some(message) = non_blank(generic) {
        return FailureShape::Generic(message);
    }
    FailureShape::Opaque
}

pub fn render(shape: &FailureShape) -> String {
    match shape {
        FailureShape::DetailText(s)
        | FailureShape::DetailRecord(s)
        | FailureShape::BodyMessage(s)
        | FailureShape::Transport(s)
        | FailureShape::Generic(s) => s.clone(),
        FailureShape::DetailList(items) => items.join("; "),
        FailureShape::Opaque => FALLBACK_MESSAGE.to_string(),
    }
}

fn classify_detail(detail: Option<&Value>) -> Option<FailureShape> {
    match detail? {
        Value::String(s) if !s.trim().is_empty() => Some(FailureShape::DetailText(s.clone())),
        Value::Array(items) => {
            let messages: Vec<String> = items.iter().filter_map(element_message).collect();
            if messages.is_empty() {
                None
            } else {
                Some(FailureShape::DetailList(messages))
            }
        }
        Value::Object(map) => {
            let msg = map.get("msg").and_then(Value::as_str)?;
            if msg.trim().is_empty() {
                None
            } else {
                Some(FailureShape::DetailRecord(msg.to_string()))
            }
        }
        _ => None,
    }
}

// Array elements: a string is used as-is, a record contributes its
// `msg` string field, anything else contributes nothing.
fn element_message(item: &Value) -> Option<String> {
    let msg = match item {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("msg").and_then(Value::as_str).unwrap_or(""),
        _ => "",
    };
    if msg.is_empty() {
        None
    } else {
        Some(msg.to_string())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    let v = value?;
    if v.trim().is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detail_string_used_verbatim() {
        let body = json!({ "detail": "project not found" });
        assert_eq!(normalize(Some(&body), None, None), "project not found");
    }

    #[test]
    fn detail_array_joins_extractable_messages() {
        let body = json!({ "detail": ["a", { "msg": "b" }, {}, "c"] });
        assert_eq!(normalize(Some(&body), None, None), "a; b; c");
    }

    #[test]
    fn detail_record_uses_msg_field() {
        let body = json!({ "detail": { "msg": "boom" } });
        assert_eq!(normalize(Some(&body), None, None), "boom");
    }

    #[test]
    fn blank_detail_falls_through_to_message() {
        let body = json!({ "detail": "   ", "message": "field required" });
        assert_eq!(normalize(Some(&body), None, None), "field required");
    }

    #[test]
    fn unextractable_array_falls_through_to_message() {
        let body = json!({ "detail": [{}, 42, null], "message": "bad request" });
        assert_eq!(normalize(Some(&body), None, None), "bad request");
    }

    #[test]
    fn transport_message_without_body() {
        assert_eq!(normalize(None, Some("Network Error"), None), "Network Error");
    }

    #[test]
    fn generic_message_is_last_resort_before_fallback() {
        assert_eq!(normalize(None, None, Some("decode error")), "decode error");
    }

    #[test]
    fn fallback_when_nothing_extractable() {
        assert_eq!(normalize(None, None, None), FALLBACK_MESSAGE);
        assert_eq!(normalize(Some(&json!({})), Some("  "), Some("")), FALLBACK_MESSAGE);
    }

    #[test]
    fn classification_is_deterministic_and_ordered() {
        let body = json!({ "detail": "d", "message": "m" });
        assert_eq!(
            classify(Some(&body), Some("t"), Some("g")),
            FailureShape::DetailText("d".into())
        );
        let body = json!({ "message": "m" });
        assert_eq!(
            classify(Some(&body), Some("t"), Some("g")),
            FailureShape::BodyMessage("m".into())
        );
        assert_eq!(classify(None, Some("t"), Some("g")), FailureShape::Transport("t".into()));
        assert_eq!(classify(None, None, Some("g")), FailureShape::Generic("g".into()));
        assert_eq!(classify(None, None, None), FailureShape::Opaque);
    }

    #[test]
    fn output_is_never_empty() {
        let shapes = [
            normalize(Some(&json!({ "detail": [] })), None, None),
            normalize(Some(&json!({ "detail": 7 })), None, None),
            normalize(Some(&json!({ "message": "" })), None, None),
        ];
        for s in shapes {
            assert!(!s.is_empty());
        }
    }
}
