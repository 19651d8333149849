use serde::Deserialize;
use serde_json::Value;

/// Version of the local message table; the controller reports its own in
/// the version banner so a mismatch can be flagged at startup.
pub const TABLE_VERSION: i64 = 1;

/// Numeric debug frames from the controller, expanded against the firmware
/// message table. The table ships with the firmware; ids it does not cover
/// are rendered generically so an out-of-date copy never breaks decoding.
const MESSAGE_TABLE: &[(u32, &str)] = &[
    (0, "unknown controller error {}"),
    (1, "could not open device slot {}"),
    (2, "device slot {} is empty"),
    (3, "one-wire bus error on pin {}"),
    (4, "temperature sensor {} disconnected"),
    (5, "temperature sensor {} reconnected"),
    (6, "setpoint {} rejected as out of range"),
    (7, "EEPROM settings restored"),
    (8, "EEPROM settings reset to defaults"),
    (9, "device {} installed in slot {}"),
    (10, "device {} removed from slot {}"),
    (11, "peak detect: heat estimator adjusted to {}"),
    (12, "peak detect: cool estimator adjusted to {}"),
    (13, "display init failed"),
];

#[derive(Debug, Deserialize)]
struct DebugPayload {
    #[serde(rename = "logType", default)]
    log_type: Option<String>,
    #[serde(rename = "logID")]
    log_id: Option<u32>,
    #[serde(rename = "V", default)]
    values: Vec<Value>,
}

/// Expand a `D` payload into operator-readable text. Never fails: payloads
/// that don't match the expected shape are passed through verbatim.
pub fn expand(payload: &str) -> String {
    let decoded: DebugPayload = match serde_json::from_str(payload) {
        Ok(decoded) => decoded,
        Err(_) => return payload.to_string(),
    };
    let Some(id) = decoded.log_id else {
        return payload.to_string();
    };

    let body = match MESSAGE_TABLE.iter().find(|(msg_id, _)| *msg_id == id) {
        Some((_, template)) => fill(template, &decoded.values),
        None => format!("log message {id} {}", render_args(&decoded.values)),
    };
    match decoded.log_type.as_deref() {
        Some("E") => format!("ERROR: {body}"),
        Some("W") => format!("WARNING: {body}"),
        _ => body,
    }
}

fn fill(template: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = values.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(value) => out.push_str(&render_arg(value)),
            None => out.push_str("?"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

fn render_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_args(values: &[Value]) -> String {
    let rendered: Vec<String> = values.iter().map(render_arg).collect();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_id_fills_placeholders() {
        let expanded = expand(r#"{"logType":"W","logID":4,"V":[2]}"#);
        assert_eq!(expanded, "WARNING: temperature sensor 2 disconnected");
    }

    #[test]
    fn unknown_id_renders_generically() {
        let expanded = expand(r#"{"logType":"E","logID":99,"V":["x",1]}"#);
        assert_eq!(expanded, "ERROR: log message 99 [x, 1]");
    }

    #[test]
    fn missing_args_do_not_panic() {
        let expanded = expand(r#"{"logID":9,"V":[7]}"#);
        assert_eq!(expanded, "device 7 installed in slot ?");
    }

    #[test]
    fn non_json_payload_passes_through() {
        assert_eq!(expand("plain text warning"), "plain text warning");
    }
}
