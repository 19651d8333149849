use crate::sample::{Patch, TempDelta};
use crate::state::{ControlConstants, ControlSettings, ControlVariables, VersionInfo};
use crate::{Error, Result};

use super::{messages, SerialFrame};

/// Decode one newline-terminated line from the controller into a typed
/// frame. The first character is the tag; a single separator character and
/// the payload follow. Errors never carry partial state: the caller's
/// mirror is untouched unless a frame is returned.
pub fn decode_line(line: &str) -> Result<SerialFrame> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut chars = line.char_indices();
    let tag = match chars.next() {
        Some((_, c)) => c,
        None => return Err(Error::MalformedFrame("empty line".to_string())),
    };
    // Skip the one separator character; a bare tag has an empty payload.
    let payload = match chars.next() {
        Some((_, _)) => chars.next().map_or("", |(i, _)| &line[i..]),
        None => "",
    };

    match tag {
        'T' => Ok(SerialFrame::Temperature(parse_temp_delta(payload)?)),
        'D' => Ok(SerialFrame::Debug(messages::expand(payload))),
        'L' => Ok(SerialFrame::Display(parse_display(payload)?)),
        'C' => Ok(SerialFrame::Constants(parse_json::<ControlConstants>('C', payload)?)),
        'S' => Ok(SerialFrame::Settings(parse_json::<ControlSettings>('S', payload)?)),
        'V' => Ok(SerialFrame::Variables(parse_json::<ControlVariables>('V', payload)?)),
        'N' => Ok(SerialFrame::Version(parse_version(payload))),
        'h' => Ok(SerialFrame::AvailableDevices(parse_json('h', payload)?)),
        'd' => Ok(SerialFrame::InstalledDevices(parse_json('d', payload)?)),
        'U' => Ok(SerialFrame::DeviceUpdateAck(payload.to_string())),
        other => Err(Error::UnknownFrameTag(other)),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(tag: char, payload: &str) -> Result<T> {
    serde_json::from_str(payload)
        .map_err(|e| Error::PayloadDecode(format!("'{tag}' payload: {e}")))
}

fn parse_display(payload: &str) -> Result<[String; 4]> {
    // The controller sends a raw degree sign; presentation layers want the
    // entity form.
    let replaced = payload.replace('\u{00b0}', "&deg");
    let lines: Vec<String> = serde_json::from_str(&replaced)
        .map_err(|e| Error::PayloadDecode(format!("'L' payload: {e}")))?;
    lines
        .try_into()
        .map_err(|v: Vec<String>| {
            Error::PayloadDecode(format!("'L' payload: expected 4 lines, got {}", v.len()))
        })
}

fn parse_version(payload: &str) -> VersionInfo {
    // Informational frame: an undecodable banner is kept raw, never an error.
    let mut info: VersionInfo = serde_json::from_str(payload).unwrap_or_default();
    info.raw = payload.to_string();
    info
}

/// Parse a `T` payload. The controller writes relaxed key:value pairs
/// (`t:1234,bt:20.1`); newer firmware quotes keys and braces the object.
/// Both forms are accepted.
fn parse_temp_delta(payload: &str) -> Result<TempDelta> {
    let inner = payload
        .trim()
        .strip_prefix('{')
        .map_or(payload.trim(), |rest| rest.trim_end_matches('}'))
        .trim();
    if inner.is_empty() {
        return Err(Error::PayloadDecode("empty temperature payload".to_string()));
    }

    let mut delta = TempDelta::default();
    for pair in split_pairs(inner) {
        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| Error::PayloadDecode(format!("temperature field '{pair}' has no value")))?;
        let key = key.trim().trim_matches('"');
        let value = value.trim();
        match key {
            "t" => delta.time = number_patch(key, value)?,
            "bt" => delta.beer_temp = number_patch(key, value)?,
            "bs" => delta.beer_set = number_patch(key, value)?,
            "ba" => delta.beer_ann = text_patch(value),
            "ft" => delta.fridge_temp = number_patch(key, value)?,
            "fs" => delta.fridge_set = number_patch(key, value)?,
            "fa" => delta.fridge_ann = text_patch(value),
            "rt" => delta.room_temp = number_patch(key, value)?,
            "s" => delta.state = state_patch(key, value)?,
            // Unknown fields from newer firmware are skipped, not fatal.
            _ => {}
        }
    }
    Ok(delta)
}

/// Split on commas outside double quotes; annotations may contain commas.
fn split_pairs(s: &str) -> Vec<&str> {
    let mut pairs = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                pairs.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pairs.push(&s[start..]);
    pairs
}

fn is_null(value: &str) -> bool {
    value == "null" || value == "None"
}

fn number_patch(key: &str, value: &str) -> Result<Patch<f64>> {
    if is_null(value) {
        return Ok(Patch::Cleared);
    }
    value
        .trim_matches('"')
        .parse::<f64>()
        .map(Patch::Set)
        .map_err(|_| Error::PayloadDecode(format!("field '{key}': expected number, got '{value}'")))
}

fn state_patch(key: &str, value: &str) -> Result<Patch<i64>> {
    match number_patch(key, value)? {
        Patch::Set(v) => Ok(Patch::Set(v as i64)),
        Patch::Cleared => Ok(Patch::Cleared),
        Patch::Unchanged => Ok(Patch::Unchanged),
    }
}

fn text_patch(value: &str) -> Patch<String> {
    if is_null(value) {
        Patch::Cleared
    } else {
        Patch::Set(value.trim_matches('"').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Mode;

    #[test]
    fn bare_temperature_pairs_decode() {
        let frame = decode_line("T t:1234,bt:20.1,bs:20.0,s:0").unwrap();
        let delta = match frame {
            SerialFrame::Temperature(delta) => delta,
            other => panic!("expected temperature frame, got {other:?}"),
        };
        assert_eq!(delta.time, Patch::Set(1234.0));
        assert_eq!(delta.beer_temp, Patch::Set(20.1));
        assert_eq!(delta.beer_set, Patch::Set(20.0));
        assert_eq!(delta.state, Patch::Set(0));
        assert_eq!(delta.fridge_temp, Patch::Unchanged);
        assert_eq!(delta.room_temp, Patch::Unchanged);
    }

    #[test]
    fn braced_and_quoted_temperature_decodes() {
        let frame =
            decode_line(r#"T:{"bt":19.8,"ba":"low filter, settling","rt":null}"#).unwrap();
        let delta = match frame {
            SerialFrame::Temperature(delta) => delta,
            other => panic!("expected temperature frame, got {other:?}"),
        };
        assert_eq!(delta.beer_temp, Patch::Set(19.8));
        assert_eq!(delta.beer_ann, Patch::Set("low filter, settling".to_string()));
        assert_eq!(delta.room_temp, Patch::Cleared);
    }

    #[test]
    fn empty_line_is_malformed() {
        assert!(matches!(decode_line(""), Err(Error::MalformedFrame(_))));
        assert!(matches!(decode_line("\r\n"), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn unknown_tag_is_reported() {
        assert!(matches!(decode_line("X whatever"), Err(Error::UnknownFrameTag('X'))));
    }

    #[test]
    fn truncated_payloads_fail_to_decode() {
        assert!(matches!(decode_line("T "), Err(Error::PayloadDecode(_))));
        assert!(matches!(decode_line("T bt:abc"), Err(Error::PayloadDecode(_))));
        assert!(matches!(decode_line("C {\"Kp\":"), Err(Error::PayloadDecode(_))));
        assert!(matches!(decode_line("L [\"a\",\"b\"]"), Err(Error::PayloadDecode(_))));
    }

    #[test]
    fn settings_snapshot_decodes() {
        let frame = decode_line(r#"S:{"mode":"p","beerSet":18.0,"fridgeSet":17.2}"#).unwrap();
        match frame {
            SerialFrame::Settings(cs) => {
                assert_eq!(cs.mode, Mode::Profile);
                assert_eq!(cs.beer_set, 18.0);
                // missing keys fall back to the compiled-in defaults
                assert_eq!(cs.heat_estimator, 0.2);
            }
            other => panic!("expected settings frame, got {other:?}"),
        }
    }

    #[test]
    fn display_replaces_degree_sign() {
        let line = format!("L:[\"Mode   Off\",\"Beer   20.0 {}C\",\" \",\" \"]", '\u{00b0}');
        match decode_line(&line).unwrap() {
            SerialFrame::Display(lines) => {
                assert_eq!(lines[1], "Beer   20.0 &degC");
                assert_eq!(lines.len(), 4);
            }
            other => panic!("expected display frame, got {other:?}"),
        }
    }

    #[test]
    fn inventory_frames_decode_to_opaque_objects() {
        match decode_line(r#"d:[{"i":0,"t":1,"c":1,"b":0}]"#).unwrap() {
            SerialFrame::InstalledDevices(devices) => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0]["i"], 0);
            }
            other => panic!("expected installed devices, got {other:?}"),
        }
        match decode_line("h:[]").unwrap() {
            SerialFrame::AvailableDevices(devices) => assert!(devices.is_empty()),
            other => panic!("expected available devices, got {other:?}"),
        }
    }

    #[test]
    fn version_banner_never_errors() {
        match decode_line(r#"N:{"v":"0.2.4","b":"uno"}"#).unwrap() {
            SerialFrame::Version(info) => assert_eq!(info.version.as_deref(), Some("0.2.4")),
            other => panic!("expected version frame, got {other:?}"),
        }
        match decode_line("N:garbage").unwrap() {
            SerialFrame::Version(info) => {
                assert_eq!(info.version, None);
                assert_eq!(info.raw, "garbage");
            }
            other => panic!("expected version frame, got {other:?}"),
        }
    }

    #[test]
    fn update_ack_carries_payload() {
        match decode_line("U:{\"i\":2}").unwrap() {
            SerialFrame::DeviceUpdateAck(ack) => assert_eq!(ack, "{\"i\":2}"),
            other => panic!("expected update ack, got {other:?}"),
        }
    }
}
