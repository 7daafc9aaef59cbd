// Lenient JSON recovery for collaborator responses, which may wrap the
// object in Markdown fences or surround it with prose.

use serde::de::DeserializeOwned;
use smbsignal_common::SmbSignalError;

/// Remove a surrounding Markdown code fence (with optional language tag).
pub fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a JSON object out of collaborator text: as-is after fence
/// stripping, else the outermost `{...}` span.
pub fn parse_json_object<T: DeserializeOwned>(raw: &str) -> Result<T, SmbSignalError> {
    let text = strip_code_fence(raw);
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
                return Err(SmbSignalError::Parse(format!("no JSON object found: {first_err}")));
            };
            if end <= start {
                return Err(SmbSignalError::Parse(format!("no JSON object found: {first_err}")));
            }
            serde_json::from_str(&text[start..=end])
                .map_err(|e| SmbSignalError::Parse(format!("malformed JSON object: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn plain_object() {
        let v: Value = parse_json_object(r#"{"signals": []}"#).unwrap();
        assert!(v["signals"].as_array().unwrap().is_empty());
    }

    #[test]
    fn fenced_object() {
        let raw = "```json\n{\"signals\": [1]}\n```";
        let v: Value = parse_json_object(raw).unwrap();
        assert_eq!(v["signals"][0], 1);
    }

    #[test]
    fn object_inside_prose() {
        let raw = "Here you go:\n{\"new_keywords\": []}\nHope this helps!";
        let v: Value = parse_json_object(raw).unwrap();
        assert!(v.get("new_keywords").is_some());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_json_object::<Value>("I could not find anything").unwrap_err();
        assert!(matches!(err, SmbSignalError::Parse(_)));
        let err = parse_json_object::<Value>("} broken {").unwrap_err();
        assert!(matches!(err, SmbSignalError::Parse(_)));
    }
}
