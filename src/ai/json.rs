use serde::de::DeserializeOwned;

use super::client::CompletionError;

/// Removes a surrounding Markdown code fence (```` ```json ```` or bare
/// ```` ``` ````) if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, CompletionError> {
    let body = strip_code_fences(raw);
    serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        CompletionError::Parse(format!("{e}; body starts with {preview:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Judgment {
        #[serde(rename = "isCorrect")]
        is_correct: bool,
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"isCorrect\": true}\n```";
        assert_eq!(strip_code_fences(raw), "{\"isCorrect\": true}");
        let parsed: Judgment = parse_model_json(raw).unwrap();
        assert!(parsed.is_correct);
    }

    #[test]
    fn strips_bare_fence_and_whitespace() {
        assert_eq!(strip_code_fences("  ```\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = parse_model_json::<Judgment>("not json").unwrap_err();
        assert_eq!(err.category(), "parse");
    }
}
