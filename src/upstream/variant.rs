use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which upstream capability a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiVariant {
    /// Text generation, `POST /v1/chat/completions`.
    Completions,
    /// Image generation, `POST /v1/images/generations`.
    Generations,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

impl ApiVariant {
    pub fn path(self) -> &'static str {
        match self {
            ApiVariant::Completions => "/v1/chat/completions",
            ApiVariant::Generations => "/v1/images/generations",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApiVariant::Completions => "completions",
            ApiVariant::Generations => "generations",
        }
    }

    /// JSON path of the extracted field, for error messages.
    fn field(self) -> &'static str {
        match self {
            ApiVariant::Completions => "choices[0].message.content",
            ApiVariant::Generations => "data[0].url",
        }
    }

    /// Pull the designated field out of a successful upstream body.
    ///
    /// A body that does not parse, or parses without the field, is a
    /// [`Error::MalformedResponse`] carrying the upstream `status`.
    pub fn extract(self, status: u16, body: &[u8]) -> Result<String> {
        let malformed = |detail: String| Error::MalformedResponse { status, detail };

        let found = match self {
            ApiVariant::Completions => {
                let parsed: ChatCompletionResponse = serde_json::from_slice(body)
                    .map_err(|e| malformed(format!("invalid completion body: {}", e)))?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message)
                    .and_then(|m| m.content)
            }
            ApiVariant::Generations => {
                let parsed: ImageGenerationResponse = serde_json::from_slice(body)
                    .map_err(|e| malformed(format!("invalid image body: {}", e)))?;
                parsed.data.into_iter().next().and_then(|d| d.url)
            }
        };

        found.ok_or_else(|| malformed(format!("missing field {}", self.field())))
    }
}

impl fmt::Display for ApiVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_extracts_first_choice_content() {
        let body = br#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}, "finish_reason": "stop"}
            ]
        }"#;
        assert_eq!(ApiVariant::Completions.extract(200, body).unwrap(), "hello");
    }

    #[test]
    fn generations_extracts_first_url() {
        let body = br#"{"created": 1, "data": [{"url": "https://img/1.png", "revised_prompt": "x"}]}"#;
        assert_eq!(
            ApiVariant::Generations.extract(200, body).unwrap(),
            "https://img/1.png"
        );
    }

    #[test]
    fn empty_choices_is_malformed() {
        let err = ApiVariant::Completions
            .extract(200, br#"{"choices": []}"#)
            .unwrap_err();
        match err {
            Error::MalformedResponse { status, detail } => {
                assert_eq!(status, 200);
                assert!(detail.contains("choices[0].message.content"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn null_content_is_malformed() {
        let body = br#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        assert!(matches!(
            ApiVariant::Completions.extract(200, body),
            Err(Error::MalformedResponse { .. })
        ));
    }

    #[test]
    fn non_json_body_is_malformed() {
        assert!(matches!(
            ApiVariant::Generations.extract(201, b"<html>oops</html>"),
            Err(Error::MalformedResponse { status: 201, .. })
        ));
    }

    #[test]
    fn paths_match_upstream_routes() {
        assert_eq!(ApiVariant::Completions.path(), "/v1/chat/completions");
        assert_eq!(ApiVariant::Generations.path(), "/v1/images/generations");
        assert_eq!(ApiVariant::Generations.to_string(), "generations");
    }
}
