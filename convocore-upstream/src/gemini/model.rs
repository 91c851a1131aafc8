use serde::{Deserialize, Serialize};

/// One request content entry, in the provider's wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct WireContent {
    pub role: String,
    pub parts: Vec<WirePart>,
}

/// A single part of a wire content entry. Untagged so the three shapes
/// this crate speaks (`text`, `inlineData`, `functionResponse`) map
/// directly onto `convocore_core::MessagePart` without an adapter enum —
/// mirrors the teacher's `adk-core::types::Part` pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WirePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: WireInlineData,
    },
    #[serde(rename_all = "camelCase")]
    FunctionCall {
        function_call: WireFunctionCall,
    },
    #[serde(rename_all = "camelCase")]
    FunctionResponse {
        function_response: WireFunctionResponse,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<WireContent>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GenerateContentChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentChunk {
    /// Concatenated text of every `Text` part in the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        WirePart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.candidates.first().and_then(|c| c.finish_reason.as_deref())
    }

    pub fn function_calls(&self) -> Vec<WireFunctionCall> {
        self.candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        WirePart::FunctionCall { function_call } => Some(function_call.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Candidate {
    #[serde(default)]
    pub content: ResponseContent,
    #[serde(default, rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResponseContent {
    #[serde(default)]
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptFeedback {
    #[serde(default, rename = "blockReason")]
    pub block_reason: Option<String>,
}
