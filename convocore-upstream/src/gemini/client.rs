use std::sync::LazyLock;

use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use snafu::{OptionExt, ResultExt};
use url::Url;

use super::error::{
    BadPartSnafu, BadResponseSnafu, ConstructUrlSnafu, DecodeResponseSnafu, DeserializeSnafu, Error,
    InvalidApiKeySnafu, PerformRequestNewSnafu, PerformRequestSnafu,
};
use super::model::{GenerateContentChunk, GenerateContentRequest};

static DEFAULT_BASE_URL: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://generativelanguage.googleapis.com/v1beta/")
        .expect("unreachable error: failed to parse default base URL")
});

/// A thin client for the Gemini Studio REST API, scoped to exactly the
/// surface `convocore-upstream` needs: single-shot and streamed
/// generation. Grounded on `adk-gemini::backend::studio::StudioBackend`.
pub struct GeminiClient {
    http: Client,
    base_url: Url,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: impl Into<String>) -> Result<Self, Error> {
        let headers = HeaderMap::from_iter([(
            HeaderName::from_static("x-goog-api-key"),
            HeaderValue::from_str(api_key).context(InvalidApiKeySnafu)?,
        )]);
        let http = Client::builder().default_headers(headers).build().context(PerformRequestNewSnafu)?;
        Ok(Self { http, base_url: DEFAULT_BASE_URL.clone(), model: model.into() })
    }

    /// Points the client at a non-default base URL. Used by this crate's
    /// own tests and by `convocore-pipeline`'s wiremock-backed integration
    /// tests; kept unconditionally `pub` rather than `#[cfg(test)]`-gated
    /// so a dependent crate's test target can resolve it (see
    /// `clock::test_support` for the same reasoning).
    pub fn with_base_url(api_key: &str, model: impl Into<String>, base_url: Url) -> Result<Self, Error> {
        let mut client = Self::new(api_key, model)?;
        client.base_url = base_url;
        Ok(client)
    }

    fn build_url(&self, endpoint: &str) -> Result<Url, Error> {
        let suffix = format!("models/{}:{}", self.model, endpoint);
        self.base_url.join(&suffix).context(ConstructUrlSnafu { suffix })
    }

    /// Single-shot, non-streamed generation. Used by the credential cache
    /// for the one-token semantic validation probe (spec.md §4.4).
    pub async fn generate_content(&self, request: &GenerateContentRequest) -> Result<GenerateContentChunk, Error> {
        let url = self.build_url("generateContent")?;
        let response = self.http.post(url.clone()).json(request).send().await.context(PerformRequestSnafu { url })?;
        let response = check_response(response).await?;
        response.json().await.context(DecodeResponseSnafu)
    }

    /// Streamed generation over server-sent events, yielding one chunk
    /// per event (spec.md §4.5 step 2).
    pub async fn generate_content_stream(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<BoxStream<'static, Result<GenerateContentChunk, Error>>, Error> {
        let mut url = self.build_url("streamGenerateContent")?;
        url.query_pairs_mut().append_pair("alt", "sse");

        let response =
            self.http.post(url.clone()).json(request).send().await.context(PerformRequestSnafu { url })?;
        let response = check_response(response).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .map(|event| event.context(BadPartSnafu))
            .map_ok(|event| serde_json::from_str::<GenerateContentChunk>(&event.data).context(DeserializeSnafu))
            .map(|result| result.flatten());

        Ok(Box::pin(stream))
    }
}

async fn check_response(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let description = response.text().await.ok();
        BadResponseSnafu { code: status.as_u16(), description }.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::model::{WireContent, WirePart};
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![WireContent { role: "user".to_string(), parts: vec![WirePart::Text { text: "hi".to_string() }] }],
        }
    }

    #[tokio::test]
    async fn generate_content_parses_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r".*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "hello"}]}, "finishReason": "STOP"}]
            })))
            .mount(&server)
            .await;

        let client =
            GeminiClient::with_base_url("AIzatest", "gemini-2.5-flash", Url::parse(&server.uri()).unwrap().join("/v1beta/").unwrap())
                .unwrap();
        let chunk = client.generate_content(&request()).await.unwrap();
        assert_eq!(chunk.text(), "hello");
        assert_eq!(chunk.finish_reason(), Some("STOP"));
    }

    #[tokio::test]
    async fn auth_failure_is_detected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r".*:generateContent"))
            .respond_with(ResponseTemplate::new(401).set_body_string("API_KEY_INVALID"))
            .mount(&server)
            .await;

        let client =
            GeminiClient::with_base_url("AIzatest", "gemini-2.5-flash", Url::parse(&server.uri()).unwrap().join("/v1beta/").unwrap())
                .unwrap();
        let err = client.generate_content(&request()).await.unwrap_err();
        assert!(err.is_auth_failure());
    }
}
