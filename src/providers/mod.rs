pub mod openai;

pub use openai::OpenAiProvider;

use crate::util::truncate_with_ellipsis;

/// Longest error-body excerpt carried into logs and error chains.
const MAX_API_ERROR_CHARS: usize = 300;

/// Build a truncated provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    anyhow::anyhow!(
        "{provider} API error ({status}): {}",
        truncate_with_ellipsis(&body, MAX_API_ERROR_CHARS)
    )
}
