use regwatch_core::{Error, Result};
use std::time::Duration;

pub mod acquire;
pub mod dates;
pub mod normalize;
pub mod perplexity;
pub mod pipeline;
pub mod process;
pub mod prompts;
pub mod resolve;
pub mod verdict;

/// Client used for oracle API calls (no cookie jar needed there; the
/// acquisition engine builds its own via `acquire::build_client`).
pub fn default_api_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("regwatch/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Fetch(e.to_string()))
}
