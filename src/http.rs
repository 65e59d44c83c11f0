//! Shared HTTP client for every upstream service.

use std::time::Duration;

use reqwest::{header, Client};

use crate::error::Result;

/// JSON client with a request timeout. Cheap to clone; clones share the
/// connection pool.
pub fn json_client(timeout: Duration) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    Ok(Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()?)
}
