// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use bytes::Bytes;

use crate::error::FeedError;
use crate::http::HttpClient;

/// Fetch raw feed bytes from a URL (without parsing).
///
/// Transport failure and a non-2xx status are distinct errors so the
/// caller can report them as different refresh outcomes.
pub async fn fetch_feed_bytes<C: HttpClient>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<Bytes, FeedError> {
    let response = client
        .get_bytes(url, timeout)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !(200..300).contains(&response.status) {
        return Err(FeedError::FetchStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(response.body)
}
