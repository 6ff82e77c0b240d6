// Copyright 2025 The caddis authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `data:` uris decode locally into a synthetic http response, so the rest
//! of the archiver never has to care where bytes came from.
//!
//! Grammar: `data:[<mediatype>][;base64],<payload>`.

use crate::client::Response;
use bytes::Bytes;
use data_encoding::{BASE64, BASE64_NOPAD};
use percent_encoding::percent_decode_str;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataUriError {
    #[error("not a data: uri")]
    NotDataUri,
    #[error("data: uri has no comma separator")]
    MissingPayload,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] data_encoding::DecodeError),
}

/// Builds a `data:` uri from a mime type and raw bytes.
pub fn encode(content_type: &str, body: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, BASE64.encode(body))
}

/// Decodes a `data:` uri into a synthetic 200 response carrying the
/// embedded payload and its declared content type.
pub fn decode(uri: &str) -> Result<Response, DataUriError> {
    let rest = uri.strip_prefix("data:").ok_or(DataUriError::NotDataUri)?;
    let (head, payload) = rest.split_once(',').ok_or(DataUriError::MissingPayload)?;

    let (media_type, is_base64) = match head.strip_suffix(";base64") {
        Some(media_type) => (media_type, true),
        None => (head, false),
    };
    let media_type = if media_type.is_empty() {
        "text/plain"
    } else {
        media_type
    };

    let body = if is_base64 {
        let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let decoded = BASE64
            .decode(payload.as_bytes())
            .or_else(|_| BASE64_NOPAD.decode(payload.trim_end_matches('=').as_bytes()))?;
        Bytes::from(decoded)
    } else {
        Bytes::from(percent_decode_str(payload).collect::<Vec<u8>>())
    };

    Ok(Response::synthetic(media_type, body))
}
