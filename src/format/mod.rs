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

//! Content-type plumbing: header parsing, byte sniffing, the mime to file
//! extension table and charset decoding of text payloads.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use file_format::FileFormat;
use mime::Mime;
use std::str::FromStr;

/// Parses a `Content-Type` header value up to the first `;`.
pub fn parse_content_type(value: &str) -> Option<Mime> {
    let essence = value.split(';').next()?.trim();
    if essence.is_empty() {
        return None;
    }
    Mime::from_str(value).or_else(|_| Mime::from_str(essence)).ok()
}

/// True when the declared type is useless and the bytes have to speak.
pub fn needs_sniffing(declared: Option<&str>) -> bool {
    match declared {
        None | Some("") => true,
        Some("binary/octet-stream") => true,
        Some(_) => false,
    }
}

/// Detects a content type from a body prefix.
///
/// Markup gets a cheap look first since [`FileFormat`] resolves unknown text
/// to plain text, then the magic-number tables take over.
pub fn sniff(prefix: &[u8]) -> Mime {
    let text = String::from_utf8_lossy(&prefix[..prefix.len().min(1024)]);
    let trimmed = text.trim_start_matches(['\u{feff}', ' ', '\t', '\r', '\n']);
    if trimmed.starts_with('<') {
        if trimmed[1..].starts_with("?xml") {
            if trimmed.contains("<svg") {
                return "image/svg+xml".parse().unwrap();
            }
            return mime::TEXT_XML;
        }
        let rest = trimmed[1..].as_bytes();
        if rest.len() >= 3 && rest[..3].eq_ignore_ascii_case(b"svg") {
            return "image/svg+xml".parse().unwrap();
        }
        return mime::TEXT_HTML;
    }
    let format = FileFormat::from_bytes(prefix);
    Mime::from_str(format.media_type()).unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// Maps a mime type to the extension used in resource names.
///
/// `.bin` is the fallback for everything unknown.
pub fn extension_for(mime: &Mime) -> &'static str {
    match mime.essence_str() {
        "text/html" | "application/xhtml+xml" => ".html",
        "text/css" => ".css",
        "text/plain" => ".txt",
        "text/xml" | "application/xml" => ".xml",
        "application/javascript" | "text/javascript" => ".js",
        "application/json" | "application/ld+json" => ".json",
        "application/pdf" => ".pdf",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/avif" => ".avif",
        "image/svg+xml" => ".svg",
        "image/bmp" => ".bmp",
        "image/tiff" => ".tiff",
        "image/vnd.microsoft.icon" | "image/x-icon" => ".ico",
        "font/woff" | "application/font-woff" => ".woff",
        "font/woff2" => ".woff2",
        "font/ttf" | "application/x-font-ttf" => ".ttf",
        "font/otf" => ".otf",
        "application/vnd.ms-fontobject" => ".eot",
        "audio/mpeg" => ".mp3",
        "audio/ogg" => ".oga",
        "audio/wav" | "audio/x-wav" => ".wav",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/ogg" => ".ogv",
        _ => ".bin",
    }
}

/// Download priority of image formats, best first. Anything absent sorts
/// last.
const IMAGE_PRIORITY: [&str; 8] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/vnd.microsoft.icon",
    "image/x-icon",
    "image/bmp",
    "image/tiff",
];

/// The rank of an image type in the preference order, lower is better.
pub fn image_priority(essence: &str) -> usize {
    IMAGE_PRIORITY
        .iter()
        .position(|candidate| *candidate == essence)
        .unwrap_or(IMAGE_PRIORITY.len())
}

/// Whether a `<source type="...">` value names an image we can archive.
pub fn is_supported_image(essence: &str) -> bool {
    essence == "image/svg+xml" || essence == "image/avif" || image_priority(essence) < IMAGE_PRIORITY.len()
}

pub fn is_html(mime: &Mime) -> bool {
    matches!(mime.essence_str(), "text/html" | "application/xhtml+xml")
}

/// Decodes a text payload to utf-8: BOM first, then the charset parameter,
/// then a `<meta charset>` found in the prefix, then a chardetng guess.
pub fn decode_text(bytes: &[u8], content_type: Option<&Mime>) -> String {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding.decode(bytes).0.into_owned();
    }
    if let Some(label) = content_type.and_then(|m| m.get_param(mime::CHARSET)) {
        if let Some(encoding) = Encoding::for_label(label.as_str().as_bytes()) {
            return encoding.decode(bytes).0.into_owned();
        }
    }
    if let Some(encoding) = meta_charset(&bytes[..bytes.len().min(2048)]) {
        return encoding.decode(bytes).0.into_owned();
    }
    let mut detector = EncodingDetector::new();
    detector.feed(&bytes[..bytes.len().min(8192)], bytes.len() <= 8192);
    detector.guess(None, true).decode(bytes).0.into_owned()
}

fn meta_charset(prefix: &[u8]) -> Option<&'static Encoding> {
    static META: std::sync::LazyLock<regex::bytes::Regex> = std::sync::LazyLock::new(|| {
        regex::bytes::Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-zA-Z0-9_\-]+)"#).unwrap()
    });
    let captures = META.captures(prefix)?;
    Encoding::for_label(captures.get(1)?.as_bytes())
}
