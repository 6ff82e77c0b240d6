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

//! Hand-rolled image headers for tests; just enough bytes for the
//! dimension probe and the magic-number sniffer to agree with the test.

/// A png signature plus IHDR chunk.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}

/// A jpeg with a single SOF0 segment.
pub fn jpeg_bytes(width: u16, height: u16) -> Vec<u8> {
    let mut bytes = vec![0xff, 0xd8];
    bytes.extend_from_slice(&[0xff, 0xc0, 0x00, 0x11, 0x08]);
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.push(0x03);
    for component in 1..=3u8 {
        bytes.extend_from_slice(&[component, 0x11, 0x00]);
    }
    bytes.extend_from_slice(&[0xff, 0xd9]);
    bytes
}

/// A webp with an extended (VP8X) header.
pub fn webp_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&22u32.to_le_bytes());
    bytes.extend_from_slice(b"WEBP");
    bytes.extend_from_slice(b"VP8X");
    bytes.extend_from_slice(&10u32.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
    bytes.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
    bytes
}

/// A gif89a logical screen descriptor.
pub fn gif_bytes(width: u16, height: u16) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"GIF89a");
    bytes.extend_from_slice(&width.to_le_bytes());
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes.extend_from_slice(&[0x00, 0x00, 0x00]);
    bytes
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn probes_agree_with_builders() {
        let size = imagesize::blob_size(&png_bytes(100, 50)).unwrap();
        assert_eq!((size.width, size.height), (100, 50));
        let size = imagesize::blob_size(&jpeg_bytes(1600, 900)).unwrap();
        assert_eq!((size.width, size.height), (1600, 900));
        let size = imagesize::blob_size(&webp_bytes(1600, 900)).unwrap();
        assert_eq!((size.width, size.height), (1600, 900));
        let size = imagesize::blob_size(&gif_bytes(4, 2)).unwrap();
        assert_eq!((size.width, size.height), (4, 2));
    }
}
