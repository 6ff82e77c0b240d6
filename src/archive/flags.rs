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

use bitflags::bitflags;

bitflags! {
    /// Selects which resource categories an archival run keeps.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct ArchiveFlags: u16 {
        /// Keep stylesheets and inline styles, and archive what they reference.
        const CSS = 1 << 0;
        /// Keep `<object>`, `<embed>` and `<iframe>` elements.
        const EMBEDS = 1 << 1;
        /// Keep scripts, inline handlers and `javascript:` links.
        const JS = 1 << 2;
        /// Keep `<video>` and `<audio>` elements.
        const MEDIA = 1 << 3;
        /// Keep images and icon links.
        const IMAGES = 1 << 4;
        /// Archive fonts referenced from `@font-face` rules.
        const FONTS = 1 << 5;
        /// Keep `data-*` attributes on the way out.
        const DATA_ATTRIBUTES = 1 << 6;
        /// Collapse `<picture>`/`srcset` sets to the single best image.
        const BEST_IMAGE = 1 << 7;
    }
}

impl Default for ArchiveFlags {
    fn default() -> Self {
        ArchiveFlags::IMAGES | ArchiveFlags::EMBEDS
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_keeps_images_and_embeds() {
        let flags = ArchiveFlags::default();
        assert!(flags.contains(ArchiveFlags::IMAGES));
        assert!(flags.contains(ArchiveFlags::EMBEDS));
        assert!(!flags.contains(ArchiveFlags::JS));
    }
}
