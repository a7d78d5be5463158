// Fragment addressing
//
// A fragment is named inside a stream; only the suffix carries meaning:
// - "*.ts"   - video segment, immutable once produced, cacheable
// - "*.m3u8" - live playlist, changes with every new segment, never cached

use std::fmt;

const SEGMENT_SUFFIX: &str = ".ts";
const PLAYLIST_SUFFIX: &str = ".m3u8";

/// What a fragment name refers to, judged by its suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Segment,
    Playlist,
    Unknown,
}

impl FragmentKind {
    #[must_use]
    pub fn of(fragment_name: &str) -> Self {
        if fragment_name.ends_with(SEGMENT_SUFFIX) {
            Self::Segment
        } else if fragment_name.ends_with(PLAYLIST_SUFFIX) {
            Self::Playlist
        } else {
            Self::Unknown
        }
    }

    /// MIME type served to clients for this kind of fragment
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Segment => "video/mp2t",
            Self::Playlist => "application/vnd.apple.mpegurl",
            Self::Unknown => "application/octet-stream",
        }
    }
}

/// Identifies one unit of cacheable content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub stream_name: String,
    pub fragment_name: String,
}

impl FragmentKey {
    pub fn new(stream_name: impl Into<String>, fragment_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            fragment_name: fragment_name.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> FragmentKind {
        FragmentKind::of(&self.fragment_name)
    }

    /// Flat storage key, e.g. "4:camA/seg5.ts"
    ///
    /// The stream name is length-prefixed: names may contain '/', and
    /// ("a/b", "c.ts") must not share a key with ("a", "b/c.ts").
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}/{}",
            self.stream_name.len(),
            self.stream_name,
            self.fragment_name
        )
    }
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stream_name, self.fragment_name)
    }
}
