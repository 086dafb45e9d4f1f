//! Track entities: fully-resolved tracks and the lightweight placeholders
//! that get resolved through a search right before playback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Metadata describing a single audio track.
///
/// This is the shape both the REST decode endpoints and the binary codec
/// produce. `is_seekable` is always the negation of `is_stream`; it is
/// derived on decode and never stored on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub title: String,
    pub author: String,
    /// Track length in milliseconds.
    pub length: u64,
    pub identifier: String,
    pub is_stream: bool,
    pub is_seekable: bool,
    #[serde(default)]
    pub uri: Option<String>,
    pub source_name: String,
}

/// A track as returned by the node's REST surface: the opaque wire-format
/// identifier plus the decoded metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackData {
    /// Base64 wire-format identifier understood by every node.
    pub track: String,
    pub info: TrackInfo,
}

/// A resolved, playable track.
#[derive(Debug, Clone)]
pub struct Track {
    /// Base64 wire-format identifier.
    pub encoded: String,
    pub info: TrackInfo,
    /// Opaque caller-supplied requester value, carried around untouched.
    pub requester: Option<Value>,
}

impl Track {
    pub fn new(data: TrackData, requester: Option<Value>) -> Self {
        Self {
            encoded: data.track,
            info: data.info,
            requester,
        }
    }

    /// Thumbnail URL for youtube-sourced tracks, `None` for anything else.
    pub fn display_thumbnail(&self, size: &str) -> Option<String> {
        if self.info.source_name != "youtube" {
            return None;
        }
        Some(format!(
            "https://img.youtube.com/vi/{}/{}.jpg",
            self.info.identifier, size
        ))
    }
}

/// A title/author/duration placeholder enqueued before the node has resolved
/// it to a concrete audio source. Replaced by a [`Track`] the moment the
/// player needs to play it.
#[derive(Debug, Clone)]
pub struct UnresolvedTrack {
    pub title: String,
    pub author: Option<String>,
    /// Declared duration in milliseconds, used to disambiguate candidates.
    pub duration: Option<u64>,
    pub requester: Option<Value>,
}

impl UnresolvedTrack {
    pub fn new(title: impl Into<String>) -> Result<Self> {
        let title = title.into();
        if title.is_empty() {
            return Err(Error::Validation(
                "'title' must be a non-empty string".into(),
            ));
        }
        Ok(Self {
            title,
            author: None,
            duration: None,
            requester: None,
        })
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn duration(mut self, duration: u64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn requester(mut self, requester: Value) -> Self {
        self.requester = Some(requester);
        self
    }
}

/// What actually sits in a queue slot.
#[derive(Debug, Clone)]
pub enum QueueItem {
    Track(Track),
    Unresolved(UnresolvedTrack),
}

impl QueueItem {
    pub fn title(&self) -> &str {
        match self {
            Self::Track(track) => &track.info.title,
            Self::Unresolved(track) => &track.title,
        }
    }

    pub fn author(&self) -> Option<&str> {
        match self {
            Self::Track(track) => Some(&track.info.author),
            Self::Unresolved(track) => track.author.as_deref(),
        }
    }

    pub fn duration(&self) -> Option<u64> {
        match self {
            Self::Track(track) => Some(track.info.length),
            Self::Unresolved(track) => track.duration,
        }
    }

    pub fn requester(&self) -> Option<&Value> {
        match self {
            Self::Track(track) => track.requester.as_ref(),
            Self::Unresolved(track) => track.requester.as_ref(),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved(_))
    }

    pub fn as_track(&self) -> Option<&Track> {
        match self {
            Self::Track(track) => Some(track),
            Self::Unresolved(_) => None,
        }
    }
}

impl From<Track> for QueueItem {
    fn from(track: Track) -> Self {
        Self::Track(track)
    }
}

impl From<UnresolvedTrack> for QueueItem {
    fn from(track: UnresolvedTrack) -> Self {
        Self::Unresolved(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data(source: &str) -> TrackData {
        TrackData {
            track: "QAAA".into(),
            info: TrackInfo {
                title: "song".into(),
                author: "artist".into(),
                length: 1000,
                identifier: "dQw4w9WgXcQ".into(),
                is_stream: false,
                is_seekable: true,
                uri: None,
                source_name: source.into(),
            },
        }
    }

    #[test]
    fn thumbnails_only_exist_for_youtube() {
        let track = Track::new(data("youtube"), None);
        assert_eq!(
            track.display_thumbnail("maxresdefault").as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/maxresdefault.jpg")
        );
        assert!(Track::new(data("soundcloud"), None)
            .display_thumbnail("maxresdefault")
            .is_none());
    }

    #[test]
    fn empty_titles_are_rejected() {
        assert!(UnresolvedTrack::new("").is_err());
    }
}
