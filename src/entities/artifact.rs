//! Artifacts: opaque references to produced images and video.
//!
//! The engine never decodes pixels. Adapters return a locator (URL, object
//! key, data reference) and optional dimensions; everything downstream passes
//! artifacts by reference.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of payload an artifact points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Image,
    Video,
    /// A/B comparison assembled locally from two upstream artifacts.
    Comparison,
}

/// Reference to a produced artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub kind: ArtifactKind,
    /// Opaque locator understood by the host (URL, path, data reference).
    /// Empty for placeholders.
    pub locator: String,
    /// Pixel dimensions when the adapter reported them.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Playback length in seconds; video only.
    pub seconds: Option<f32>,
}

impl Artifact {
    pub fn image(locator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ArtifactKind::Image,
            locator: locator.into(),
            width: None,
            height: None,
            seconds: None,
        }
    }

    pub fn video(locator: impl Into<String>, seconds: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ArtifactKind::Video,
            locator: locator.into(),
            width: None,
            height: None,
            seconds: Some(seconds),
        }
    }

    /// Empty image stand-in, used when scene capture resolves without a
    /// snapshot before its deadline.
    pub fn placeholder() -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ArtifactKind::Image,
            locator: String::new(),
            width: None,
            height: None,
            seconds: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.locator.is_empty()
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// Scene metadata reported by the host alongside a capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneMeta {
    /// Host-side scene or document name.
    pub scene: String,
    /// Active camera/view identifier, when the host has one.
    pub camera: Option<String>,
    pub tags: Vec<String>,
}

/// Result of a scene capture call. `image` is `None` when the host had
/// nothing to offer; the scheduler substitutes a placeholder.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub image: Option<Artifact>,
    pub meta: SceneMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_empty_image() {
        let a = Artifact::placeholder();
        assert_eq!(a.kind, ArtifactKind::Image);
        assert!(a.is_placeholder());
    }

    #[test]
    fn test_video_carries_duration() {
        let a = Artifact::video("gen://clip/1", 4.0);
        assert_eq!(a.kind, ArtifactKind::Video);
        assert_eq!(a.seconds, Some(4.0));
        assert!(!a.is_placeholder());
    }
}
