//! Display descriptors and capture-source thumbnails.
//!
//! A [`Display`] is the unit of selection for screen sharing: the host UI
//! picks a set of them from the thumbnail list and the orchestrator hands the
//! whole set to the protocol engine.  Native ids are only unique within one
//! enumeration snapshot, so descriptors are never cached across snapshots.

use serde::{Deserialize, Serialize};

/// Kind of capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayType {
    /// A physical or virtual monitor.
    Monitor,
    /// A single application window.
    Window,
}

/// Identifies one shareable capture source.
///
/// Immutable once issued by the enumeration stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Display {
    /// Platform-native identifier (monitor index or window handle).
    pub native_id: u32,
    /// Whether this is a monitor or a window.
    #[serde(rename = "type")]
    pub display_type: DisplayType,
}

impl Display {
    pub fn monitor(native_id: u32) -> Self {
        Self {
            native_id,
            display_type: DisplayType::Monitor,
        }
    }

    pub fn window(native_id: u32) -> Self {
        Self {
            native_id,
            display_type: DisplayType::Window,
        }
    }
}

/// One entry of a desktop-enumeration batch.
///
/// `data` holds the encoded preview image exactly as produced by the engine;
/// the orchestrator never decodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeThumbnail {
    pub data: Vec<u8>,
    pub name: String,
    pub native_id: u32,
    pub display_type: DisplayType,
}

impl NativeThumbnail {
    /// Returns the descriptor that selects this thumbnail's capture source.
    pub fn display(&self) -> Display {
        Display {
            native_id: self.native_id,
            display_type: self.display_type,
        }
    }
}

/// Geometry of a display advertised by a remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInformation {
    pub native_id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// A display a remote host has started sharing with this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayShare {
    /// Session-local display id used to tag frame data.
    pub display_id: u8,
    /// Access bits granted to the client (bit 0 = view, bit 1 = control).
    pub access: u8,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_display_keeps_id_and_type() {
        let thumb = NativeThumbnail {
            data: vec![1, 2, 3],
            name: "Terminal".to_string(),
            native_id: 77,
            display_type: DisplayType::Window,
        };

        assert_eq!(thumb.display(), Display::window(77));
    }

    #[test]
    fn test_display_serializes_type_field_in_lowercase() {
        let json = serde_json::to_string(&Display::monitor(1)).unwrap();
        assert_eq!(json, r#"{"native_id":1,"type":"monitor"}"#);
    }
}
