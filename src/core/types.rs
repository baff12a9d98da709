//! Shared geometry and region types.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in page pixel coordinates.
///
/// Serialized as `[x1, y1, x2, y2]` with `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Bbox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Bbox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Full-image bounds for a `width` x `height` page.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Returns true for degenerate boxes with no area.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Translates this box by the origin of `other`, mapping region-local
    /// coordinates back into page coordinates.
    pub fn offset_by(&self, other: &Bbox) -> Self {
        Self::new(
            self.x1 + other.x1,
            self.y1 + other.y1,
            self.x2 + other.x1,
            self.y2 + other.y1,
        )
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &Bbox) -> Self {
        Self::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    /// Clamps this box to `width` x `height` image bounds.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        Self::new(
            self.x1.clamp(0, width as i32),
            self.y1.clamp(0, height as i32),
            self.x2.clamp(0, width as i32),
            self.y2.clamp(0, height as i32),
        )
    }
}

impl From<[i32; 4]> for Bbox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Bbox> for [i32; 4] {
    fn from(b: Bbox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Classification of a layout region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    Text,
    Header,
    Footer,
    Figure,
    Table,
}

impl RegionType {
    /// Regions whose content is submitted to text recognition.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Text | Self::Header)
    }

    /// Regions extracted as image crops instead of recognized.
    pub fn is_graphic(&self) -> bool {
        matches!(self, Self::Figure | Self::Table)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Header => "header",
            Self::Footer => "footer",
            Self::Figure => "figure",
            Self::Table => "table",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_array_round_trip() {
        let b = Bbox::new(10, 20, 110, 220);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[10,20,110,220]");
        let back: Bbox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn bbox_offset_translates_into_page_coordinates() {
        let region = Bbox::new(100, 200, 400, 500);
        let local = Bbox::new(5, 10, 50, 30);
        assert_eq!(local.offset_by(&region), Bbox::new(105, 210, 150, 230));
    }

    #[test]
    fn bbox_union_covers_both_boxes() {
        let a = Bbox::new(10, 20, 50, 60);
        let b = Bbox::new(40, 5, 90, 55);
        assert_eq!(a.union(&b), Bbox::new(10, 5, 90, 60));
    }

    #[test]
    fn degenerate_bbox_is_empty() {
        assert!(Bbox::new(5, 5, 5, 9).is_empty());
        assert!(!Bbox::new(0, 0, 1, 1).is_empty());
    }

    #[test]
    fn region_type_serializes_lowercase() {
        let json = serde_json::to_string(&RegionType::Figure).unwrap();
        assert_eq!(json, "\"figure\"");
    }
}
