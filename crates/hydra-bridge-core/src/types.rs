//! Shared value types: identifiers, geometry, orientation.
//!
//! Geometry is plain `f64` CSS pixels. Rectangles are always expressed in the
//! coordinate space of a specific viewport; the overlay module is responsible
//! for converting between the iframe and parent spaces.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Stable, admin-assigned block identifier.
pub type BlockId = SmolStr;

/// Name of a slot within a block (e.g. `"blocks"`, `"columns"`).
pub type SlotName = SmolStr;

/// Default slot/source field name for child blocks.
pub const DEFAULT_SLOT: &str = "blocks";

/// A point in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Translate by a vector.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Axis-aligned rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Translate by a vector.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Whether a point lies inside (edges inclusive).
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.top() && p.y <= self.bottom()
    }

    /// Intersection of two rectangles, `None` when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right < left || bottom < top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }
}

/// Layout direction of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

impl Orientation {
    pub fn flip(self) -> Self {
        match self {
            Orientation::Vertical => Orientation::Horizontal,
            Orientation::Horizontal => Orientation::Vertical,
        }
    }
}

/// Side on which the add-button is placed relative to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddSide {
    Bottom,
    Right,
}

impl AddSide {
    /// Parse the value of a `data-block-add` attribute.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "bottom" => Some(AddSide::Bottom),
            "right" => Some(AddSide::Right),
            _ => None,
        }
    }

    /// Add-button side implied by a slot's orientation: new blocks go where the
    /// next sibling would appear.
    pub fn for_orientation(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Vertical => AddSide::Bottom,
            Orientation::Horizontal => AddSide::Right,
        }
    }
}
