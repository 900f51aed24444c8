//! Geographic bounding box recorded with per-run inventories.

use serde::{Deserialize, Serialize};

/// A lat/lon extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Grow this box to cover another.
    pub fn extend(&mut self, other: &BoundingBox) {
        self.west = self.west.min(other.west);
        self.south = self.south.min(other.south);
        self.east = self.east.max(other.east);
        self.north = self.north.max(other.north);
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend() {
        let mut a = BoundingBox::new(-100.0, 30.0, -90.0, 40.0);
        let b = BoundingBox::new(-105.0, 35.0, -95.0, 45.0);
        a.extend(&b);
        assert_eq!(a, BoundingBox::new(-105.0, 30.0, -90.0, 45.0));
    }

    #[test]
    fn test_contains() {
        let bbox = BoundingBox::new(-100.0, 30.0, -90.0, 40.0);
        assert!(bbox.contains(-95.0, 35.0));
        assert!(!bbox.contains(-85.0, 35.0));
    }
}
