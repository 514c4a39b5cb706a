//! Landmark map for localization.
//!
//! The map is a static, pre-surveyed list of uniquely identified landmarks in
//! the map frame. The filter core treats it as read-only input; loading it
//! from disk is caller-side plumbing and the only I/O in this module.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A single surveyed landmark in the map frame.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Landmark {
    /// Unique landmark identifier
    pub id: i32,
    /// Map-frame x position (m)
    pub x: f64,
    /// Map-frame y position (m)
    pub y: f64,
}

impl Landmark {
    /// The landmark position as a point, for distance computations.
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// The known landmark map.
///
/// Landmark order is stable for the lifetime of a run and carries no meaning
/// beyond indexing; association ties are broken by first occurrence in this
/// order.
#[derive(Clone, Debug, Default)]
pub struct Map {
    pub landmarks: Vec<Landmark>,
}

impl Map {
    pub fn new(landmarks: Vec<Landmark>) -> Map {
        Map { landmarks }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Reads a landmark map from a CSV file with `id,x,y` columns.
    ///
    /// # Arguments
    /// * `path` - Path to the CSV file to read.
    ///
    /// # Returns
    /// * `Ok(Map)` if successful.
    /// * `Err` if the file cannot be read or parsed.
    pub fn from_csv<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Map, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut landmarks = Vec::new();
        for result in rdr.deserialize() {
            let landmark: Landmark = result?;
            landmarks.push(landmark);
        }
        Ok(Map { landmarks })
    }
}
