//! Observation handling for the localization filter.
//!
//! This module defines vehicle-frame landmark observations, the rigid
//! transform that lifts them into the map frame under a pose hypothesis,
//! nearest-neighbor data association against the landmark map, and the
//! bivariate Gaussian measurement likelihood used to weight particles.

use nalgebra::{Point2, Rotation2, Vector2, distance};
use serde::{Deserialize, Serialize};

use crate::Pose;
use crate::map::{Landmark, Map};

/// A single landmark sighting in the vehicle frame.
///
/// `x` points forward along the vehicle heading, `y` to the left. The
/// identifier is carried through from upstream sensor processing when present
/// but plays no role in weighting; association is purely geometric.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct Observation {
    /// Optional upstream identifier, unused by the filter
    #[serde(default)]
    pub id: Option<i32>,
    /// Vehicle-frame forward offset (m)
    pub x: f64,
    /// Vehicle-frame lateral offset (m)
    pub y: f64,
}

impl Observation {
    pub fn new(x: f64, y: f64) -> Observation {
        Observation { id: None, x, y }
    }

    /// Transforms the observation into the map frame under a pose hypothesis.
    ///
    /// Standard planar rigid transform: rotation by the pose heading followed
    /// by translation to the pose position.
    pub fn to_map_frame(&self, pose: &Pose) -> Point2<f64> {
        let rotated = Rotation2::new(pose.theta) * Vector2::new(self.x, self.y);
        Point2::new(pose.x + rotated.x, pose.y + rotated.y)
    }
}

/// Associates a map-frame observation with the nearest landmark.
///
/// Two-phase search: candidate landmarks are those within `sensor_range` of
/// the *particle's* position (the sensor cannot have seen anything farther),
/// and the observation associates with the candidate nearest to it by
/// Euclidean distance, ties broken by first occurrence in map order. When no
/// landmark is in range the observation associates with the nearest landmark
/// of the full list instead; the residual is then large and the likelihood
/// contribution near zero, which is the correct "this hypothesis is unlikely"
/// signal. Returns `None` only for an empty map.
///
/// # Arguments
///
/// * `map` - The landmark map
/// * `position` - The particle's map-frame position
/// * `observation` - The observation, already transformed into the map frame
/// * `sensor_range` - Maximum sensing distance (m)
pub fn associate<'a>(
    map: &'a Map,
    position: &Point2<f64>,
    observation: &Point2<f64>,
    sensor_range: f64,
) -> Option<&'a Landmark> {
    let in_range = map
        .landmarks
        .iter()
        .filter(|landmark| distance(position, &landmark.position()) <= sensor_range);
    match nearest(in_range, observation) {
        Some(landmark) => Some(landmark),
        None => nearest(map.landmarks.iter(), observation),
    }
}

/// Nearest landmark to a point, first occurrence winning ties.
fn nearest<'a, I>(landmarks: I, point: &Point2<f64>) -> Option<&'a Landmark>
where
    I: Iterator<Item = &'a Landmark>,
{
    let mut best: Option<(&Landmark, f64)> = None;
    for landmark in landmarks {
        let d = distance(point, &landmark.position());
        // Strict comparison keeps the earlier landmark on ties.
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((landmark, d));
        }
    }
    best.map(|(landmark, _)| landmark)
}

/// Bivariate Gaussian likelihood of a map-frame observation given its
/// associated landmark, with independent per-axis variances.
///
/// ```text
/// p = 1 / (2 pi sx sy) * exp(-(dx^2 / (2 sx^2) + dy^2 / (2 sy^2)))
/// ```
///
/// # Arguments
///
/// * `observation` - The observation in the map frame
/// * `landmark` - The associated landmark
/// * `std_landmark` - Measurement standard deviations `[sx, sy]`, both positive
pub fn landmark_likelihood(
    observation: &Point2<f64>,
    landmark: &Landmark,
    std_landmark: [f64; 2],
) -> f64 {
    let [sx, sy] = std_landmark;
    let dx = observation.x - landmark.x;
    let dy = observation.y - landmark.y;
    let norm = 1.0 / (2.0 * std::f64::consts::PI * sx * sy);
    norm * (-(dx * dx / (2.0 * sx * sx) + dy * dy / (2.0 * sy * sy))).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn square_map() -> Map {
        Map::new(vec![
            Landmark {
                id: 1,
                x: 5.0,
                y: 0.0,
            },
            Landmark {
                id: 2,
                x: 0.0,
                y: 5.0,
            },
            Landmark {
                id: 3,
                x: -5.0,
                y: 0.0,
            },
            Landmark {
                id: 4,
                x: 0.0,
                y: -5.0,
            },
        ])
    }

    #[test]
    fn to_map_frame_identity_pose() {
        let obs = Observation::new(1.0, 2.0);
        let mapped = obs.to_map_frame(&Pose::default());
        assert_approx_eq!(mapped.x, 1.0, 1e-12);
        assert_approx_eq!(mapped.y, 2.0, 1e-12);
    }

    #[test]
    fn to_map_frame_rotates_then_translates() {
        // Quarter turn left: vehicle-forward maps onto map +y.
        let obs = Observation::new(2.0, 0.0);
        let mapped = obs.to_map_frame(&Pose::new(1.0, 1.0, FRAC_PI_2));
        assert_approx_eq!(mapped.x, 1.0, 1e-12);
        assert_approx_eq!(mapped.y, 3.0, 1e-12);
    }

    #[test]
    fn associate_picks_nearest_in_range() {
        let map = square_map();
        let position = Point2::new(0.0, 0.0);
        let observation = Point2::new(4.0, 0.5);
        let landmark = associate(&map, &position, &observation, 10.0).unwrap();
        assert_eq!(landmark.id, 1);
    }

    #[test]
    fn associate_excludes_out_of_range_landmarks() {
        // Landmark 1 is nearest to the observation but outside the sensor
        // range of the particle; the in-range landmark must win regardless of
        // raw observation-to-landmark distance.
        let map = Map::new(vec![
            Landmark {
                id: 1,
                x: 30.0,
                y: 0.0,
            },
            Landmark {
                id: 2,
                x: 8.0,
                y: 0.0,
            },
        ]);
        let position = Point2::new(0.0, 0.0);
        let observation = Point2::new(29.0, 0.0);
        let landmark = associate(&map, &position, &observation, 10.0).unwrap();
        assert_eq!(landmark.id, 2);
    }

    #[test]
    fn associate_falls_back_when_nothing_in_range() {
        let map = square_map();
        let position = Point2::new(100.0, 100.0);
        let observation = Point2::new(101.0, 100.0);
        let landmark = associate(&map, &position, &observation, 1.0).unwrap();
        // Nearest of the full list to (101, 100): landmark 1 at (5, 0).
        assert_eq!(landmark.id, 1);
    }

    #[test]
    fn associate_breaks_ties_by_map_order() {
        let map = Map::new(vec![
            Landmark {
                id: 10,
                x: 1.0,
                y: 0.0,
            },
            Landmark {
                id: 20,
                x: -1.0,
                y: 0.0,
            },
        ]);
        let position = Point2::new(0.0, 0.0);
        let observation = Point2::new(0.0, 0.0);
        let landmark = associate(&map, &position, &observation, 10.0).unwrap();
        assert_eq!(landmark.id, 10);
    }

    #[test]
    fn associate_empty_map_is_none() {
        let map = Map::default();
        let position = Point2::new(0.0, 0.0);
        let observation = Point2::new(0.0, 0.0);
        assert!(associate(&map, &position, &observation, 10.0).is_none());
    }

    #[test]
    fn likelihood_at_zero_residual_is_normalizer() {
        let landmark = Landmark {
            id: 1,
            x: 1.0,
            y: 0.0,
        };
        let observation = Point2::new(1.0, 0.0);
        let p = landmark_likelihood(&observation, &landmark, [0.3, 0.3]);
        assert_approx_eq!(p, 1.0 / (2.0 * PI * 0.3 * 0.3), 1e-12);
    }

    #[test]
    fn likelihood_decays_with_residual() {
        let landmark = Landmark {
            id: 1,
            x: 0.0,
            y: 0.0,
        };
        let near = landmark_likelihood(&Point2::new(0.1, 0.0), &landmark, [0.3, 0.3]);
        let far = landmark_likelihood(&Point2::new(1.0, 0.0), &landmark, [0.3, 0.3]);
        assert!(near > far);
        assert!(far > 0.0);
    }

    #[test]
    fn likelihood_matches_hand_computation() {
        let landmark = Landmark {
            id: 1,
            x: 2.0,
            y: 1.0,
        };
        let observation = Point2::new(2.5, 0.5);
        let p = landmark_likelihood(&observation, &landmark, [0.4, 0.2]);
        let expected: f64 =
            1.0 / (2.0 * PI * 0.4 * 0.2) * (-(0.25_f64 / (2.0 * 0.16) + 0.25 / (2.0 * 0.04))).exp();
        assert_approx_eq!(p, expected, 1e-15);
    }
}
