//! Monte Carlo localization toolbox for landmark-based vehicle positioning
//!
//! This crate implements a Monte Carlo localization (MCL) filter: a particle
//! filter that estimates a ground vehicle's planar pose (position and heading)
//! from noisy motion commands and noisy landmark observations against a known
//! map. The filter maintains a fixed-size population of weighted pose
//! hypotheses and runs the classic sequential Bayesian cycle: propagate every
//! hypothesis through a motion model, reweight it against the current sensor
//! observations via nearest-neighbor data association and a Gaussian
//! likelihood, and resample with replacement to concentrate the population on
//! plausible hypotheses.
//!
//! This crate is primarily built off of two additional dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): Provides the linear algebra tools for frame transforms and distances.
//! - [`rand`](https://crates.io/crates/rand) and [`rand_distr`](https://crates.io/crates/rand_distr): Provides random number generation for initialization noise, process noise, and the multinomial resampling draw.
//!
//! All other functionality is built on top of these crates or is auxiliary
//! functionality (e.g. I/O for simulation datasets). Variables are generally
//! named for the quantity they represent rather than a textbook symbol; the
//! yaw rate is `yaw_rate`, not `omega`.
//!
//! ## Crate overview
//!
//! This crate is organized into several modules:
//! - [error]: Contains the error taxonomy raised by filter operations.
//! - [map]: Contains the landmark map type and its CSV loader.
//! - [measurements]: Contains vehicle-frame observations, the frame transform, data association, and the landmark likelihood.
//! - [particle]: Contains the particle set and the four filter operations (initialize, predict, update weights, resample).
//! - [sim]: Contains dataset record types and the driving loop for running the filter over recorded data.
//!
//! ## Coordinate and state definitions
//!
//! The vehicle state is the three-element planar pose
//!
//! ```text
//! x = [x, y, theta]
//! ```
//!
//! where `x` and `y` are map-frame positions in meters and `theta` is the
//! heading in radians, measured counterclockwise from the map x-axis. Heading
//! is deliberately not range-normalized: the motion model accumulates yaw and
//! callers that need a wrapped angle can wrap it at the edge. Landmark
//! observations arrive in the vehicle frame (forward along the heading,
//! lateral to the left) and are rotated and translated into the map frame by
//! each particle's own pose hypothesis before association.
//!
//! ## Motion model
//!
//! The propagation step uses the constant-turn-rate-and-velocity (CTRV)
//! model. Given commanded linear velocity `v`, yaw rate `w`, and elapsed time
//! `dt`, the pose advances by
//!
//! ```text
//! theta' = theta + w * dt
//! x'     = x + (v / w) * (sin(theta') - sin(theta))
//! y'     = y + (v / w) * (cos(theta) - cos(theta'))
//! ```
//!
//! with the straight-line limit (`w == 0`) handled as an explicit branch to
//! avoid the division. [`forward`] implements exactly this deterministic step;
//! the filter's `predict` operation samples per-axis Gaussian process noise
//! around its output, mixing the noise into the advanced pose rather than
//! propagating it through the dynamics.

pub mod error;
pub mod map;
pub mod measurements;
pub mod particle;
pub mod sim;

use std::fmt::{self, Display};

use nalgebra::Vector3;

/// Planar vehicle pose: map-frame position in meters and heading in radians.
///
/// Heading is not range-normalized; it accumulates under the motion model.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    /// Map-frame x position (m)
    pub x: f64,
    /// Map-frame y position (m)
    pub y: f64,
    /// Heading (rad), counterclockwise from the map x-axis
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Pose {
        Pose { x, y, theta }
    }
}

impl Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose(x: {:.3}, y: {:.3}, theta: {:.3})",
            self.x, self.y, self.theta
        )
    }
}

impl From<&Pose> for Vec<f64> {
    /// Converts a reference to a Pose to a Vec<f64> in [x, y, theta] order.
    fn from(pose: &Pose) -> Self {
        vec![pose.x, pose.y, pose.theta]
    }
}

impl From<&Pose> for Vector3<f64> {
    /// Converts a reference to a Pose to a Vector3<f64> in [x, y, theta] order.
    fn from(pose: &Pose) -> Self {
        Vector3::new(pose.x, pose.y, pose.theta)
    }
}

impl TryFrom<&[f64]> for Pose {
    type Error = &'static str;
    /// Attempts to create a Pose from a slice of 3 elements, heading in radians.
    fn try_from(slice: &[f64]) -> Result<Self, Self::Error> {
        if slice.len() != 3 {
            return Err("Slice must have length 3 for Pose");
        }
        Ok(Pose::new(slice[0], slice[1], slice[2]))
    }
}

/// Constant-turn-rate-and-velocity forward step.
///
/// Advances the pose in place by `dt` seconds of commanded motion. The yaw
/// rate branches on exact zero: the straight-line form avoids the `v / w`
/// division, and the two branches agree in the limit `w -> 0` (see the unit
/// tests). This function is deterministic; process noise belongs to the
/// caller.
///
/// # Arguments
///
/// * `pose` - Pose to advance
/// * `velocity` - Commanded linear velocity (m/s)
/// * `yaw_rate` - Commanded yaw rate (rad/s)
/// * `dt` - Elapsed time (s)
pub fn forward(pose: &mut Pose, velocity: f64, yaw_rate: f64, dt: f64) {
    if yaw_rate == 0.0 {
        pose.x += velocity * dt * pose.theta.cos();
        pose.y += velocity * dt * pose.theta.sin();
    } else {
        let heading = pose.theta + yaw_rate * dt;
        pose.x += velocity / yaw_rate * (heading.sin() - pose.theta.sin());
        pose.y += velocity / yaw_rate * (pose.theta.cos() - heading.cos());
        pose.theta = heading;
    }
}
