//! Particle set and the Monte Carlo localization cycle.
//!
//! This module implements the filter's entire mutable state and its four
//! operations. The particle set is created empty, populated once by
//! [`ParticleFilter::initialize`], and then mutated in place by every
//! subsequent [`predict`](ParticleFilter::predict) /
//! [`update_weights`](ParticleFilter::update_weights) /
//! [`resample`](ParticleFilter::resample) call; the particle count is fixed
//! for the filter's lifetime. The filter owns its random number generator, so
//! a seeded filter replays bit-identically.
//!
//! Weights are raw products of observation likelihoods, not probabilities.
//! Normalization happens implicitly inside the multinomial resampling draw;
//! callers that want a point estimate reduce the population themselves (see
//! [`crate::sim::best_particle`]).

use std::fmt::{self, Debug, Display};

use nalgebra::Point2;
use rand::SeedableRng;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::error::FilterError;
use crate::map::Map;
use crate::measurements::{Observation, associate, landmark_likelihood};
use crate::{Pose, forward};

/// Default particle count for callers without a tuning opinion.
pub const DEFAULT_NUM_PARTICLES: usize = 100;

/// One pose hypothesis with an importance weight.
#[derive(Clone, Debug, Default)]
pub struct Particle {
    /// Ordinal within the current generation; reassigned on resampling
    pub id: usize,
    /// Hypothesized vehicle pose
    pub pose: Pose,
    /// Unnormalized importance weight
    pub weight: f64,
    /// Landmark ids chosen during the most recent weighting pass
    pub associations: Vec<i32>,
    /// Map-frame observation x coordinates, parallel to `associations`
    pub sense_x: Vec<f64>,
    /// Map-frame observation y coordinates, parallel to `associations`
    pub sense_y: Vec<f64>,
}

impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Particle")
            .field("id", &self.id)
            .field("x", &self.pose.x)
            .field("y", &self.pose.y)
            .field("theta", &self.pose.theta)
            .field("weight", &self.weight)
            .finish()
    }
}

/// The localization filter: a fixed-size population of weighted pose
/// hypotheses plus the weight vector the resampler draws from.
///
/// The `weights` vector is kept parallel to `particles` at all times:
/// `weights[i] == particles[i].weight` after every operation. Operations
/// other than `initialize` fail with [`FilterError::NotInitialized`] until
/// the filter has been seeded with an initial pose estimate.
///
/// # Example
///
/// ```rust
/// use mcl::Pose;
/// use mcl::map::{Landmark, Map};
/// use mcl::measurements::Observation;
/// use mcl::particle::ParticleFilter;
///
/// let map = Map::new(vec![Landmark { id: 1, x: 5.0, y: 0.0 }]);
/// let mut filter = ParticleFilter::with_seed(100, 42);
/// filter.initialize(&Pose::new(0.0, 0.0, 0.0), [0.3, 0.3, 0.01]);
///
/// // One filter cycle: predict, weigh, resample.
/// filter.predict(0.1, [0.3, 0.3, 0.01], 2.0, 0.0).unwrap();
/// let observations = vec![Observation::new(4.8, 0.1)];
/// filter
///     .update_weights(50.0, [0.3, 0.3], &observations, &map)
///     .unwrap();
/// filter.resample().unwrap();
/// ```
pub struct ParticleFilter {
    particles: Vec<Particle>,
    weights: Vec<f64>,
    num_particles: usize,
    is_initialized: bool,
    rng: StdRng,
}

impl Default for ParticleFilter {
    fn default() -> Self {
        ParticleFilter::new(DEFAULT_NUM_PARTICLES)
    }
}

impl ParticleFilter {
    /// Create a filter with a randomly seeded generator.
    ///
    /// # Arguments
    ///
    /// * `num_particles` - Population size, fixed for the filter's lifetime
    pub fn new(num_particles: usize) -> Self {
        Self::with_seed(num_particles, rand::random())
    }

    /// Create a filter with a specific random seed.
    ///
    /// Useful for reproducible tests: a seeded filter's `initialize` and
    /// `predict` produce bit-identical particle sets across runs with
    /// identical inputs.
    pub fn with_seed(num_particles: usize, seed: u64) -> Self {
        assert!(num_particles > 0, "Number of particles must be positive");
        ParticleFilter {
            particles: Vec::with_capacity(num_particles),
            weights: Vec::with_capacity(num_particles),
            num_particles,
            is_initialized: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed the particle set from a single noisy pose estimate.
    ///
    /// Draws every particle independently from per-axis Gaussians centered on
    /// the estimate, assigns weight 1 throughout, and discards any prior
    /// population. Must be called before any other operation; calling it
    /// again restarts the filter from the new estimate.
    ///
    /// # Arguments
    ///
    /// * `estimate` - Initial pose estimate (e.g. a GPS fix)
    /// * `std_pose` - Per-axis standard deviations `[x, y, theta]`
    pub fn initialize(&mut self, estimate: &Pose, std_pose: [f64; 3]) {
        assert!(
            std_pose.iter().all(|s| *s >= 0.0),
            "Standard deviations must be non-negative"
        );
        let normal_x = Normal::new(estimate.x, std_pose[0]).unwrap();
        let normal_y = Normal::new(estimate.y, std_pose[1]).unwrap();
        let normal_theta = Normal::new(estimate.theta, std_pose[2]).unwrap();
        self.particles.clear();
        self.weights.clear();
        for id in 0..self.num_particles {
            let pose = Pose::new(
                normal_x.sample(&mut self.rng),
                normal_y.sample(&mut self.rng),
                normal_theta.sample(&mut self.rng),
            );
            self.particles.push(Particle {
                id,
                pose,
                weight: 1.0,
                ..Particle::default()
            });
            self.weights.push(1.0);
        }
        self.is_initialized = true;
    }

    /// Advance every particle by one motion step plus process noise.
    ///
    /// Applies the CTRV model ([`forward`]) to each particle's pose, then
    /// draws the final pose from per-axis Gaussians centered on the advanced
    /// mean. The noise is mixed directly into the advanced pose rather than
    /// propagated through the dynamics. Weights are untouched.
    ///
    /// # Arguments
    ///
    /// * `dt` - Elapsed time since the previous cycle (s), must be positive
    /// * `std_pose` - Process noise standard deviations `[x, y, theta]`
    /// * `velocity` - Commanded linear velocity (m/s)
    /// * `yaw_rate` - Commanded yaw rate (rad/s)
    pub fn predict(
        &mut self,
        dt: f64,
        std_pose: [f64; 3],
        velocity: f64,
        yaw_rate: f64,
    ) -> Result<(), FilterError> {
        if !self.is_initialized {
            return Err(FilterError::NotInitialized);
        }
        assert!(dt > 0.0, "Time step must be positive");
        assert!(
            std_pose.iter().all(|s| *s >= 0.0),
            "Standard deviations must be non-negative"
        );
        for particle in &mut self.particles {
            forward(&mut particle.pose, velocity, yaw_rate, dt);
            particle.pose.x = Normal::new(particle.pose.x, std_pose[0])
                .unwrap()
                .sample(&mut self.rng);
            particle.pose.y = Normal::new(particle.pose.y, std_pose[1])
                .unwrap()
                .sample(&mut self.rng);
            particle.pose.theta = Normal::new(particle.pose.theta, std_pose[2])
                .unwrap()
                .sample(&mut self.rng);
        }
        Ok(())
    }

    /// Recompute every particle's weight from the current observations.
    ///
    /// For each particle: transform each observation into the map frame under
    /// the particle's pose, associate it with the nearest in-range landmark,
    /// and take the product of bivariate Gaussian likelihoods as the new
    /// weight. The prior weight is discarded, not smoothed; an empty
    /// observation slice therefore leaves every weight at exactly 1. The
    /// chosen landmark ids and map-frame observation coordinates are recorded
    /// on the particle for diagnostics.
    ///
    /// # Arguments
    ///
    /// * `sensor_range` - Maximum sensing distance (m), must be positive
    /// * `std_landmark` - Measurement standard deviations `[x, y]`, positive
    /// * `observations` - This cycle's vehicle-frame observations
    /// * `map` - The landmark map, must be non-empty
    pub fn update_weights(
        &mut self,
        sensor_range: f64,
        std_landmark: [f64; 2],
        observations: &[Observation],
        map: &Map,
    ) -> Result<(), FilterError> {
        if !self.is_initialized {
            return Err(FilterError::NotInitialized);
        }
        if map.is_empty() {
            return Err(FilterError::EmptyLandmarkMap);
        }
        assert!(sensor_range > 0.0, "Sensor range must be positive");
        assert!(
            std_landmark.iter().all(|s| *s > 0.0),
            "Measurement standard deviations must be positive"
        );
        for (particle, weight) in self.particles.iter_mut().zip(self.weights.iter_mut()) {
            let position = Point2::new(particle.pose.x, particle.pose.y);
            let mut new_weight = 1.0;
            particle.associations.clear();
            particle.sense_x.clear();
            particle.sense_y.clear();
            for observation in observations {
                let mapped = observation.to_map_frame(&particle.pose);
                // The map is non-empty, so an association always exists.
                let landmark = associate(map, &position, &mapped, sensor_range)
                    .expect("non-empty map yields an association");
                new_weight *= landmark_likelihood(&mapped, landmark, std_landmark);
                particle.associations.push(landmark.id);
                particle.sense_x.push(mapped.x);
                particle.sense_y.push(mapped.y);
            }
            particle.weight = new_weight;
            *weight = new_weight;
        }
        Ok(())
    }

    /// Draw a new generation with replacement, proportional to weight.
    ///
    /// Multinomial resampling: each slot of the new population is an
    /// independent categorical draw over the current weights. A resampled
    /// particle is a full copy of its source (pose, weight, diagnostics) with
    /// a fresh ordinal id; weights are not reset, so callers re-run
    /// `update_weights` before the next resample, exactly as in the
    /// predict-weigh-resample cycle.
    ///
    /// Fails with [`FilterError::DegenerateWeights`] when any weight is
    /// negative or non-finite, or when all weights are zero. There is no
    /// uniform-resampling fallback; recovery is caller policy.
    pub fn resample(&mut self) -> Result<(), FilterError> {
        if !self.is_initialized {
            return Err(FilterError::NotInitialized);
        }
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(FilterError::DegenerateWeights);
        }
        let categorical =
            WeightedIndex::new(&self.weights).map_err(|_| FilterError::DegenerateWeights)?;
        let mut resampled = Vec::with_capacity(self.num_particles);
        for id in 0..self.num_particles {
            let mut particle = self.particles[categorical.sample(&mut self.rng)].clone();
            particle.id = id;
            resampled.push(particle);
        }
        self.weights.clear();
        self.weights.extend(resampled.iter().map(|p| p.weight));
        self.particles = resampled;
        Ok(())
    }

    /// Attach an association list and matching map-frame coordinates to one
    /// particle, overriding the weigher's bookkeeping.
    ///
    /// The three lists must have equal lengths. Panics if `index` is out of
    /// bounds.
    pub fn set_associations(
        &mut self,
        index: usize,
        associations: Vec<i32>,
        sense_x: Vec<f64>,
        sense_y: Vec<f64>,
    ) -> Result<(), FilterError> {
        if !self.is_initialized {
            return Err(FilterError::NotInitialized);
        }
        assert_eq!(
            associations.len(),
            sense_x.len(),
            "Association and sense_x lists must have equal length"
        );
        assert_eq!(
            associations.len(),
            sense_y.len(),
            "Association and sense_y lists must have equal length"
        );
        let particle = &mut self.particles[index];
        particle.associations = associations;
        particle.sense_x = sense_x;
        particle.sense_y = sense_y;
        Ok(())
    }

    /// Render one particle's association ids as a space-separated string.
    ///
    /// An empty association list renders as an empty string; there is never a
    /// trailing space. Panics if `index` is out of bounds.
    pub fn get_associations(&self, index: usize) -> Result<String, FilterError> {
        if !self.is_initialized {
            return Err(FilterError::NotInitialized);
        }
        Ok(join_tokens(&self.particles[index].associations))
    }

    /// Render one particle's associated map-frame x coordinates; see
    /// [`get_associations`](ParticleFilter::get_associations).
    pub fn get_sense_x(&self, index: usize) -> Result<String, FilterError> {
        if !self.is_initialized {
            return Err(FilterError::NotInitialized);
        }
        Ok(join_tokens(&self.particles[index].sense_x))
    }

    /// Render one particle's associated map-frame y coordinates; see
    /// [`get_associations`](ParticleFilter::get_associations).
    pub fn get_sense_y(&self, index: usize) -> Result<String, FilterError> {
        if !self.is_initialized {
            return Err(FilterError::NotInitialized);
        }
        Ok(join_tokens(&self.particles[index].sense_y))
    }

    /// Read-only view of the current population.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Read-only view of the weight vector, parallel to `particles()`.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// The fixed population size.
    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Effective sample size over the current (unnormalized) weights:
    /// `(sum w)^2 / sum w^2`. Approaches the particle count for uniform
    /// weights and 1 under severe degeneracy.
    pub fn effective_sample_size(&self) -> f64 {
        let sum: f64 = self.weights.iter().sum();
        let sum_of_squares: f64 = self.weights.iter().map(|w| w * w).sum();
        if sum_of_squares > 0.0 {
            sum * sum / sum_of_squares
        } else {
            0.0
        }
    }
}

impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self.weights.iter().copied().fold(f64::INFINITY, f64::min);
        let max_weight = self.weights.iter().copied().fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.num_particles)
            .field("is_initialized", &self.is_initialized)
            .field("effective_particles", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .finish()
    }
}

fn join_tokens<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(T::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
