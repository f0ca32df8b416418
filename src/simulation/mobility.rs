//! Mobility oracle: current position and velocity of every node.
//!
//! Node motion is modelled as piecewise constant-velocity trajectories. A
//! trajectory is a list of segments, each starting at a known time and
//! position and moving at a fixed velocity until the next segment begins.
//! Trajectories come from a scene file or from a seeded random-waypoint model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;

use super::types::{NodeId, Vector3};

/// Read-only view of node motion at a given simulated time.
///
/// `None` means the oracle has no data for the node at all.
pub trait MobilityOracle {
    fn position_of(&self, node: NodeId, at: Duration) -> Option<Vector3>;
    fn velocity_of(&self, node: NodeId, at: Duration) -> Option<Vector3>;
}

/// One constant-velocity leg of a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSegment {
    pub start: Duration,
    /// Position at `start`.
    pub position: Vector3,
    pub velocity: Vector3,
}

/// Sorted, non-empty list of motion segments. The first one starts at t=0.
#[derive(Debug, Clone)]
pub struct Trajectory {
    segments: Vec<MotionSegment>,
}

impl Trajectory {
    /// A node sitting at `position` for the whole run.
    #[cfg(test)]
    pub fn stationary(position: Vector3) -> Self {
        Self::constant(position, Vector3::ZERO)
    }

    /// A node moving at `velocity` from t=0 onwards.
    pub fn constant(position: Vector3, velocity: Vector3) -> Self {
        Self {
            segments: vec![MotionSegment {
                start: Duration::ZERO,
                position,
                velocity,
            }],
        }
    }

    /// Build from an initial state plus `(time, new velocity)` course changes.
    ///
    /// Course changes must be sorted by time; positions are integrated so the
    /// trajectory stays continuous across changes.
    pub fn from_course_changes(position: Vector3, velocity: Vector3, changes: &[(Duration, Vector3)]) -> Self {
        let mut trajectory = Self::constant(position, velocity);
        for &(at, velocity) in changes {
            trajectory.push_course_change(at, velocity);
        }
        trajectory
    }

    fn push_course_change(&mut self, at: Duration, velocity: Vector3) {
        let last = self.segments.last().cloned().unwrap_or(MotionSegment {
            start: Duration::ZERO,
            position: Vector3::ZERO,
            velocity: Vector3::ZERO,
        });
        let elapsed = at.saturating_sub(last.start).as_secs_f64();
        self.segments.push(MotionSegment {
            start: at.max(last.start),
            position: last.position.advanced(&last.velocity, elapsed),
            velocity,
        });
    }

    fn segment_at(&self, at: Duration) -> &MotionSegment {
        // Index of the first segment starting after `at`; the one before it is active.
        let idx = self.segments.partition_point(|s| s.start <= at);
        &self.segments[idx.saturating_sub(1)]
    }

    pub fn position_at(&self, at: Duration) -> Vector3 {
        let seg = self.segment_at(at);
        let elapsed = at.saturating_sub(seg.start).as_secs_f64();
        seg.position.advanced(&seg.velocity, elapsed)
    }

    pub fn velocity_at(&self, at: Duration) -> Vector3 {
        self.segment_at(at).velocity
    }

    #[cfg(test)]
    pub fn segments(&self) -> &[MotionSegment] {
        &self.segments
    }
}

/// Mobility oracle backed by precomputed per-node trajectories.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryMobility {
    trajectories: HashMap<NodeId, Trajectory>,
}

impl TrajectoryMobility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: NodeId, trajectory: Trajectory) {
        self.trajectories.insert(node, trajectory);
    }

    #[cfg(test)]
    pub fn with(mut self, node: NodeId, trajectory: Trajectory) -> Self {
        self.insert(node, trajectory);
        self
    }

    /// Node ids known to the oracle, in ascending order.
    #[cfg(test)]
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.trajectories.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl MobilityOracle for TrajectoryMobility {
    fn position_of(&self, node: NodeId, at: Duration) -> Option<Vector3> {
        self.trajectories.get(&node).map(|t| t.position_at(at))
    }

    fn velocity_of(&self, node: NodeId, at: Duration) -> Option<Vector3> {
        self.trajectories.get(&node).map(|t| t.velocity_at(at))
    }
}

/// Parameters for the random-waypoint model.
#[derive(Debug, Clone)]
pub struct RandomWaypointParameters {
    /// Box width along x (m).
    pub width: f64,
    /// Box height along y (m).
    pub height: f64,
    /// Antenna height range; each waypoint draws z uniformly from it.
    pub min_z: f64,
    pub max_z: f64,
    /// Leg speed is drawn uniformly from `[0, max_speed]` (m/s).
    pub max_speed: f64,
    /// Pause at each waypoint (s).
    pub pause: f64,
}

impl Default for RandomWaypointParameters {
    fn default() -> Self {
        Self {
            width: 1500.0,
            height: 300.0,
            min_z: 1.0,
            max_z: 2.0,
            max_speed: 20.0,
            pause: 0.0,
        }
    }
}

// A leg drawn with speed ~0 would never finish; treat anything slower as this.
const MIN_LEG_SPEED: f64 = 0.01;

/// Generate random-waypoint trajectories for `count` nodes (ids `0..count`)
/// covering `[0, horizon]`.
///
/// The same seed always yields the same trajectories.
pub fn random_waypoint(count: u32, params: &RandomWaypointParameters, horizon: Duration, seed: u64) -> TrajectoryMobility {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut mobility = TrajectoryMobility::new();
    let horizon_s = horizon.as_secs_f64();

    for node_id in 0..count {
        let mut position = random_point(&mut rng, params);
        let mut t = 0.0_f64;
        let mut segments = Vec::new();

        while t < horizon_s {
            let destination = random_point(&mut rng, params);
            let speed = if params.max_speed > 0.0 {
                rng.gen_range(0.0..=params.max_speed).max(MIN_LEG_SPEED)
            } else {
                0.0
            };
            let dx = destination.x - position.x;
            let dy = destination.y - position.y;
            let dz = destination.z - position.z;
            let length = (dx * dx + dy * dy + dz * dz).sqrt();

            if speed > 0.0 && length > 0.0 {
                let travel = length / speed;
                segments.push(MotionSegment {
                    start: Duration::from_secs_f64(t),
                    position,
                    velocity: Vector3::new(dx / travel, dy / travel, dz / travel),
                });
                t += travel;
                position = destination;
            } else {
                // Zero speed or a degenerate box: one stationary segment covers the run.
                segments.push(MotionSegment {
                    start: Duration::from_secs_f64(t),
                    position,
                    velocity: Vector3::ZERO,
                });
                break;
            }

            if params.pause > 0.0 && t < horizon_s {
                segments.push(MotionSegment {
                    start: Duration::from_secs_f64(t),
                    position,
                    velocity: Vector3::ZERO,
                });
                t += params.pause;
            }
        }

        if segments.is_empty() {
            segments.push(MotionSegment {
                start: Duration::ZERO,
                position,
                velocity: Vector3::ZERO,
            });
        }
        mobility.insert(node_id, Trajectory { segments });
    }

    log::debug!("Generated random-waypoint trajectories for {} nodes (seed {})", count, seed);
    mobility
}

fn random_point(rng: &mut StdRng, params: &RandomWaypointParameters) -> Vector3 {
    let z = if params.max_z > params.min_z {
        rng.gen_range(params.min_z..params.max_z)
    } else {
        params.min_z
    };
    Vector3::new(rng.gen_range(0.0..=params.width), rng.gen_range(0.0..=params.height), z)
}
