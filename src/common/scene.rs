//! Scene loading, parsing, and validation logic.
//!
//! A scene lists every vehicle with its initial position and velocity plus
//! optional course changes. Loaded scenes turn into a [`TrajectoryMobility`]
//! that drives the simulation instead of the random-waypoint model.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::simulation::mobility::{Trajectory, TrajectoryMobility};
use crate::simulation::types::{NodeId, Vector3};

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// A new velocity taking effect at `time` (s).
#[derive(Debug, Deserialize, Clone)]
pub struct CourseChange {
    pub time: f64,
    pub velocity: Vector3,
}

/// One vehicle.
#[derive(Debug, Deserialize, Clone)]
pub struct Node {
    pub node_id: NodeId,
    pub position: Vector3,
    /// Initial velocity (m/s). Omitted means parked.
    #[serde(default)]
    pub velocity: Vector3,
    #[serde(default)]
    pub course_changes: Vec<CourseChange>,
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize)]
pub struct Scene {
    /// All vehicles present in the scene, in transmitter order.
    pub nodes: Vec<Node>,
}

impl Scene {
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.node_id).collect()
    }

    /// Build the trajectories described by the scene.
    pub fn to_mobility(&self) -> TrajectoryMobility {
        let mut mobility = TrajectoryMobility::new();
        for node in &self.nodes {
            let changes: Vec<(Duration, Vector3)> = node.course_changes.iter().map(|c| (Duration::from_secs_f64(c.time), c.velocity)).collect();
            mobility.insert(node.node_id, Trajectory::from_course_changes(node.position, node.velocity, &changes));
        }
        mobility
    }
}

/// Load and parse a scene from a file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &Path) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;

    parse_scene(&data)
}

/// Parse and validate scene JSON.
pub fn parse_scene(data: &str) -> Result<Scene, SceneLoadError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

/// Validate a parsed scene.
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MAX_NODES: usize = 10000;

    // Check node count
    if scene.nodes.is_empty() {
        return Err("Scene must contain at least one node".to_string());
    }
    if scene.nodes.len() > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", scene.nodes.len(), MAX_NODES));
    }

    // Check for duplicate node IDs
    let mut node_ids = HashSet::new();
    for node in &scene.nodes {
        if !node_ids.insert(node.node_id) {
            return Err(format!("Duplicate node_id found: {}", node.node_id));
        }
    }

    for node in &scene.nodes {
        if !node.position.is_finite() {
            return Err(format!("Node {} has a non-finite position", node.node_id));
        }
        if !node.velocity.is_finite() {
            return Err(format!("Node {} has a non-finite velocity", node.node_id));
        }

        let mut previous: Option<f64> = None;
        for change in &node.course_changes {
            if !change.time.is_finite() || change.time < 0.0 {
                return Err(format!("Node {} course change at invalid time {}", node.node_id, change.time));
            }
            if let Some(prev) = previous.filter(|&prev| change.time <= prev) {
                return Err(format!(
                    "Node {} course changes must be strictly increasing in time ({} after {})",
                    node.node_id, change.time, prev
                ));
            }
            if !change.velocity.is_finite() {
                return Err(format!("Node {} course change at {} has a non-finite velocity", node.node_id, change.time));
            }
            previous = Some(change.time);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::mobility::MobilityOracle;

    const TWO_CARS: &str = r#"{
        "nodes": [
            { "node_id": 7, "position": { "x": 0.0, "y": 0.0 }, "velocity": { "x": 10.0, "y": 0.0 } },
            {
                "node_id": 3,
                "position": { "x": 100.0, "y": 5.0, "z": 1.5 },
                "course_changes": [
                    { "time": 2.0, "velocity": { "x": 0.0, "y": 4.0 } },
                    { "time": 5.0, "velocity": { "x": 0.0, "y": 0.0 } }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_nodes_in_file_order() {
        let scene = parse_scene(TWO_CARS).unwrap();
        assert_eq!(scene.node_ids(), vec![7, 3]);
        assert_eq!(scene.nodes[1].position.z, 1.5);
        assert_eq!(scene.nodes[1].velocity, Vector3::ZERO);
    }

    #[test]
    fn trajectories_follow_course_changes() {
        let mobility = parse_scene(TWO_CARS).unwrap().to_mobility();
        let at = |s: f64| Duration::from_secs_f64(s);

        assert_eq!(mobility.position_of(7, at(3.0)), Some(Vector3::new(30.0, 0.0, 0.0)));
        assert_eq!(mobility.velocity_of(3, at(1.0)), Some(Vector3::ZERO));
        assert_eq!(mobility.velocity_of(3, at(3.0)), Some(Vector3::new(0.0, 4.0, 0.0)));
        assert_eq!(mobility.position_of(3, at(9.0)), Some(Vector3::new(100.0, 17.0, 1.5)));
    }

    #[test]
    fn rejects_invalid_scenes() {
        let cases = [
            r#"{ "nodes": [] }"#,
            r#"{ "nodes": [ { "node_id": 1, "position": { "x": 0, "y": 0 } }, { "node_id": 1, "position": { "x": 1, "y": 0 } } ] }"#,
            r#"{ "nodes": [ { "node_id": 1, "position": { "x": 0, "y": 0 }, "course_changes": [ { "time": -1.0, "velocity": { "x": 1, "y": 0 } } ] } ] }"#,
            r#"{ "nodes": [ { "node_id": 1, "position": { "x": 0, "y": 0 }, "course_changes": [
                { "time": 2.0, "velocity": { "x": 1, "y": 0 } }, { "time": 2.0, "velocity": { "x": 0, "y": 0 } } ] } ] }"#,
        ];
        for case in cases {
            assert!(matches!(parse_scene(case), Err(SceneLoadError::ValidationError(_))), "{}", case);
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse_scene("{ nodes: "), Err(SceneLoadError::ParseError(_))));
        assert!(matches!(parse_scene(r#"{ "nodes": [ { "node_id": 1 } ] }"#), Err(SceneLoadError::ParseError(_))));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        std::fs::write(&path, TWO_CARS).unwrap();
        assert_eq!(load_scene(&path).unwrap().nodes.len(), 2);
        assert!(matches!(load_scene(&dir.path().join("missing.json")), Err(SceneLoadError::FileReadError(_))));
    }
}
