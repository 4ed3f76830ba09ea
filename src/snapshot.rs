use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::Value;

/// One full or partial description of simulation world state. Categories are
/// independent: a fragment that fails to decode is dropped on the floor
/// (logged) without taking the rest of the snapshot with it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub warehouse: Option<WarehouseState>,
    pub robot: Option<RobotState>,
    pub tasks: Option<Vec<TaskState>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseState {
    pub width: f32,
    pub length: f32,
    #[serde(default)]
    pub obstacles: Vec<PlacedBox>,
    #[serde(default)]
    pub racks: Vec<PlacedBox>,
    #[serde(default)]
    pub items: Vec<ItemState>,
    #[serde(default)]
    pub charging_stations: Vec<StationState>,
}

/// Obstacle or rack: a footprint with 2 or 3 dimension components.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacedBox {
    pub position: [f32; 2],
    pub dimensions: Vec<f32>,
}

impl PlacedBox {
    /// Width/height/depth with a fallback height for 2-component payloads.
    pub fn dims3(&self, default_height: f32) -> [f32; 3] {
        let w = self.dimensions.first().copied().unwrap_or(0.5);
        let d = self.dimensions.get(1).copied().unwrap_or(w);
        let h = self.dimensions.get(2).copied().unwrap_or(default_height);
        [w, h, d]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemState {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub position: [f32; 2],
    #[serde(default)]
    pub dimensions: Option<Vec<f32>>,
}

impl ItemState {
    pub fn dims3(&self) -> [f32; 3] {
        match &self.dimensions {
            Some(dims) => {
                let w = dims.first().copied().unwrap_or(0.2);
                let d = dims.get(1).copied().unwrap_or(w);
                let h = dims.get(2).copied().unwrap_or(0.2);
                [w, h, d]
            }
            None => [0.2, 0.2, 0.2],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationState {
    pub position: [f32; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct RobotState {
    pub position: [f32; 2],
    #[serde(alias = "orientation_radians")]
    pub orientation: f32,
    #[serde(default)]
    pub status: RobotStatus,
    #[serde(default)]
    pub battery_percentage: Option<f32>,
    #[serde(default)]
    pub dimensions: Option<RobotDimensions>,
    #[serde(default)]
    pub path: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RobotDimensions {
    pub width: f32,
    pub length: f32,
    #[serde(default = "RobotDimensions::default_height")]
    pub height: f32,
}

impl RobotDimensions {
    const fn default_height() -> f32 {
        0.4
    }
}

impl Default for RobotDimensions {
    fn default() -> Self {
        // robot chassis defaults in metres
        Self { width: 0.5, length: 0.7, height: 0.4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotStatus {
    #[default]
    Idle,
    Moving,
    Picking,
    Placing,
    Charging,
    Blocked,
    #[serde(other)]
    Unknown,
}

impl RobotStatus {
    pub fn label(self) -> &'static str {
        match self {
            RobotStatus::Idle => "idle",
            RobotStatus::Moving => "moving",
            RobotStatus::Picking => "picking",
            RobotStatus::Placing => "placing",
            RobotStatus::Charging => "charging",
            RobotStatus::Blocked => "blocked",
            RobotStatus::Unknown => "unknown",
        }
    }

    /// Emissive indicator tint. Idle, blocked and unknown statuses show none.
    pub fn tint(self) -> [f32; 3] {
        match self {
            RobotStatus::Moving => [0.0, 0.55, 0.12],
            RobotStatus::Picking | RobotStatus::Placing => [0.65, 0.42, 0.0],
            RobotStatus::Charging => [0.0, 0.25, 0.7],
            _ => [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskState {
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    pub position: [f32; 2],
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Pick,
    Place,
    Charge,
    #[default]
    #[serde(other)]
    Other,
}

impl Snapshot {
    /// Decodes one wire frame. The frame must be a JSON object; each category
    /// inside decodes independently so one bad fragment cannot poison the
    /// others.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(anyhow!("snapshot frame is not a JSON object"));
        }
        let mut snapshot = Snapshot::default();
        if let Some(fragment) = value.get("warehouse") {
            match serde_json::from_value(fragment.clone()) {
                Ok(warehouse) => snapshot.warehouse = Some(warehouse),
                Err(err) => log::warn!("[snapshot] dropping warehouse fragment: {err}"),
            }
        }
        if let Some(fragment) = value.get("robot") {
            match serde_json::from_value(fragment.clone()) {
                Ok(robot) => snapshot.robot = Some(robot),
                Err(err) => log::warn!("[snapshot] dropping robot fragment: {err}"),
            }
        }
        if let Some(fragment) = value.get("tasks") {
            match serde_json::from_value(fragment.clone()) {
                Ok(tasks) => snapshot.tasks = Some(tasks),
                Err(err) => log::warn!("[snapshot] dropping tasks fragment: {err}"),
            }
        }
        Ok(snapshot)
    }

    pub fn is_empty(&self) -> bool {
        self.warehouse.is_none() && self.robot.is_none() && self.tasks.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_snapshot_parses_every_category() {
        let text = r#"{
            "warehouse": {
                "width": 20.0, "length": 30.0,
                "obstacles": [{"position": [3.0, 4.0], "dimensions": [1.0, 1.0]}],
                "racks": [{"position": [8.0, 10.0], "dimensions": [1.0, 5.0, 1.0]}],
                "items": [{"id": 7, "type": "crate", "position": [2.0, 2.5]}],
                "charging_stations": [{"position": [0.5, 0.5]}]
            },
            "robot": {
                "position": [1.0, 1.0], "orientation": 0.0,
                "status": "idle", "battery_percentage": 100.0,
                "path": [[1.0, 1.0], [5.0, 1.0]]
            },
            "tasks": [{"type": "pick", "position": [2.0, 2.5], "completed": false}]
        }"#;
        let snapshot = Snapshot::parse(text).expect("parse");
        let warehouse = snapshot.warehouse.expect("warehouse");
        assert_eq!(warehouse.obstacles.len(), 1);
        assert_eq!(warehouse.items[0].id, 7);
        assert_eq!(warehouse.racks[0].dims3(1.0), [1.0, 1.0, 5.0]);
        let robot = snapshot.robot.expect("robot");
        assert_eq!(robot.status, RobotStatus::Idle);
        assert_eq!(robot.path.len(), 2);
        assert_eq!(snapshot.tasks.expect("tasks")[0].kind, TaskKind::Pick);
    }

    #[test]
    fn partial_snapshot_leaves_missing_categories_none() {
        let snapshot = Snapshot::parse(r#"{"robot": {"position": [2.0, 3.0], "orientation": 1.2}}"#)
            .expect("parse");
        assert!(snapshot.warehouse.is_none());
        assert!(snapshot.tasks.is_none());
        let robot = snapshot.robot.expect("robot");
        assert_eq!(robot.position, [2.0, 3.0]);
        assert_eq!(robot.status, RobotStatus::Idle);
    }

    #[test]
    fn malformed_fragment_is_skipped_not_fatal() {
        let text = r#"{
            "warehouse": {"width": "not-a-number"},
            "robot": {"position": [0.0, 0.0], "orientation": 0.0, "status": "moving"}
        }"#;
        let snapshot = Snapshot::parse(text).expect("parse");
        assert!(snapshot.warehouse.is_none());
        assert_eq!(snapshot.robot.expect("robot").status, RobotStatus::Moving);
    }

    #[test]
    fn unknown_status_and_task_type_fall_back() {
        let snapshot = Snapshot::parse(
            r#"{"robot": {"position": [0.0, 0.0], "orientation": 0.0, "status": "dancing"},
                "tasks": [{"type": "inspect", "position": [1.0, 1.0]}]}"#,
        )
        .expect("parse");
        let robot = snapshot.robot.expect("robot");
        assert_eq!(robot.status, RobotStatus::Unknown);
        assert_eq!(robot.status.tint(), [0.0, 0.0, 0.0]);
        assert_eq!(snapshot.tasks.expect("tasks")[0].kind, TaskKind::Other);
    }

    #[test]
    fn orientation_radians_alias_is_accepted() {
        let snapshot =
            Snapshot::parse(r#"{"robot": {"position": [1.0, 2.0], "orientation_radians": 1.5}}"#)
                .expect("parse");
        assert!((snapshot.robot.expect("robot").orientation - 1.5).abs() < 1e-6);
    }

    #[test]
    fn non_object_frame_is_an_error() {
        assert!(Snapshot::parse("[1, 2, 3]").is_err());
        assert!(Snapshot::parse("not json").is_err());
    }
}
