use wareview::config::AppConfig;
use wareview::snapshot::{RobotStatus, Snapshot};
use wareview::App;

fn app() -> App {
    App::new(AppConfig::default())
}

fn parse(text: &str) -> Snapshot {
    Snapshot::parse(text).expect("snapshot should parse")
}

#[test]
fn initial_snapshot_builds_robot_and_hud() {
    let mut app = app();
    app.apply_snapshot(parse(
        r#"{
            "warehouse": {"width": 20.0, "length": 30.0},
            "robot": {"position": [1.0, 1.0], "orientation": 0.0,
                      "status": "idle", "battery_percentage": 100.0},
            "tasks": []
        }"#,
    ));

    assert!(app.robot().is_initialized());
    let position = app.robot().rendered_position();
    assert!((position.x - 1.0).abs() < 1e-5);
    assert!((position.z - 1.0).abs() < 1e-5);
    assert_eq!(app.hud().battery_percentage, Some(100.0));
    assert_eq!(app.hud().status, RobotStatus::Idle);
    // idle: no emissive tint on any chassis part
    assert!(app.robot().entities().all(|e| e.material.emissive == [0.0, 0.0, 0.0]));
    assert_eq!(app.warehouse().dimensions(), Some((20.0, 30.0)));
}

#[test]
fn status_update_changes_tint_but_not_position() {
    let mut app = app();
    app.apply_snapshot(parse(
        r#"{"robot": {"position": [1.0, 1.0], "orientation": 0.0, "status": "idle"}}"#,
    ));
    let before = app.robot().rendered_position();

    // incremental update: same position field, new status
    app.apply_snapshot(parse(
        r#"{"robot": {"position": [1.0, 1.0], "orientation": 0.0, "status": "moving"}}"#,
    ));
    assert_eq!(app.hud().status, RobotStatus::Moving);
    let body = app.robot().entities().next().expect("chassis body");
    assert_eq!(body.material.emissive, RobotStatus::Moving.tint());
    let after = app.robot().rendered_position();
    assert!((after - before).length() < 1e-6, "position must not move on a status-only change");
}

#[test]
fn sixty_items_render_as_fifty() {
    let mut app = app();
    let items: Vec<String> = (0..60)
        .map(|id| {
            format!(r#"{{"id": {id}, "type": "crate", "position": [{}.0, 2.0]}}"#, id % 18 + 1)
        })
        .collect();
    let text = format!(
        r#"{{"warehouse": {{"width": 20.0, "length": 30.0, "items": [{}]}}}}"#,
        items.join(",")
    );
    app.apply_snapshot(parse(&text));
    assert_eq!(app.warehouse().item_count(), 50);

    // applying the same snapshot again must not change anything
    app.apply_snapshot(parse(&text));
    assert_eq!(app.warehouse().item_count(), 50);
}

#[test]
fn completed_tasks_produce_no_marker() {
    let mut app = app();
    app.apply_snapshot(parse(
        r#"{"tasks": [
            {"type": "place", "position": [5.0, 5.0], "completed": false},
            {"type": "pick", "position": [8.0, 8.0], "completed": true}
        ]}"#,
    ));
    assert_eq!(app.tasks().marker_count(), 1);
    assert_eq!(app.hud().tasks_pending, 1);
    assert_eq!(app.hud().tasks_completed, 1);
}

#[test]
fn malformed_category_keeps_previous_visuals() {
    let mut app = app();
    app.apply_snapshot(parse(
        r#"{"warehouse": {"width": 20.0, "length": 30.0,
             "obstacles": [{"position": [3.0, 3.0], "dimensions": [1.0, 1.0]}]}}"#,
    ));
    assert_eq!(app.warehouse().obstacle_count(), 1);

    // warehouse fragment is garbage this time; robot fragment still applies
    app.apply_snapshot(parse(
        r#"{"warehouse": {"width": "broken"},
            "robot": {"position": [2.0, 2.0], "orientation": 0.0, "status": "moving"}}"#,
    ));
    assert_eq!(app.warehouse().obstacle_count(), 1, "previous obstacles must persist");
    assert_eq!(app.hud().status, RobotStatus::Moving);
}

#[test]
fn idle_stream_freezes_scene_state() {
    let mut app = app();
    app.apply_snapshot(parse(
        r#"{
            "warehouse": {"width": 20.0, "length": 30.0,
                "items": [{"id": 1, "type": "crate", "position": [4.0, 4.0]}]},
            "robot": {"position": [1.0, 1.0], "orientation": 0.5, "status": "moving"}
        }"#,
    ));
    let item_count = app.warehouse().item_count();
    let robot_position = app.robot().rendered_position();
    let status = app.hud().status;

    // transport drop delivers no snapshots; animation alone must not drift
    // the authoritative state
    for _ in 0..60 {
        app.robot_mut().animate(0.016);
    }
    assert_eq!(app.warehouse().item_count(), item_count);
    assert_eq!(app.hud().status, status);
    let drifted = (app.robot().rendered_position() - robot_position).length();
    assert!(drifted < 1e-4, "rendered pose must stay on the last snapshot pose");
}

#[test]
fn path_toggle_and_rebuild() {
    let mut app = app();
    app.apply_snapshot(parse(
        r#"{"robot": {"position": [1.0, 1.0], "orientation": 0.0,
                       "path": [[5.0, 1.0], [5.0, 6.0]]}}"#,
    ));
    assert_eq!(app.robot().path_points().expect("polyline").len(), 3);

    // an empty path in the next snapshot removes the polyline entirely
    app.apply_snapshot(parse(
        r#"{"robot": {"position": [1.0, 1.0], "orientation": 0.0, "path": []}}"#,
    ));
    assert!(app.robot().path_points().is_none());
}
