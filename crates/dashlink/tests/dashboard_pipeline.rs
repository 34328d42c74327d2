//! End-to-end tests for the dashboard engine: telemetry in, envelopes out,
//! viewer commands back toward the robot.

use std::sync::Arc;

use async_channel::{Receiver, unbounded};
use bevy::prelude::*;
use serde_json::{Value, json};

use dashlink::{
    DashboardHandle, DashboardPlugin, FeedKind, ListenerId, MapState, OutboundCommand,
    ViewerListener,
};

fn create_test_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(DashboardPlugin);
    app
}

fn handle(app: &App) -> DashboardHandle {
    app.world().resource::<DashboardHandle>().clone()
}

/// Attach a channel-backed viewer and pump one frame so the attach and its
/// snapshot land.
fn attach_viewer(app: &mut App) -> (ListenerId, Receiver<Arc<str>>) {
    let handle = handle(app);
    let id = handle.allocate_listener_id();
    let (tx, rx) = unbounded();
    handle.register_listener(ViewerListener::new(id, tx));
    app.update();
    (id, rx)
}

fn drain(rx: &Receiver<Arc<str>>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        events.push(serde_json::from_str(&payload).expect("valid event json"));
    }
    events
}

fn of_type<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
    events.iter().filter(|event| event["type"] == kind).collect()
}

#[test]
fn new_viewer_receives_snapshot() {
    let mut app = create_test_app();
    let (_, rx) = attach_viewer(&mut app);

    let events = drain(&rx);
    // No static map yet, so the snapshot is status + poses + path.
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["type"], "STATUS_UPDATE");
    assert_eq!(events[1]["type"], "POSE_DATA");
    assert_eq!(events[2]["type"], "PATH_UPDATE");

    handle(&app).ingest_telemetry(
        FeedKind::MapStatic,
        json!({"info": {"resolution": 0.05, "width": 2, "height": 2}, "data": [0, -1, 100, 50]}),
    );
    app.update();

    let (_, rx2) = attach_viewer(&mut app);
    let events = drain(&rx2);
    assert_eq!(events.len(), 4);
    assert_eq!(events[1]["type"], "MAP_DATA");
    assert!(events[1]["mapData"]["occupancyGridImage"].is_string());
}

#[test]
fn battery_fraction_normalizes_and_duplicates_suppress() {
    let mut app = create_test_app();
    let (_, rx) = attach_viewer(&mut app);
    drain(&rx);

    let handle = handle(&app);
    handle.ingest_telemetry(FeedKind::StatusBattery, json!({"percentage": 0.87}));
    app.update();

    let events = drain(&rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "STATUS_UPDATE");
    assert_eq!(events[0]["batteryPercentage"], 87.0);

    handle.ingest_telemetry(FeedKind::StatusBattery, json!({"percentage": 0.87}));
    app.update();
    assert!(drain(&rx).is_empty());
}

#[test]
fn notification_count_matches_real_changes() {
    let mut app = create_test_app();
    let (_, rx) = attach_viewer(&mut app);
    drain(&rx);

    let handle = handle(&app);
    handle.ingest_telemetry(FeedKind::StatusWifi, json!({"data": true}));
    handle.ingest_telemetry(FeedKind::StatusWifi, json!({"data": true}));
    handle.ingest_telemetry(FeedKind::StatusWifi, json!(true));
    handle.ingest_telemetry(FeedKind::StatusComms, json!({"value": true}));
    app.update();

    let events = drain(&rx);
    assert_eq!(of_type(&events, "STATUS_UPDATE").len(), 2);
}

#[test]
fn static_map_is_rendered_once() {
    let mut app = create_test_app();
    let (_, rx) = attach_viewer(&mut app);
    drain(&rx);

    let message =
        json!({"info": {"resolution": 0.05, "width": 2, "height": 2}, "data": [0, -1, 100, 50]});
    let handle = handle(&app);
    handle.ingest_telemetry(FeedKind::MapStatic, message.clone());
    app.update();
    handle.ingest_telemetry(FeedKind::MapStatic, message);
    app.update();

    let events = drain(&rx);
    assert_eq!(of_type(&events, "MAP_DATA").len(), 1);
    assert_eq!(app.world().resource::<MapState>().raster_render_count(), 1);
}

#[test]
fn failing_viewer_does_not_disturb_the_rest() {
    let mut app = create_test_app();

    let handle = handle(&app);
    let dead_id = handle.allocate_listener_id();
    let (dead_tx, dead_rx) = unbounded::<Arc<str>>();
    drop(dead_rx);
    handle.register_listener(ViewerListener::new(dead_id, dead_tx));
    app.update();

    let (_, live_rx) = attach_viewer(&mut app);
    drain(&live_rx);

    handle.ingest_telemetry(FeedKind::StatusPi, json!(true));
    app.update();

    let events = drain(&live_rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["isRaspberryPiConnected"], true);
    // The failing viewer stays attached until its transport detaches it.
    assert_eq!(app.world().resource::<dashlink::ViewerHub>().listener_count(), 2);
}

#[test]
fn deactivating_path_module_cancels_navigation_once() {
    let mut app = create_test_app();
    let (viewer, rx) = attach_viewer(&mut app);
    drain(&rx);

    let handle = handle(&app);
    let commands = handle.outbound_commands();

    handle.submit_viewer_command(viewer, r#"{"isPathModuleActive":true}"#.to_string());
    app.update();
    assert!(commands.is_empty());
    let events = drain(&rx);
    assert_eq!(of_type(&events, "STATUS_UPDATE")[0]["mode"], "Running Path Module");

    handle.submit_viewer_command(viewer, r#"{"isPathModuleActive":false}"#.to_string());
    app.update();
    assert_eq!(
        commands.try_recv().expect("one command"),
        OutboundCommand::CancelNavigation
    );
    assert!(commands.is_empty());
    drain(&rx);

    handle.submit_viewer_command(viewer, r#"{"isPathModuleActive":false}"#.to_string());
    app.update();
    assert!(commands.is_empty());
    assert!(drain(&rx).is_empty());
}

#[test]
fn dock_commands_follow_viewer_intent_only() {
    let mut app = create_test_app();
    let (viewer, rx) = attach_viewer(&mut app);
    drain(&rx);

    let handle = handle(&app);
    let commands = handle.outbound_commands();

    // Robot-reported dock state mutates without echoing a command.
    handle.ingest_telemetry(FeedKind::PathDockStatus, json!({"is_docked": true}));
    app.update();
    assert!(commands.is_empty());
    let events = drain(&rx);
    assert_eq!(of_type(&events, "STATUS_UPDATE")[0]["isDocked"], true);

    // Viewer asks to undock: state change plus exactly one command.
    handle.submit_viewer_command(viewer, r#"{"dockStatus":false}"#.to_string());
    app.update();
    assert_eq!(commands.try_recv().expect("one command"), OutboundCommand::Undock);

    // Asking again for the current state commands nothing.
    handle.submit_viewer_command(viewer, r#"{"dockStatus":false}"#.to_string());
    app.update();
    assert!(commands.is_empty());

    handle.submit_viewer_command(viewer, r#"{"dockStatus":true}"#.to_string());
    app.update();
    assert_eq!(commands.try_recv().expect("one command"), OutboundCommand::Dock);
}

#[test]
fn feedback_flows_from_planner_goals_to_summary() {
    let mut app = create_test_app();
    let (viewer, rx) = attach_viewer(&mut app);

    let handle = handle(&app);
    handle.submit_viewer_command(viewer, r#"{"isPathModuleActive":true}"#.to_string());
    app.update();

    handle.ingest_telemetry(
        FeedKind::PathRuleOutput,
        json!({
            "goal_type": "global",
            "position": {"x": 2.0, "y": 1.0},
            "rule": "IF clear THEN go",
            "timestamp": 100.0
        }),
    );
    handle.ingest_telemetry(
        FeedKind::PathRuleOutput,
        json!({
            "goal_type": "intermediate",
            "position": {"x": 1.0, "y": 0.5},
            "rule": "IF near THEN slow",
            "timestamp": 105.0
        }),
    );
    app.update();
    let events = drain(&rx);
    let path_updates = of_type(&events, "PATH_UPDATE");
    let history = path_updates
        .last()
        .expect("path update emitted")["pathHistory"]
        .as_array()
        .expect("history array");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["id"], "goal_1");
    assert_eq!(history[1]["id"], "goal_2");
    assert_eq!(history[1]["goalType"], "intermediate");
    assert_eq!(history[1]["plannerOutput"], "IF near THEN slow");

    handle.submit_viewer_command(
        viewer,
        r#"{"goalId":"goal_2","feedback":"good"}"#.to_string(),
    );
    app.update();
    let first = drain(&rx);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0]["type"], "FEEDBACK_ENTRY");
    assert_eq!(first[0]["startPoint"], "global");
    assert_eq!(first[0]["endPoint"], "intermediate");
    assert_eq!(first[0]["duration"], 5.0);
    assert_eq!(first[1]["type"], "FEEDBACK_SUMMARY");
    assert_eq!(first[1]["totalGoodRatings"], 1);
    assert_eq!(first[1]["goodRatio"], 1.0);
    assert_eq!(first[1]["badRatio"], 0.0);

    // Re-applying identical feedback re-emits the identical pair.
    handle.submit_viewer_command(
        viewer,
        r#"{"goalId":"goal_2","feedback":"good"}"#.to_string(),
    );
    app.update();
    assert_eq!(drain(&rx), first);
}

#[test]
fn planner_output_is_gated_and_decoded_defensively() {
    let mut app = create_test_app();
    let (viewer, rx) = attach_viewer(&mut app);
    drain(&rx);

    let handle = handle(&app);

    // Inactive module: planner chatter is dropped.
    handle.ingest_telemetry(
        FeedKind::PathRuleOutput,
        json!({"goal_type": "global", "position": {"x": 1.0}}),
    );
    app.update();
    assert!(drain(&rx).is_empty());

    handle.submit_viewer_command(viewer, r#"{"isPathModuleActive":true}"#.to_string());
    app.update();
    drain(&rx);

    // Malformed stringified payload: logged and dropped, never fatal.
    handle.ingest_telemetry(FeedKind::PathRuleOutput, json!("{not json"));
    app.update();
    assert!(drain(&rx).is_empty());

    // Stringified but well-formed payloads decode like objects.
    handle.ingest_telemetry(
        FeedKind::PathRuleOutput,
        json!(r#"{"goal_type":"intermediate","position":{"x":0.5},"rule":"r"}"#),
    );
    app.update();
    let events = drain(&rx);
    assert_eq!(of_type(&events, "PATH_UPDATE").len(), 1);
    assert_eq!(of_type(&events, "POSE_DATA").len(), 1);
}

#[test]
fn teleop_commands_republish_twists() {
    let mut app = create_test_app();
    let (viewer, rx) = attach_viewer(&mut app);
    drain(&rx);

    let handle = handle(&app);
    let commands = handle.outbound_commands();

    handle.submit_viewer_command(viewer, r#"{"command":"forward"}"#.to_string());
    handle.submit_viewer_command(viewer, r#"{"command":"stop"}"#.to_string());
    app.update();

    let forward = commands.try_recv().expect("drive command");
    match forward {
        OutboundCommand::Drive { twist } => {
            assert_eq!(twist.linear.x, 0.5);
            assert_eq!(twist.angular.z, 0.0);
        }
        other => panic!("expected drive, got {:?}", other),
    }
    let stop = commands.try_recv().expect("stop command");
    match stop {
        OutboundCommand::Drive { twist } => assert_eq!(twist.linear.x, 0.0),
        other => panic!("expected drive, got {:?}", other),
    }

    // Unrecognized envelopes are dropped without disturbing anything.
    handle.submit_viewer_command(viewer, r#"{"bogus": 1}"#.to_string());
    app.update();
    assert!(commands.is_empty());
    assert!(drain(&rx).is_empty());
}

#[test]
fn detached_viewer_stops_receiving() {
    let mut app = create_test_app();
    let (viewer, rx) = attach_viewer(&mut app);
    drain(&rx);

    let handle = handle(&app);
    handle.unregister_listener(viewer);
    app.update();

    handle.ingest_telemetry(FeedKind::StatusWifi, json!(true));
    app.update();
    assert!(drain(&rx).is_empty());
}
