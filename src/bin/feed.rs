//! Synthetic snapshot feed: a small WebSocket server that publishes a moving
//! robot in a generated warehouse so the viewer can run without the real
//! simulator. Serves one client at a time.

use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::{json, Value};
use tungstenite::Message;

const TICK: Duration = Duration::from_millis(100);
const ROBOT_SPEED: f32 = 1.5; // m/s

fn main() {
    env_logger::init();
    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:9002".to_string());
    if let Err(err) = serve(&addr) {
        eprintln!("feed error: {err:?}");
        std::process::exit(1);
    }
}

fn serve(addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
    log::info!("[feed] listening on ws://{addr}");
    for stream in listener.incoming() {
        let stream = stream.context("accepting TCP connection")?;
        let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
        log::info!("[feed] client connected: {peer}");
        match handle_client(stream) {
            Ok(()) => log::info!("[feed] client disconnected: {peer}"),
            Err(err) => log::warn!("[feed] client {peer} dropped: {err}"),
        }
    }
    Ok(())
}

fn handle_client(stream: TcpStream) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_millis(20)))?;
    let mut socket = tungstenite::accept(stream).context("websocket handshake")?;
    let mut sim = Simulation::new();
    socket.send(Message::Text(sim.full_snapshot().to_string()))?;

    let mut running = true;
    let mut last_tick = Instant::now();
    loop {
        match socket.read() {
            Ok(Message::Text(text)) => match command_of(&text) {
                Some("start_simulation") => {
                    running = true;
                    log::info!("[feed] simulation started");
                }
                Some("stop_simulation") => {
                    running = false;
                    log::info!("[feed] simulation stopped");
                }
                _ => log::debug!("[feed] ignoring frame: {text}"),
            },
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(tungstenite::Error::ConnectionClosed) => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        if running && last_tick.elapsed() >= TICK {
            let dt = last_tick.elapsed().as_secs_f32();
            last_tick = Instant::now();
            sim.step(dt);
            socket.send(Message::Text(sim.incremental_snapshot().to_string()))?;
        }
    }
}

fn command_of(text: &str) -> Option<&'static str> {
    let value: Value = serde_json::from_str(text).ok()?;
    match value.get("command")?.as_str()? {
        "start_simulation" => Some("start_simulation"),
        "stop_simulation" => Some("stop_simulation"),
        _ => None,
    }
}

struct Simulation {
    width: f32,
    length: f32,
    racks: Vec<[f32; 2]>,
    stations: Vec<[f32; 2]>,
    obstacles: Vec<([f32; 2], [f32; 2])>,
    items: Vec<(i64, String, [f32; 2])>,
    waypoints: Vec<[f32; 2]>,
    waypoint_index: usize,
    position: [f32; 2],
    orientation: f32,
    battery: f32,
    status: &'static str,
    dwell: f32,
    tasks_done: usize,
}

impl Simulation {
    fn new() -> Self {
        let mut rng = rand::thread_rng();
        let width = 20.0;
        let length = 30.0;

        // two rows of racks with aisles between, like the reference layout
        let mut racks = Vec::new();
        for i in 0..5 {
            let x = 4.0 + i as f32 * 3.0;
            racks.push([x, length / 3.0]);
            racks.push([x, 2.0 * length / 3.0]);
        }
        let stations = vec![[0.8, 0.8], [width - 0.8, 0.8]];
        let obstacles: Vec<([f32; 2], [f32; 2])> = (0..6)
            .map(|_| {
                let pos = [rng.gen_range(2.0..width - 2.0), rng.gen_range(4.0..length - 4.0)];
                let dims = [rng.gen_range(0.4..1.2), rng.gen_range(0.4..1.2)];
                (pos, dims)
            })
            .collect();
        let kinds = ["crate", "barrel", "box", "pallet"];
        let items: Vec<(i64, String, [f32; 2])> = (0..40)
            .map(|id| {
                let rack = racks[rng.gen_range(0..racks.len())];
                let kind = kinds[rng.gen_range(0..kinds.len())].to_string();
                (id, kind, [rack[0] + rng.gen_range(-0.4..0.4), rack[1] + rng.gen_range(-2.0..2.0)])
            })
            .collect();

        let waypoints = vec![
            [2.0, 2.0],
            [width - 2.0, 2.0],
            [width - 2.0, length - 2.0],
            [2.0, length - 2.0],
            [0.8, 0.8],
        ];

        Self {
            width,
            length,
            racks,
            stations,
            obstacles,
            items,
            waypoints,
            waypoint_index: 0,
            position: [1.0, 1.0],
            orientation: 0.0,
            battery: 100.0,
            status: "idle",
            dwell: 0.0,
            tasks_done: 0,
        }
    }

    fn step(&mut self, dt: f32) {
        if self.dwell > 0.0 {
            self.dwell -= dt;
            if self.dwell <= 0.0 {
                self.status = "moving";
            }
            return;
        }
        let target = self.waypoints[self.waypoint_index];
        let dx = target[0] - self.position[0];
        let dy = target[1] - self.position[1];
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < 0.1 {
            self.waypoint_index = (self.waypoint_index + 1) % self.waypoints.len();
            if self.waypoint_index == 0 {
                self.tasks_done += 1;
            }
            // pause at the charger, dwell briefly elsewhere
            if target == [0.8, 0.8] {
                self.status = "charging";
                self.battery = 100.0;
                self.dwell = 2.0;
            } else {
                self.status = if self.waypoint_index % 2 == 0 { "picking" } else { "placing" };
                self.dwell = 0.8;
            }
            return;
        }
        let step = (ROBOT_SPEED * dt).min(distance);
        self.position[0] += dx / distance * step;
        self.position[1] += dy / distance * step;
        self.orientation = dy.atan2(dx);
        self.battery = (self.battery - dt * 0.4).max(5.0);
        self.status = "moving";
    }

    fn remaining_path(&self) -> Vec<[f32; 2]> {
        let mut path = Vec::new();
        for offset in 0..self.waypoints.len() {
            path.push(self.waypoints[(self.waypoint_index + offset) % self.waypoints.len()]);
        }
        path
    }

    fn robot_fragment(&self) -> Value {
        json!({
            "position": self.position,
            "orientation": self.orientation,
            "status": self.status,
            "battery_percentage": self.battery,
            "dimensions": {"width": 0.5, "length": 0.7, "height": 0.4},
            "path": self.remaining_path(),
        })
    }

    fn tasks_fragment(&self) -> Value {
        let kinds = ["pick", "place", "charge"];
        let tasks: Vec<Value> = self
            .waypoints
            .iter()
            .enumerate()
            .map(|(i, waypoint)| {
                json!({
                    "type": kinds[i % kinds.len()],
                    "position": waypoint,
                    "completed": i < self.tasks_done % self.waypoints.len(),
                })
            })
            .collect();
        Value::Array(tasks)
    }

    fn full_snapshot(&self) -> Value {
        let obstacles: Vec<Value> = self
            .obstacles
            .iter()
            .map(|(pos, dims)| json!({"position": pos, "dimensions": dims}))
            .collect();
        let racks: Vec<Value> = self
            .racks
            .iter()
            .map(|pos| json!({"position": pos, "dimensions": [1.0, 5.0, 1.2]}))
            .collect();
        let items: Vec<Value> = self
            .items
            .iter()
            .map(|(id, kind, pos)| {
                json!({"id": id, "type": kind, "position": pos, "dimensions": [0.25, 0.25, 0.25]})
            })
            .collect();
        let stations: Vec<Value> =
            self.stations.iter().map(|pos| json!({"position": pos})).collect();
        json!({
            "warehouse": {
                "width": self.width,
                "length": self.length,
                "obstacles": obstacles,
                "racks": racks,
                "items": items,
                "charging_stations": stations,
            },
            "robot": self.robot_fragment(),
            "tasks": self.tasks_fragment(),
        })
    }

    fn incremental_snapshot(&self) -> Value {
        json!({
            "robot": self.robot_fragment(),
            "tasks": self.tasks_fragment(),
        })
    }
}
