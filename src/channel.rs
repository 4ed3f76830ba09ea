use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::snapshot::Snapshot;

const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Events surfaced to the render loop, drained once per frame in arrival
/// order. Snapshots are never coalesced.
#[derive(Debug)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: String },
    Snapshot(Box<Snapshot>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    StartSimulation,
    StopSimulation,
}

impl ControlCommand {
    pub fn as_json(self) -> &'static str {
        match self {
            ControlCommand::StartSimulation => r#"{"command":"start_simulation"}"#,
            ControlCommand::StopSimulation => r#"{"command":"stop_simulation"}"#,
        }
    }
}

/// Owns the background WebSocket worker. All scene mutation stays on the
/// render thread; this type only ferries parsed snapshots in and control
/// commands out over mpsc channels.
pub struct SyncChannel {
    events: Receiver<ChannelEvent>,
    commands: Sender<ControlCommand>,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SyncChannel {
    /// Spawns the worker thread; it connects, reads frames, and reconnects
    /// with a fixed backoff for the life of the session.
    pub fn connect(url: &str, reconnect_delay: Duration) -> Self {
        let (event_tx, events) = mpsc::channel();
        let (commands, command_rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = {
            let url = url.to_string();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("wareview-sync".to_string())
                .spawn(move || run_worker(&url, reconnect_delay, event_tx, command_rx, shutdown))
                .expect("failed to spawn sync worker thread")
        };
        Self { events, commands, shutdown, worker: Some(worker) }
    }

    /// Next queued event, if any. Non-blocking; called in a loop each frame.
    pub fn poll(&self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    pub fn send(&self, command: ControlCommand) {
        if self.commands.send(command).is_err() {
            log::warn!("[sync] worker gone; dropping {command:?}");
        }
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(
    url: &str,
    reconnect_delay: Duration,
    events: Sender<ChannelEvent>,
    commands: Receiver<ControlCommand>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match tungstenite::connect(url) {
            Ok((mut socket, _response)) => {
                configure_read_timeout(&mut socket);
                log::info!("[sync] connected to {url}");
                if events.send(ChannelEvent::Connected).is_err() {
                    return;
                }
                if let Some(reason) = serve_connection(&mut socket, &events, &commands, &shutdown) {
                    log::warn!("[sync] connection lost: {reason}");
                    if events.send(ChannelEvent::Disconnected { reason }).is_err() {
                        return;
                    }
                } else {
                    // clean shutdown requested
                    let _ = socket.close(None);
                    return;
                }
            }
            Err(err) => {
                let reason = err.to_string();
                log::warn!("[sync] connect to {url} failed: {reason}");
                if events.send(ChannelEvent::Disconnected { reason }).is_err() {
                    return;
                }
            }
        }
        sleep_interruptible(reconnect_delay, &shutdown);
    }
}

/// Pumps one live connection: flushes outbound commands between reads and
/// forwards every inbound text frame as a snapshot. Returns the disconnect
/// reason, or `None` when shutdown was requested.
fn serve_connection(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
    events: &Sender<ChannelEvent>,
    commands: &Receiver<ControlCommand>,
    shutdown: &Arc<AtomicBool>,
) -> Option<String> {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return None;
        }
        while let Ok(command) = commands.try_recv() {
            if let Err(err) = socket.send(Message::Text(command.as_json().to_string())) {
                return Some(format!("command send failed: {err}"));
            }
        }
        match socket.read() {
            Ok(Message::Text(text)) => match Snapshot::parse(&text) {
                Ok(snapshot) => {
                    if events.send(ChannelEvent::Snapshot(Box::new(snapshot))).is_err() {
                        return None;
                    }
                }
                Err(err) => log::warn!("[sync] unreadable frame: {err}"),
            },
            Ok(Message::Close(_)) => return Some("closed by peer".to_string()),
            Ok(_) => {} // ping/pong/binary: nothing to do
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(err) => return Some(err.to_string()),
        }
    }
}

fn configure_read_timeout(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>) {
    if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
        if let Err(err) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
            log::warn!("[sync] read timeout unavailable: {err}");
        }
    }
}

fn sleep_interruptible(total: Duration, shutdown: &Arc<AtomicBool>) {
    let slice = Duration::from_millis(50);
    let mut remaining = total;
    while remaining > Duration::ZERO && !shutdown.load(Ordering::Relaxed) {
        let step = remaining.min(slice);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_commands_serialize_to_wire_form() {
        assert_eq!(ControlCommand::StartSimulation.as_json(), r#"{"command":"start_simulation"}"#);
        assert_eq!(ControlCommand::StopSimulation.as_json(), r#"{"command":"stop_simulation"}"#);
        let value: serde_json::Value =
            serde_json::from_str(ControlCommand::StartSimulation.as_json()).expect("valid json");
        assert_eq!(value["command"], "start_simulation");
    }

    #[test]
    fn dropped_channel_stops_worker_quickly() {
        // nothing listens on this port; the worker must be spinning through
        // connect failures and still exit promptly on drop
        let channel = SyncChannel::connect("ws://127.0.0.1:9", Duration::from_millis(100));
        let saw_failure = (0..50).any(|_| {
            std::thread::sleep(Duration::from_millis(20));
            matches!(channel.poll(), Some(ChannelEvent::Disconnected { .. }))
        });
        assert!(saw_failure, "expected a connect-failure event");
        drop(channel); // join must not hang
    }
}
