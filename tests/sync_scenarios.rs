use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use tungstenite::Message;
use wareview::channel::{ChannelEvent, ControlCommand, SyncChannel};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn wait_for<F>(channel: &SyncChannel, mut accept: F) -> Option<ChannelEvent>
where
    F: FnMut(&ChannelEvent) -> bool,
{
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while Instant::now() < deadline {
        if let Some(event) = channel.poll() {
            if accept(&event) {
                return Some(event);
            }
        } else {
            thread::sleep(Duration::from_millis(10));
        }
    }
    None
}

#[test]
fn snapshots_arrive_and_commands_flow_back() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut socket = tungstenite::accept(stream).expect("handshake");
        socket.get_mut().set_read_timeout(Some(Duration::from_millis(50))).expect("read timeout");
        socket
            .send(Message::Text(
                r#"{"robot": {"position": [3.0, 4.0], "orientation": 0.0, "status": "moving"}}"#
                    .to_string(),
            ))
            .expect("send snapshot");

        let deadline = Instant::now() + EVENT_TIMEOUT;
        let mut command = None;
        while Instant::now() < deadline {
            match socket.read() {
                Ok(Message::Text(text)) => {
                    command = Some(text);
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(_) => break,
            }
        }
        // server goes away after the first command; the client must notice
        command
    });

    let channel =
        SyncChannel::connect(&format!("ws://127.0.0.1:{port}"), Duration::from_millis(200));

    let connected = wait_for(&channel, |event| matches!(event, ChannelEvent::Connected));
    assert!(connected.is_some(), "expected a Connected event");

    let snapshot = wait_for(&channel, |event| matches!(event, ChannelEvent::Snapshot(_)));
    let Some(ChannelEvent::Snapshot(snapshot)) = snapshot else {
        panic!("expected a Snapshot event");
    };
    let robot = snapshot.robot.expect("robot fragment");
    assert_eq!(robot.position, [3.0, 4.0]);

    channel.send(ControlCommand::StartSimulation);
    let command = server.join().expect("server thread").expect("command frame");
    assert!(command.contains("start_simulation"));

    // the peer hung up; the adapter must surface the drop and keep trying
    let disconnected =
        wait_for(&channel, |event| matches!(event, ChannelEvent::Disconnected { .. }));
    assert!(disconnected.is_some(), "expected a Disconnected event after server exit");
}

#[test]
fn reconnect_after_drop_delivers_fresh_snapshots() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();

    let server = thread::spawn(move || {
        // first connection: send one frame, drop immediately
        {
            let (stream, _) = listener.accept().expect("accept #1");
            let mut socket = tungstenite::accept(stream).expect("handshake #1");
            socket
                .send(Message::Text(r#"{"tasks": []}"#.to_string()))
                .expect("send first frame");
        }
        // second connection after the client's backoff
        let (stream, _) = listener.accept().expect("accept #2");
        let mut socket = tungstenite::accept(stream).expect("handshake #2");
        socket
            .send(Message::Text(
                r#"{"robot": {"position": [7.0, 7.0], "orientation": 1.0}}"#.to_string(),
            ))
            .expect("send second frame");
        // keep the socket open briefly so the client can read it
        thread::sleep(Duration::from_millis(500));
    });

    let channel =
        SyncChannel::connect(&format!("ws://127.0.0.1:{port}"), Duration::from_millis(100));

    assert!(
        wait_for(&channel, |event| matches!(event, ChannelEvent::Disconnected { .. })).is_some(),
        "first connection should drop"
    );
    let second = wait_for(&channel, |event| {
        matches!(event, ChannelEvent::Snapshot(s) if s.robot.is_some())
    });
    let Some(ChannelEvent::Snapshot(snapshot)) = second else {
        panic!("expected a snapshot from the reconnected session");
    };
    assert_eq!(snapshot.robot.expect("robot").position, [7.0, 7.0]);
    server.join().expect("server thread");
}
