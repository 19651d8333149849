use brewtty::app::{Bridge, LogLevel, Logger};
use brewtty::config::Config;
use brewtty::serial::fake::FakeSerialPort;
use brewtty::socket::{CommandSocket, SocketConfig};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn send_command(addr: std::net::SocketAddr, message: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(message.as_bytes()).unwrap();
    stream
        .shutdown(std::net::Shutdown::Write)
        .unwrap();
    let mut reply = String::new();
    let _ = stream.read_to_string(&mut reply);
    reply
}

/// End to end: a client on the TCP socket reads state, mutates it, and
/// finally stops the daemon; the loop exits cleanly.
#[test]
fn daemon_loop_serves_clients_until_quit() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.batch_name = Some("e2e".to_string());
    config.data_dir = dir.path().join("data");
    config.public_dir = dir.path().join("public");
    config.settings_dir = dir.path().join("settings");

    let socket = CommandSocket::bind(&SocketConfig::Tcp {
        host: "127.0.0.1".to_string(),
        port: 0,
    })
    .unwrap();
    let addr = socket.local_addr().unwrap();

    let logger = Logger::new(LogLevel::Error, None);
    let mut bridge = Bridge::new(
        config,
        dir.path().join("config.toml"),
        logger,
        Some(FakeSerialPort::default()),
    )
    .unwrap();

    let client = thread::spawn(move || {
        // the loop is already accepting by the time connect succeeds;
        // retry briefly to avoid a startup race
        let mut replies = Vec::new();
        for _ in 0..50 {
            if TcpStream::connect(addr).is_ok() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        replies.push(send_command(addr, "ack"));
        replies.push(send_command(addr, "getMode"));
        send_command(addr, "setBeer=18.5");
        replies.push(send_command(addr, "getBeer"));
        send_command(addr, "quit");
        replies
    });

    let shutdown = AtomicBool::new(true);
    bridge.run(&socket, &shutdown).unwrap();
    assert!(!bridge.is_running());

    let replies = client.join().unwrap();
    assert_eq!(replies, vec!["ack", "b", "18.5"]);
}
