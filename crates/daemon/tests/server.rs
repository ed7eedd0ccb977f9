#![cfg(unix)]

use std::io::BufReader;
use std::net::{Ipv4Addr, TcpStream};
use std::time::{Duration, Instant};

use command::{Identity, IoMode};
use daemon::{DaemonConfig, Server, ServerHandle};
use protocol::{LaunchRequest, Message};
use tempfile::TempDir;

fn start_daemon(grace: Duration) -> (ServerHandle, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = DaemonConfig {
        port: 0,
        state_dir: dir.path().to_path_buf(),
        grace,
        probe_timeout: Duration::from_millis(300),
    };
    let server = Server::bind(config).unwrap();
    (server.spawn(), dir)
}

struct TestClient {
    reader: BufReader<TcpStream>,
    stream: TcpStream,
}

impl TestClient {
    fn connect(handle: &ServerHandle) -> TestClient {
        let cookie = daemon::cookie::load(handle.cookie_path()).unwrap();
        TestClient::connect_with_cookie(handle, cookie)
    }

    fn connect_with_cookie(handle: &ServerHandle, cookie: Vec<u8>) -> TestClient {
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, handle.port())).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        let mut client = TestClient { reader, stream };
        client.send(Message::Hello { cookie });
        client
    }

    fn send(&mut self, msg: Message) {
        msg.write_to(&mut self.stream).unwrap();
    }

    fn recv(&mut self) -> Message {
        Message::read_from(&mut self.reader).unwrap()
    }

    fn launch(&mut self, argv: &[&str], io_mode: IoMode, redirect: bool) -> u32 {
        self.send(Message::Launch(LaunchRequest {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            cwd: None,
            env: Vec::new(),
            io_mode,
            identity: Identity::Current,
            redirect_err_to_out: redirect,
            pty_rows: 0,
            pty_cols: 0,
            term: None,
        }));
        match self.recv() {
            Message::Launched { pid } => pid,
            other => panic!("expected Launched, got {other:?}"),
        }
    }

    /// Drains frames for one child until its Exit arrives.
    fn collect_until_exit(&mut self, pid: u32) -> (Vec<u8>, Vec<u8>, i32) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        loop {
            match self.recv() {
                Message::Stdout { pid: p, data } if p == pid => out.extend_from_slice(&data),
                Message::Stderr { pid: p, data } if p == pid => err.extend_from_slice(&data),
                Message::Exit { pid: p, status } if p == pid => return (out, err, status),
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }
}

#[test]
fn hello_with_good_cookie_is_accepted() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client = TestClient::connect(&handle);
    assert_eq!(client.recv(), Message::HelloOk);
}

#[test]
fn hello_with_bad_cookie_is_rejected() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client =
        TestClient::connect_with_cookie(&handle, vec![0xde, 0xad, 0xbe, 0xef, 0xde, 0xad]);
    match client.recv() {
        Message::HelloReject { reason } => assert!(reason.contains("cookie")),
        other => panic!("expected HelloReject, got {other:?}"),
    }
    // The daemon drops the connection without accepting a launch.
    let _ = Message::Launch(LaunchRequest {
        argv: vec!["true".to_string()],
        cwd: None,
        env: Vec::new(),
        io_mode: IoMode::Sink,
        identity: Identity::Current,
        redirect_err_to_out: false,
        pty_rows: 0,
        pty_cols: 0,
        term: None,
    })
    .write_to(&mut client.stream);
    assert!(Message::read_from(&mut client.reader).is_err());
}

#[test]
fn ping_answers_without_authentication() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, handle.port())).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut stream = stream;
    Message::Ping.write_to(&mut stream).unwrap();
    assert_eq!(Message::read_from(&mut reader).unwrap(), Message::Pong);
}

#[test]
fn launch_streams_output_and_exit() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client = TestClient::connect(&handle);
    assert_eq!(client.recv(), Message::HelloOk);

    let pid = client.launch(&["echo", "hello"], IoMode::Input, false);
    assert!(pid > 0);
    let (out, err, status) = client.collect_until_exit(pid);
    assert_eq!(out, b"hello\n");
    assert!(err.is_empty());
    assert_eq!(status, 0);
}

#[test]
fn stdin_frames_reach_the_child() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client = TestClient::connect(&handle);
    assert_eq!(client.recv(), Message::HelloOk);

    let pid = client.launch(&["cat"], IoMode::Io, false);
    client.send(Message::Stdin {
        pid,
        data: b"first ".to_vec(),
    });
    client.send(Message::Stdin {
        pid,
        data: b"second".to_vec(),
    });
    client.send(Message::StdinClose { pid });
    let (out, _, status) = client.collect_until_exit(pid);
    assert_eq!(out, b"first second");
    assert_eq!(status, 0);
}

#[test]
fn merged_stderr_produces_no_stderr_frames() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client = TestClient::connect(&handle);
    assert_eq!(client.recv(), Message::HelloOk);

    let pid = client.launch(
        &["sh", "-c", "echo out; echo err 1>&2; echo out2"],
        IoMode::Input,
        true,
    );
    let (out, err, status) = client.collect_until_exit(pid);
    assert_eq!(out, b"out\nerr\nout2\n");
    assert!(err.is_empty());
    assert_eq!(status, 0);
}

#[test]
fn failed_launch_keeps_the_session_alive() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client = TestClient::connect(&handle);
    assert_eq!(client.recv(), Message::HelloOk);

    client.send(Message::Launch(LaunchRequest {
        argv: vec!["forker-no-such-command".to_string()],
        cwd: None,
        env: Vec::new(),
        io_mode: IoMode::Sink,
        identity: Identity::Current,
        redirect_err_to_out: false,
        pty_rows: 0,
        pty_cols: 0,
        term: None,
    }));
    match client.recv() {
        Message::Failed { errno, .. } => assert_eq!(errno, 2),
        other => panic!("expected Failed, got {other:?}"),
    }

    // The same session still launches.
    let pid = client.launch(&["true"], IoMode::Sink, false);
    let (_, _, status) = client.collect_until_exit(pid);
    assert_eq!(status, 0);
}

#[test]
fn kill_terminates_the_child() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client = TestClient::connect(&handle);
    assert_eq!(client.recv(), Message::HelloOk);

    let pid = client.launch(&["sleep", "60"], IoMode::Sink, false);
    client.send(Message::Kill { pid, signal: 15 });
    let (_, _, status) = client.collect_until_exit(pid);
    assert_eq!(status, -15);
}

#[test]
fn concurrent_children_multiplex_one_stream() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client = TestClient::connect(&handle);
    assert_eq!(client.recv(), Message::HelloOk);

    let slow = client.launch(&["sh", "-c", "sleep 0.3; echo slow"], IoMode::Input, false);
    let fast = client.launch(&["echo", "fast"], IoMode::Input, false);
    assert_ne!(slow, fast);

    let mut outputs: std::collections::HashMap<u32, Vec<u8>> = std::collections::HashMap::new();
    let mut exits = 0;
    while exits < 2 {
        match client.recv() {
            Message::Stdout { pid, data } => outputs.entry(pid).or_default().extend(data),
            Message::Stderr { .. } => {}
            Message::Exit { status, .. } => {
                assert_eq!(status, 0);
                exits += 1;
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!(outputs[&slow], b"slow\n");
    assert_eq!(outputs[&fast], b"fast\n");
}

#[test]
fn orphaned_children_are_cleaned_up() {
    let (handle, _dir) = start_daemon(Duration::from_secs(2));
    let mut client = TestClient::connect(&handle);
    assert_eq!(client.recv(), Message::HelloOk);

    let pid = client.launch(&["sleep", "60"], IoMode::Sink, false);
    drop(client);

    let deadline = Instant::now() + Duration::from_secs(6);
    while Instant::now() < deadline {
        if !spawn::process_exists(pid) {
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    panic!("child {pid} survived the connection drop");
}

#[test]
fn second_daemon_refuses_to_start() {
    let (handle, dir) = start_daemon(Duration::from_secs(2));
    let config = DaemonConfig {
        port: handle.port(),
        state_dir: dir.path().to_path_buf(),
        grace: Duration::from_secs(2),
        probe_timeout: Duration::from_millis(300),
    };
    let err = Server::bind(config).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
}
