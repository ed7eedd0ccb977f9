// crates/daemon/src/session.rs
use std::collections::HashMap;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use command::{Descriptor, Error, Identity};
use protocol::{LaunchRequest, Message};
use tracing::{debug, info, warn};

use crate::cookie;

const STDIN_QUEUE_FRAMES: usize = 32;
const IO_CHUNK: usize = 8192;
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

const SIGTERM: i32 = 15;
const SIGKILL: i32 = 9;

enum StdinOp {
    Data(Vec<u8>),
    Close,
}

struct ChildSlot {
    stdin: Option<SyncSender<StdinOp>>,
    alive: Arc<AtomicBool>,
}

type ChildTable = Arc<Mutex<HashMap<u32, ChildSlot>>>;

/// Serves one authenticated connection until the peer goes away, then
/// tears down whatever children it left running.
pub(crate) fn serve_connection(
    stream: TcpStream,
    cookie: &[u8],
    grace: Duration,
) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let (frames, outbox) = mpsc::channel::<Message>();
    let writer = thread::Builder::new()
        .name("forker-writer".into())
        .spawn(move || write_loop(stream, outbox))?;

    let authenticated = handshake(&mut reader, cookie, &frames, &peer)?;
    let result = if authenticated {
        debug!(%peer, "session ready");
        let mut session = Session::new(frames.clone(), grace);
        let result = session.run(&mut reader);
        session.shutdown();
        result
    } else {
        Ok(())
    };

    drop(frames);
    let _ = writer.join();
    result
}

/// Consumes frames until a Hello decides the session's fate. Pings are
/// answered at any point so liveness probes need no cookie.
fn handshake(
    reader: &mut impl Read,
    cookie: &[u8],
    frames: &Sender<Message>,
    peer: &std::net::SocketAddr,
) -> io::Result<bool> {
    loop {
        let msg = match Message::read_from(reader) {
            Ok(msg) => msg,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e),
        };
        match msg {
            Message::Ping => {
                let _ = frames.send(Message::Pong);
            }
            Message::Hello { cookie: presented } => {
                if cookie::matches(&presented, cookie) {
                    let _ = frames.send(Message::HelloOk);
                    return Ok(true);
                }
                log_rejection(peer);
                let _ = frames.send(Message::HelloReject {
                    reason: "cookie mismatch".to_string(),
                });
                return Ok(false);
            }
            other => {
                let _ = frames.send(Message::HelloReject {
                    reason: "expected hello".to_string(),
                });
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected {:?} before hello", other.kind()),
                ));
            }
        }
    }
}

// A flood of bad cookies should not become a flood of log lines.
fn log_rejection(peer: &std::net::SocketAddr) {
    static LAST: OnceLock<Mutex<Option<Instant>>> = OnceLock::new();
    let last = LAST.get_or_init(|| Mutex::new(None));
    let mut last = last.lock().expect("rejection log lock");
    let now = Instant::now();
    if last.map_or(true, |t| now.duration_since(t) >= Duration::from_secs(1)) {
        warn!(%peer, "rejected connection with bad cookie");
        *last = Some(now);
    }
}

fn write_loop(stream: TcpStream, outbox: Receiver<Message>) {
    let mut w = BufWriter::new(stream);
    for msg in outbox {
        if msg.write_to(&mut w).is_err() || w.flush().is_err() {
            break;
        }
    }
}

struct Session {
    children: ChildTable,
    frames: Sender<Message>,
    grace: Duration,
}

impl Session {
    fn new(frames: Sender<Message>, grace: Duration) -> Self {
        Session {
            children: Arc::new(Mutex::new(HashMap::new())),
            frames,
            grace,
        }
    }

    fn run(&mut self, reader: &mut impl Read) -> io::Result<()> {
        loop {
            let msg = match Message::read_from(reader) {
                Ok(msg) => msg,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            };
            match msg {
                Message::Launch(req) => self.handle_launch(req),
                Message::Stdin { pid, data } => self.forward_stdin(pid, StdinOp::Data(data)),
                Message::StdinClose { pid } => {
                    self.forward_stdin(pid, StdinOp::Close);
                    if let Some(slot) = self.children.lock().expect("child table").get_mut(&pid) {
                        slot.stdin = None;
                    }
                }
                Message::Kill { pid, signal } => {
                    if !self.owns(pid) {
                        continue;
                    }
                    #[cfg(unix)]
                    if let Err(e) = spawn::kill_group(pid, signal) {
                        warn!(pid, signal, error = %e, "kill failed");
                    }
                }
                Message::Ping => {
                    let _ = self.frames.send(Message::Pong);
                }
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("client sent server-only frame {:?}", other.kind()),
                    ));
                }
            }
        }
    }

    fn owns(&self, pid: u32) -> bool {
        self.children.lock().expect("child table").contains_key(&pid)
    }

    /// Blocking send into the child's bounded stdin queue. A full queue
    /// stalls this reader, which is the backpressure the wire contract
    /// asks for.
    fn forward_stdin(&self, pid: u32, op: StdinOp) {
        let tx = self
            .children
            .lock()
            .expect("child table")
            .get(&pid)
            .and_then(|slot| slot.stdin.clone());
        if let Some(tx) = tx {
            let _ = tx.send(op);
        }
    }

    fn handle_launch(&mut self, req: LaunchRequest) {
        match self.launch(&req) {
            Ok(pid) => info!(pid, argv = ?req.argv, "child launched"),
            Err(err) => {
                debug!(argv = ?req.argv, error = %err, "launch failed");
                let _ = self.frames.send(Message::Failed {
                    reason: err.to_string(),
                    errno: errno_of(&err),
                });
            }
        }
    }

    fn launch(&mut self, req: &LaunchRequest) -> command::Result<u32> {
        let desc = descriptor_from(req)?;
        let desc = elevation_wrap(desc)?;
        let plan = spawn::StdioPlan::remote(req.io_mode)?;
        let mut child = spawn::spawn_with(&desc, plan)?;
        let pid = child.pid();
        let _ = self.frames.send(Message::Launched { pid });

        let stdin = child.take_stdin().map(|mut sink| {
            let (tx, rx) = mpsc::sync_channel::<StdinOp>(STDIN_QUEUE_FRAMES);
            thread::spawn(move || {
                for op in rx {
                    match op {
                        StdinOp::Data(data) => {
                            if sink.write_all(&data).and_then(|()| sink.flush()).is_err() {
                                break;
                            }
                        }
                        StdinOp::Close => break,
                    }
                }
            });
            tx
        });

        let mut pumps = Vec::new();
        if let Some(out) = child.take_stdout() {
            pumps.push(pump(out, pid, self.frames.clone(), true));
        }
        if let Some(err) = child.take_stderr() {
            pumps.push(pump(err, pid, self.frames.clone(), false));
        }

        let alive = Arc::new(AtomicBool::new(true));
        let slot = ChildSlot {
            stdin,
            alive: alive.clone(),
        };
        self.children.lock().expect("child table").insert(pid, slot);

        let frames = self.frames.clone();
        let children = self.children.clone();
        thread::spawn(move || {
            let status = child
                .wait()
                .map(|s| s.into_raw())
                .unwrap_or(command::PROTOCOL_EXIT_CODE);
            // Exit must be the child's final frame, after the pumps have
            // drained every byte the child wrote.
            for pump in pumps {
                let _ = pump.join();
            }
            alive.store(false, Ordering::SeqCst);
            children.lock().expect("child table").remove(&pid);
            let _ = frames.send(Message::Exit { pid, status });
        });

        Ok(pid)
    }

    /// Connection gone: SIGTERM every survivor's process group, give
    /// them the grace period, then SIGKILL the stragglers.
    fn shutdown(&self) {
        let survivors: Vec<(u32, Arc<AtomicBool>)> = {
            let table = self.children.lock().expect("child table");
            table
                .iter()
                .filter(|(_, slot)| slot.alive.load(Ordering::SeqCst))
                .map(|(pid, slot)| (*pid, slot.alive.clone()))
                .collect()
        };
        if survivors.is_empty() {
            return;
        }
        info!(count = survivors.len(), "terminating orphaned children");
        #[cfg(unix)]
        {
            for (pid, _) in &survivors {
                let _ = spawn::kill_group(*pid, SIGTERM);
            }
            let deadline = Instant::now() + self.grace;
            while Instant::now() < deadline
                && survivors.iter().any(|(_, alive)| alive.load(Ordering::SeqCst))
            {
                thread::sleep(SHUTDOWN_POLL);
            }
            for (pid, alive) in &survivors {
                if alive.load(Ordering::SeqCst) {
                    let _ = spawn::kill_group(*pid, SIGKILL);
                }
            }
        }
    }
}

fn pump(
    mut stream: Box<dyn Read + Send>,
    pid: u32,
    frames: Sender<Message>,
    stdout: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut chunk = [0u8; IO_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let data = chunk[..n].to_vec();
                    let msg = if stdout {
                        Message::Stdout { pid, data }
                    } else {
                        Message::Stderr { pid, data }
                    };
                    if frames.send(msg).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn descriptor_from(req: &LaunchRequest) -> command::Result<Descriptor> {
    let mut desc = Descriptor::new(req.argv.clone())?
        .with_envs(req.env.iter().cloned())?
        .with_io_mode(req.io_mode)
        .with_identity(req.identity.clone())
        .with_redirect_err_to_out(req.redirect_err_to_out);
    if let Some(cwd) = &req.cwd {
        desc = desc.with_cwd(cwd);
    }
    desc.validate()?;
    Ok(desc)
}

/// How this daemon satisfies an identity request.
///
/// Running privileged, the post-fork uid/gid switch covers every case,
/// downgrades included. Unprivileged, the launch is re-spawned through
/// a non-interactive `sudo -n` when one exists; there is no tty to
/// prompt on, so anything else is refused.
fn elevation_wrap(desc: Descriptor) -> command::Result<Descriptor> {
    if desc.identity().is_current() {
        return Ok(desc);
    }
    #[cfg(unix)]
    {
        if nix::unistd::Uid::effective().is_root() {
            return Ok(desc);
        }
        if command::has_command("sudo") {
            let mut argv = vec!["sudo".to_string(), "-n".to_string()];
            match desc.identity() {
                Identity::Administrator | Identity::FixedPasswordSudo(_) => {}
                Identity::Uid(uid) => {
                    argv.push("-u".to_string());
                    argv.push(format!("#{uid}"));
                }
                Identity::Username(name) => {
                    argv.push("-u".to_string());
                    argv.push(name.clone());
                }
                Identity::Current => unreachable!(),
            }
            argv.push("--".to_string());
            argv.extend(desc.argv().iter().cloned());
            return Ok(desc.with_argv(argv)?.with_identity(Identity::Current));
        }
        Err(Error::ElevationUnavailable)
    }
    #[cfg(not(unix))]
    {
        let _ = desc;
        Err(Error::UnsupportedPlatform)
    }
}

fn errno_of(err: &Error) -> i32 {
    match err {
        Error::ExecFailed { errno, .. } => *errno,
        Error::ElevationDenied => 1,
        Error::Io(e) => e.raw_os_error().unwrap_or(0),
        _ => 0,
    }
}
