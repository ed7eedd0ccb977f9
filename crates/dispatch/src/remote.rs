// crates/dispatch/src/remote.rs
use std::collections::VecDeque;
use std::io::{self, BufReader, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use command::{Descriptor, Error, ExitStatus, IoMode, Result};
use protocol::{LaunchRequest, Message};
use tracing::debug;

use crate::dispatcher::ClientConfig;
use crate::process::Process;

/// Connects and completes the cookie handshake within the probe
/// timeout. Failure of any step reads as "daemon unreachable".
pub(crate) fn connect(config: &ClientConfig) -> Result<TcpStream> {
    let cookie = std::fs::read(config.cookie_path())
        .map_err(|e| Error::DaemonUnreachable(format!("cookie unavailable: {e}")))?;
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let mut stream = TcpStream::connect_timeout(&addr, config.probe_timeout)
        .map_err(|e| Error::DaemonUnreachable(e.to_string()))?;
    stream
        .set_read_timeout(Some(config.probe_timeout))
        .map_err(Error::Io)?;
    (Message::Hello { cookie })
        .write_to(&mut stream)
        .map_err(|e| Error::DaemonUnreachable(e.to_string()))?;
    let reply = Message::read_from(&mut BufReader::new(stream.try_clone().map_err(Error::Io)?))
        .map_err(|e| Error::DaemonUnreachable(e.to_string()))?;
    match reply {
        Message::HelloOk => {
            stream.set_read_timeout(None).map_err(Error::Io)?;
            Ok(stream)
        }
        Message::HelloReject { reason } => Err(Error::DaemonUnreachable(reason)),
        other => Err(Error::Protocol(format!(
            "unexpected {:?} in handshake",
            other.kind()
        ))),
    }
}

/// Launches one child over its own daemon connection.
///
/// The wire supports several children per connection; this client keeps
/// one child per connection so a dropped handle can never orphan a
/// sibling.
pub(crate) fn launch(desc: &Descriptor, config: &ClientConfig) -> Result<Process> {
    let mut stream = connect(config)?;
    let request = LaunchRequest::from_descriptor(desc);
    Message::Launch(request)
        .write_to(&mut stream)
        .map_err(|e| Error::DaemonUnreachable(e.to_string()))?;

    let mut reader = BufReader::new(stream.try_clone().map_err(Error::Io)?);
    let pid = match Message::read_from(&mut reader).map_err(|e| Error::Protocol(e.to_string()))? {
        Message::Launched { pid } => pid,
        Message::Failed { reason, errno } => return Err(failed_to_error(reason, errno)),
        other => {
            return Err(Error::Protocol(format!(
                "expected launch reply, got {:?}",
                other.kind()
            )))
        }
    };
    debug!(pid, "daemon launched child");

    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>();
    let (err_tx, err_rx) = mpsc::channel::<Vec<u8>>();
    let (exit_tx, exit_rx) = mpsc::channel::<Result<ExitStatus>>();
    thread::Builder::new()
        .name("forker-demux".into())
        .spawn(move || demux_loop(reader, out_tx, err_tx, exit_tx))
        .map_err(Error::Io)?;

    let stream = Arc::new(Mutex::new(stream));
    let handle = RemoteHandle {
        pid,
        stream: stream.clone(),
        exit_rx,
        status: None,
    };

    let wants_stdin = matches!(desc.io_mode(), IoMode::Default | IoMode::Output | IoMode::Io);
    let stdin: Option<Box<dyn Write + Send>> = wants_stdin.then(|| {
        Box::new(RemoteStdin {
            pid,
            stream,
            closed: false,
        }) as Box<dyn Write + Send>
    });

    let mut stdout: Option<Box<dyn Read + Send>> = None;
    let mut stderr: Option<Box<dyn Read + Send>> = None;
    match desc.io_mode() {
        IoMode::Input | IoMode::Io => {
            stdout = Some(Box::new(FrameStream::new(out_rx)));
            if !desc.redirect_err_to_out() {
                stderr = Some(Box::new(FrameStream::new(err_rx)));
            }
        }
        // Inherited modes relay the remote streams onto this process's
        // own stdio.
        IoMode::Default => {
            relay(out_rx, io::stdout());
            relay(err_rx, io::stderr());
        }
        _ => {}
    }

    Ok(Process::from_remote(handle, stdin, stdout, stderr))
}

fn relay<W: Write + Send + 'static>(rx: Receiver<Vec<u8>>, mut sink: W) {
    thread::spawn(move || {
        for chunk in rx {
            if sink.write_all(&chunk).and_then(|()| sink.flush()).is_err() {
                break;
            }
        }
    });
}

fn demux_loop(
    mut reader: BufReader<TcpStream>,
    out_tx: Sender<Vec<u8>>,
    err_tx: Sender<Vec<u8>>,
    exit_tx: Sender<Result<ExitStatus>>,
) {
    loop {
        match Message::read_from(&mut reader) {
            // A dropped receiver is fine; draining continues so the Exit
            // frame still arrives.
            Ok(Message::Stdout { data, .. }) => {
                let _ = out_tx.send(data);
            }
            Ok(Message::Stderr { data, .. }) => {
                let _ = err_tx.send(data);
            }
            Ok(Message::Exit { status, .. }) => {
                let _ = exit_tx.send(Ok(ExitStatus::from_raw(status)));
                return;
            }
            Ok(Message::Pong) => {}
            Ok(other) => {
                let _ = exit_tx.send(Err(Error::Protocol(format!(
                    "unexpected {:?} frame",
                    other.kind()
                ))));
                return;
            }
            Err(e) => {
                let _ = exit_tx.send(Err(Error::Protocol(format!(
                    "connection lost before exit: {e}"
                ))));
                return;
            }
        }
    }
}

fn failed_to_error(reason: String, errno: i32) -> Error {
    // The daemon reports failures as prose plus an errno; map the
    // elevation outcomes back onto their own kinds.
    if reason.contains("no mechanism available") {
        Error::ElevationUnavailable
    } else if reason.contains("identity switch refused") {
        Error::ElevationDenied
    } else {
        Error::ExecFailed { reason, errno }
    }
}

pub(crate) struct RemoteHandle {
    pid: u32,
    stream: Arc<Mutex<TcpStream>>,
    exit_rx: Receiver<Result<ExitStatus>>,
    status: Option<ExitStatus>,
}

impl RemoteHandle {
    pub(crate) fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = match self.exit_rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Protocol(
                    "connection closed before child exit".to_string(),
                ))
            }
        };
        self.status = Some(status);
        Ok(status)
    }

    pub(crate) fn kill(&mut self, signal: i32) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        let mut stream = self.stream.lock().expect("connection lock");
        match (Message::Kill {
            pid: self.pid,
            signal,
        })
        .write_to(&mut *stream)
        {
            Ok(()) => Ok(()),
            // The child racing to exit closes the connection under us;
            // kill stays idempotent across that race.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Write half of a remote child's stdin: every write becomes a Stdin
/// frame, dropping the writer sends StdinClose.
struct RemoteStdin {
    pid: u32,
    stream: Arc<Mutex<TcpStream>>,
    closed: bool,
}

impl Write for RemoteStdin {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let chunk = buf.len().min(protocol::MAX_PAYLOAD - 8);
        let mut stream = self.stream.lock().expect("connection lock");
        (Message::Stdin {
            pid: self.pid,
            data: buf[..chunk].to_vec(),
        })
        .write_to(&mut *stream)?;
        Ok(chunk)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RemoteStdin {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut stream = self.stream.lock().expect("connection lock");
            let _ = (Message::StdinClose { pid: self.pid }).write_to(&mut *stream);
        }
    }
}

/// Read half of a remote stream: frames queue on a channel, reads pull
/// them off in order. EOF is the channel closing, which the demux loop
/// does once the child's Exit frame arrives.
struct FrameStream {
    rx: Receiver<Vec<u8>>,
    buffered: VecDeque<u8>,
}

impl FrameStream {
    fn new(rx: Receiver<Vec<u8>>) -> FrameStream {
        FrameStream {
            rx,
            buffered: VecDeque::new(),
        }
    }
}

impl Read for FrameStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.buffered.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.buffered.extend(chunk),
                Err(_) => return Ok(0),
            }
        }
        let mut n = 0;
        while n < buf.len() {
            match self.buffered.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}
