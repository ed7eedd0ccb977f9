// crates/daemon/src/service.rs
#![allow(unsafe_code)]

use std::fs;
use std::io::{self, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use protocol::Message;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::cookie;
use crate::session::serve_connection;

#[cfg(unix)]
use nix::unistd::{fork, setsid, ForkResult};

/// A bound daemon endpoint, ready to accept clients.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    port: u16,
    cookie: Arc<Vec<u8>>,
    config: DaemonConfig,
}

impl Server {
    /// Generates the cookie, persists it, and binds the endpoint.
    ///
    /// Refuses to start when a live daemon already answers on the
    /// configured port.
    pub fn bind(config: DaemonConfig) -> io::Result<Server> {
        if config.port != 0 && existing_daemon(&config) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("a daemon is already listening on port {}", config.port),
            ));
        }

        fs::create_dir_all(&config.state_dir)?;
        let cookie = cookie::generate();
        cookie::persist(&config.cookie_path(), &cookie)?;

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, config.port))?;
        let port = listener.local_addr()?.port();
        info!(port, state_dir = %config.state_dir.display(), "daemon listening");
        Ok(Server {
            listener,
            port,
            cookie: Arc::new(cookie),
            config,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cookie_path(&self) -> std::path::PathBuf {
        self.config.cookie_path()
    }

    /// Accepts connections forever. Per-session errors are logged and
    /// never take the daemon down.
    pub fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            let cookie = self.cookie.clone();
            let grace = self.config.grace;
            thread::Builder::new()
                .name("forker-session".into())
                .spawn(move || {
                    if let Err(e) = serve_connection(stream, &cookie, grace) {
                        warn!(%peer, error = %e, "session ended with error");
                    }
                })?;
        }
    }

    /// Runs the accept loop on a background thread. For tests and
    /// embedders.
    pub fn spawn(self) -> ServerHandle {
        let port = self.port;
        let cookie_path = self.cookie_path();
        let thread = thread::spawn(move || self.run());
        ServerHandle {
            port,
            cookie_path,
            _thread: thread,
        }
    }
}

/// A daemon running on a background thread. The accept loop stops when
/// the process exits; there is no graceful stop beyond that.
pub struct ServerHandle {
    port: u16,
    cookie_path: std::path::PathBuf,
    _thread: thread::JoinHandle<io::Result<()>>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cookie_path(&self) -> &std::path::Path {
        &self.cookie_path
    }
}

/// Liveness probe against a possibly-running daemon: connect, present
/// whatever cookie the state dir holds, and see whether anything that
/// speaks the protocol answers.
fn existing_daemon(config: &DaemonConfig) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let Ok(mut stream) = TcpStream::connect_timeout(&addr, config.probe_timeout) else {
        return false;
    };
    let _ = stream.set_read_timeout(Some(config.probe_timeout));
    let _ = stream.set_write_timeout(Some(config.probe_timeout));
    let cookie = cookie::load(&config.cookie_path()).unwrap_or_default();
    if (Message::Hello { cookie }).write_to(&mut stream).is_err() {
        return false;
    }
    let mut reader = BufReader::new(stream);
    matches!(
        Message::read_from(&mut reader),
        Ok(Message::HelloOk | Message::HelloReject { .. })
    )
}

/// Daemon entry point for the binary: optionally detaches, binds, and
/// serves. The bound port is printed to stdout before detaching callers
/// lose sight of it.
pub fn run_daemon(config: DaemonConfig, no_detach: bool) -> io::Result<()> {
    #[cfg(not(unix))]
    let _ = no_detach;
    #[cfg(unix)]
    if !no_detach {
        // SAFETY: the child performs no allocation or locking before the
        // next library call; it only continues into Server::bind.
        match unsafe { fork() } {
            Ok(ForkResult::Parent { .. }) => return Ok(()),
            Ok(ForkResult::Child) => {
                setsid().map_err(io::Error::other)?;
            }
            Err(e) => return Err(io::Error::other(e)),
        }
    }
    let server = Server::bind(config)?;
    let _ = writeln!(io::stdout(), "{}", server.port());
    let _ = io::stdout().flush();
    server.run()
}
