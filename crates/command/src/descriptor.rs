// crates/command/src/descriptor.rs
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{Error, Identity, IoMode, Result};

/// Terminal geometry and name hints for pty launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyHints {
    pub rows: u16,
    pub cols: u16,
    pub term: Option<String>,
}

impl Default for PtyHints {
    fn default() -> Self {
        PtyHints {
            rows: 24,
            cols: 80,
            term: None,
        }
    }
}

/// Immutable description of one command launch.
///
/// Built with chained `with_*` setters; validated on construction and
/// again by [`Descriptor::validate`] before a backend consumes it.
///
/// ```
/// use command::{Descriptor, Identity, IoMode};
///
/// let desc = Descriptor::new(["id", "-u"]).unwrap()
///     .with_io_mode(IoMode::Input)
///     .with_identity(Identity::Uid(0));
/// assert_eq!(desc.argv()[0], "id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env_overlay: BTreeMap<String, String>,
    io_mode: IoMode,
    identity: Identity,
    redirect_err_to_out: bool,
    force_daemon: bool,
    pty_hints: Option<PtyHints>,
}

impl Descriptor {
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() || argv[0].is_empty() {
            return Err(Error::InvalidArgv);
        }
        Ok(Descriptor {
            argv,
            cwd: None,
            env_overlay: BTreeMap::new(),
            io_mode: IoMode::Default,
            identity: Identity::Current,
            redirect_err_to_out: false,
            force_daemon: false,
            pty_hints: None,
        })
    }

    /// Replaces the argument vector, for elevation wrappers that prefix
    /// a helper onto the command line.
    pub fn with_argv(mut self, argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() || argv[0].is_empty() {
            return Err(Error::InvalidArgv);
        }
        self.argv = argv;
        Ok(self)
    }

    pub fn with_cwd<P: Into<PathBuf>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds one variable to the environment overlay. Names containing
    /// `=` or NUL are rejected.
    pub fn with_env<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains('=') || name.contains('\0') {
            return Err(Error::InvalidEnv(name));
        }
        self.env_overlay.insert(name, value.into());
        Ok(self)
    }

    pub fn with_envs<I, K, V>(mut self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in vars {
            self = self.with_env(name, value)?;
        }
        Ok(self)
    }

    pub fn with_io_mode(mut self, io_mode: IoMode) -> Self {
        self.io_mode = io_mode;
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_redirect_err_to_out(mut self, redirect: bool) -> Self {
        self.redirect_err_to_out = redirect;
        self
    }

    /// Routes this launch through the daemon even when a direct exec
    /// would do.
    pub fn with_force_daemon(mut self, force: bool) -> Self {
        self.force_daemon = force;
        self
    }

    pub fn with_pty_hints(mut self, hints: PtyHints) -> Self {
        self.pty_hints = Some(hints);
        self
    }

    /// Checks invariants that construction alone cannot.
    pub fn validate(&self) -> Result<()> {
        if self.argv.is_empty() || self.argv[0].is_empty() {
            return Err(Error::InvalidArgv);
        }
        if let Identity::FixedPasswordSudo(password) = &self.identity {
            if password.is_empty() {
                return Err(Error::InvalidIdentity(
                    "fixed-password elevation with an empty password".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env_overlay
    }

    pub fn io_mode(&self) -> IoMode {
        self.io_mode
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn redirect_err_to_out(&self) -> bool {
        self.redirect_err_to_out
    }

    pub fn force_daemon(&self) -> bool {
        self.force_daemon
    }

    pub fn pty_hints(&self) -> Option<&PtyHints> {
        self.pty_hints.as_ref()
    }
}
