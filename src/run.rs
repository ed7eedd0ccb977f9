// src/run.rs
//! Convenience wrappers over the dispatcher for the common one-liners:
//! run and check, run and capture, run elevated.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use command::{Descriptor, Error, IoMode, Result};
use dispatch::{dispatch, scope};
use tracing::debug;

pub use command::has_command;

fn collect<I, S>(argv: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    argv.into_iter().map(Into::into).collect()
}

/// Builds the capture descriptor the helpers share: stderr merged into
/// stdout, I/O mode from the ambient scope with `Input` as the default.
fn capture_descriptor(cwd: Option<&Path>, argv: Vec<String>) -> Result<Descriptor> {
    let io_mode = scope::current().io_mode.unwrap_or(IoMode::Input);
    let mut desc = Descriptor::new(argv)?
        .with_io_mode(io_mode)
        .with_redirect_err_to_out(true);
    if let Some(cwd) = cwd {
        desc = desc.with_cwd(cwd);
    }
    Ok(desc)
}

fn run_command_into<W: Write>(cwd: Option<&Path>, out: &mut W, argv: Vec<String>) -> Result<i32> {
    debug!(argv = ?argv, "running command");
    let mut process = dispatch(&capture_descriptor(cwd, argv)?)?;
    if let Some(mut stdout) = process.take_stdout() {
        io::copy(&mut stdout, out)?;
    }
    Ok(process.wait()?.shell_code())
}

/// Runs a command, echoing its output, and returns the exit code.
pub fn run_command<I, S>(argv: I) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    run_command_into(None, &mut io::stdout(), collect(argv))
}

/// Same as [`run_command`] with an explicit working directory.
pub fn run_command_in<I, S>(cwd: &Path, argv: I) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    run_command_into(Some(cwd), &mut io::stdout(), collect(argv))
}

/// Runs a command and fails unless it exits zero.
pub fn run<I, S>(argv: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    check_status(run_command(argv)?)
}

/// Same as [`run`] with an explicit working directory.
pub fn run_in<I, S>(cwd: &Path, argv: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    check_status(run_command_in(cwd, argv)?)
}

fn check_status(code: i32) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(Error::Io(io::Error::other(format!(
            "command returned non-zero status {code}"
        ))))
    }
}

/// Runs a command and captures its output as lines. Non-zero exit is an
/// error carrying the captured output.
pub fn run_and_capture_output<I, S>(argv: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv = collect(argv);
    let joined = argv.join(" ");
    let mut process = dispatch(&capture_descriptor(None, argv)?)?;
    let mut text = String::new();
    if let Some(mut stdout) = process.take_stdout() {
        stdout.read_to_string(&mut text)?;
    }
    let status = process.wait()?;
    if !status.success() {
        return Err(Error::Io(io::Error::other(format!(
            "command '{joined}' returned non-zero status ({status}): {text}"
        ))));
    }
    Ok(text.lines().map(String::from).collect())
}

/// Runs a command with its output streamed to a file; returns the exit
/// code.
pub fn run_to_file<I, S>(file: &Path, argv: I) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out = File::create(file)?;
    run_command_into(None, &mut out, collect(argv))
}

/// Runs a command as administrator and fails unless it exits zero.
pub fn admin<I, S>(argv: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    check_status(admin_command(argv)?)
}

/// Runs a command as administrator, echoing its output, and returns the
/// exit code.
pub fn admin_command<I, S>(argv: I) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let guard = scope().elevate(true).enter();
    let result = run_command(argv);
    guard.release();
    result
}

/// Same as [`admin_command`] with an explicit working directory.
pub fn admin_command_in<I, S>(cwd: &Path, argv: I) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let guard = scope().elevate(true).enter();
    let result = run_command_in(cwd, argv);
    guard.release();
    result
}

/// Runs a command as administrator and captures its output as lines.
pub fn admin_and_capture_output<I, S>(argv: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let guard = scope().elevate(true).enter();
    let result = run_and_capture_output(argv);
    guard.release();
    result
}

/// Runs a command as administrator with its output streamed to a file.
pub fn admin_to_file<I, S>(file: &Path, argv: I) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let guard = scope().elevate(true).enter();
    let result = run_to_file(file, argv);
    guard.release();
    result
}

/// Blocking exec with inherited stdio, like a shell would run it.
pub fn system<I, S>(argv: I) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let desc = Descriptor::new(collect(argv))?.with_io_mode(IoMode::System);
    let mut process = dispatch(&desc)?;
    Ok(process.wait()?.shell_code())
}
