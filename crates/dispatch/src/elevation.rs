// crates/dispatch/src/elevation.rs
//! Local elevation, the last rungs of the fallback ladder.
//!
//! With no daemon to mediate, a privileged host switches ids itself and
//! an unprivileged one re-spawns the command through the first helper
//! found on `PATH`. Fixed-password elevation writes a throwaway askpass
//! script and points `SUDO_ASKPASS` at it for that one child; the
//! script is unlinked whatever the outcome. When nothing can elevate,
//! the launch fails; it is never silently run unelevated.

use command::{Descriptor, Error, Identity, Result};
use tracing::debug;

use crate::direct;
use crate::process::Process;

#[cfg(unix)]
const HELPERS: &[&str] = &["sudo", "doas", "pkexec"];

pub(crate) fn launch_local(desc: &Descriptor) -> Result<Process> {
    #[cfg(unix)]
    {
        if nix::unistd::Uid::effective().is_root() {
            // Privileged hosts, downgrades included, switch after fork.
            return direct::launch(desc);
        }
        if let Identity::FixedPasswordSudo(password) = desc.identity() {
            return launch_with_askpass(desc, password);
        }
        let helper = HELPERS
            .iter()
            .find(|name| command::has_command(name))
            .ok_or(Error::ElevationUnavailable)?;
        let argv = helper_argv(helper, desc)?;
        debug!(helper, "elevating through helper");
        let wrapped = desc
            .clone()
            .with_argv(argv)?
            .with_identity(Identity::Current);
        direct::launch(&wrapped)
    }
    #[cfg(not(unix))]
    {
        let _ = desc;
        Err(Error::UnsupportedPlatform)
    }
}

#[cfg(unix)]
fn helper_argv(helper: &str, desc: &Descriptor) -> Result<Vec<String>> {
    let mut argv = vec![helper.to_string()];
    match (helper, desc.identity()) {
        (_, Identity::Administrator) => {}
        ("sudo", Identity::Uid(uid)) => {
            argv.push("-u".to_string());
            argv.push(format!("#{uid}"));
        }
        ("sudo", Identity::Username(name)) => {
            argv.push("-u".to_string());
            argv.push(name.clone());
        }
        (_, Identity::Uid(uid)) => {
            let name = users::get_user_by_uid(*uid)
                .ok_or_else(|| Error::InvalidIdentity(format!("unknown uid {uid}")))?
                .name()
                .to_string_lossy()
                .into_owned();
            argv.push(user_flag(helper).to_string());
            argv.push(name);
        }
        (_, Identity::Username(name)) => {
            argv.push(user_flag(helper).to_string());
            argv.push(name.clone());
        }
        (_, Identity::Current | Identity::FixedPasswordSudo(_)) => {
            return Err(Error::InvalidIdentity(
                "helper wrapping needs a target identity".to_string(),
            ))
        }
    }
    if helper == "sudo" {
        argv.push("--".to_string());
    }
    argv.extend(desc.argv().iter().cloned());
    Ok(argv)
}

#[cfg(unix)]
fn user_flag(helper: &str) -> &'static str {
    match helper {
        "pkexec" => "--user",
        _ => "-u",
    }
}

/// `sudo -A` with a generated askpass provider: sudo consults the
/// program named by `SUDO_ASKPASS` instead of prompting on a tty.
#[cfg(unix)]
fn launch_with_askpass(desc: &Descriptor, password: &str) -> Result<Process> {
    if !command::has_command("sudo") {
        return Err(Error::ElevationUnavailable);
    }
    let askpass = write_askpass_script(password)?;
    let mut argv = vec![
        "sudo".to_string(),
        "-A".to_string(),
        "-k".to_string(),
        "--".to_string(),
    ];
    argv.extend(desc.argv().iter().cloned());
    let wrapped = desc
        .clone()
        .with_argv(argv)?
        .with_identity(Identity::Current)
        .with_env("SUDO_ASKPASS", askpass.to_string_lossy())?;
    let process = direct::launch(&wrapped)?;
    Ok(process.with_askpass(askpass))
}

#[cfg(unix)]
fn write_askpass_script(password: &str) -> Result<tempfile::TempPath> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let mut file = tempfile::Builder::new()
        .prefix("forker-askpass-")
        .suffix(".sh")
        .tempfile()
        .map_err(Error::Io)?;
    let quoted = password.replace('\'', r"'\''");
    writeln!(file, "#!/bin/sh")?;
    writeln!(file, "printf '%s\\n' '{quoted}'")?;
    file.as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o700))?;
    Ok(file.into_temp_path())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn desc(identity: Identity) -> Descriptor {
        Descriptor::new(["systemctl", "restart", "svc"])
            .unwrap()
            .with_identity(identity)
    }

    #[test]
    fn sudo_argv_for_administrator() {
        let argv = helper_argv("sudo", &desc(Identity::Administrator)).unwrap();
        assert_eq!(argv, ["sudo", "--", "systemctl", "restart", "svc"]);
    }

    #[test]
    fn sudo_argv_for_uid() {
        let argv = helper_argv("sudo", &desc(Identity::Uid(1000))).unwrap();
        assert_eq!(argv, ["sudo", "-u", "#1000", "--", "systemctl", "restart", "svc"]);
    }

    #[test]
    fn pkexec_argv_for_username() {
        let argv = helper_argv("pkexec", &desc(Identity::Username("backup".into()))).unwrap();
        assert_eq!(
            argv,
            ["pkexec", "--user", "backup", "systemctl", "restart", "svc"]
        );
    }

    #[test]
    fn askpass_script_echoes_password() {
        let path = write_askpass_script("s3cr3t'with'quotes").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("#!/bin/sh"));
        assert!(contents.contains(r"s3cr3t'\''with'\''quotes"));
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        let owned = path.to_path_buf();
        drop(path);
        assert!(!owned.exists());
    }
}
