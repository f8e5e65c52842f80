//! Cross-platform process spawning helpers.
//!
//! On Windows, spawning the encoder from a GUI application can cause a console
//! window to appear for each invocation. This module centralizes the creation
//! flags needed to suppress that, plus the termination request used when a
//! user cancels an in-flight encode.

use tracing::warn;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Apply platform-specific flags to a tokio process command.
///
/// The child is also killed if its handle is dropped, so an abandoned
/// invocation future never leaves an encoder running in the background.
pub fn configure_tokio_command(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd.kill_on_drop(true);
}

/// Ask a running child to terminate.
///
/// On unix this sends SIGTERM so the encoder can close its output cleanly,
/// falling back to SIGKILL when the signal cannot be delivered. Elsewhere the
/// process is killed outright. Never blocks; the caller still has to `wait()`
/// on the child.
pub fn request_termination(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match i32::try_from(pid) {
                Ok(raw) => match kill(Pid::from_raw(raw), Signal::SIGTERM) {
                    Ok(()) => {
                        tracing::debug!(pid, "Sent SIGTERM to encoder process");
                        return;
                    }
                    Err(e) => warn!(pid, "SIGTERM failed, killing process: {}", e),
                },
                Err(_) => warn!(pid, "Process id out of range, killing process"),
            }
        }
    }

    if let Err(e) = child.start_kill() {
        warn!("Failed to kill encoder process: {}", e);
    }
}
