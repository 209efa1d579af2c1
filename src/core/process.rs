//! Child process helpers shared by exec plugins and subprocess transports.

use std::process::{Child, Command};

/// Start the child in a new process group led by itself.
///
/// A terminal Ctrl-C or a group-wide SIGTERM then reaches only the daemon,
/// which finishes the in-flight invocation before exiting.
pub fn isolate(cmd: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

/// SIGKILL every process in the child's group, then reap the child.
///
/// Only meaningful for children started through [`isolate`]; elsewhere just
/// the child itself is killed.
pub fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}
