//! Process-group signalling for script teardown.
//!
//! Scripts are spawned as the leader of a fresh process group (the group id
//! equals the child's pid), so every command the script forks can be
//! interrupted or killed together instead of leaving orphans behind that
//! keep the output pipes open.

use std::io;

/// Teardown signals: the interrupt that opens the grace period, and the
/// kill that closes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KillSignal {
    Int,
    #[default]
    Kill,
}

#[cfg(unix)]
impl KillSignal {
    fn as_nix_signal(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            KillSignal::Int => Signal::SIGINT,
            KillSignal::Kill => Signal::SIGKILL,
        }
    }
}

/// Send `signal` to the process group `process_group_id` (best-effort).
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_process_group(process_group_id: u32, signal: KillSignal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = i32::try_from(process_group_id).map_err(io::Error::other)?;
    match killpg(Pid::from_raw(pgid), signal.as_nix_signal()) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// No-op on non-Unix platforms.
#[cfg(not(unix))]
pub fn signal_process_group(_process_group_id: u32, _signal: KillSignal) -> io::Result<()> {
    Ok(())
}
