//! Timeout teardown of a running script.
//!
//! Teardown is an explicit state machine:
//!
//! ```text
//! Running --interrupt--> Interrupted --grace period--> Terminated
//!                             |                            ^
//!                             +---- exited in grace -------+
//! ```
//!
//! The interrupt goes to the whole process group. If the group leader has
//! not exited once the grace period elapses it is killed, and teardown waits
//! a short reap window for the kill to land.

use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

use crate::process_group::{KillSignal, signal_process_group};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownState {
    Running,
    Interrupted,
    Terminated,
}

/// How the child left the [`TeardownState::Running`] state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Child had already exited when teardown started.
    AlreadyExited,
    /// Child exited within the grace period after the interrupt.
    Interrupted,
    /// Child was killed and reaped.
    Killed,
    /// Child was killed but had not been reaped when the reap window closed.
    Unreaped,
}

#[derive(Debug)]
pub struct Teardown {
    state: TeardownState,
    grace_period: Duration,
    reap_wait: Duration,
}

impl Teardown {
    pub fn new(grace_period: Duration, reap_wait: Duration) -> Self {
        Self {
            state: TeardownState::Running,
            grace_period,
            reap_wait,
        }
    }

    pub fn state(&self) -> TeardownState {
        self.state
    }

    /// Drive `child` from `Running` to `Terminated`.
    pub async fn run(&mut self, child: &mut Child) -> TeardownOutcome {
        if self.state == TeardownState::Terminated {
            return TeardownOutcome::AlreadyExited;
        }

        let Some(pid) = child.id() else {
            // tokio clears the id once the child has been reaped.
            self.state = TeardownState::Terminated;
            return TeardownOutcome::AlreadyExited;
        };

        if matches!(child.try_wait(), Ok(Some(_))) {
            self.state = TeardownState::Terminated;
            return TeardownOutcome::AlreadyExited;
        }

        self.interrupt(pid);
        if wait_for_exit(child, self.grace_period).await {
            self.state = TeardownState::Terminated;
            debug!(pid, "script exited after interrupt");
            return TeardownOutcome::Interrupted;
        }

        self.kill(pid, child);
        let reaped = wait_for_exit(child, self.reap_wait).await;
        self.state = TeardownState::Terminated;
        if reaped {
            debug!(pid, "script killed after grace period");
            TeardownOutcome::Killed
        } else {
            warn!(pid, "script not reaped after kill");
            TeardownOutcome::Unreaped
        }
    }

    fn interrupt(&mut self, pid: u32) {
        if let Err(err) = signal_process_group(pid, KillSignal::Int) {
            warn!(pid, error = %err, "failed to interrupt script process group");
        }
        self.state = TeardownState::Interrupted;
    }

    fn kill(&mut self, pid: u32, child: &mut Child) {
        if let Err(err) = signal_process_group(pid, KillSignal::Kill) {
            warn!(pid, error = %err, "failed to kill script process group");
        }
        // The group signal can be refused when the leader changed identity
        // (elevation); fall back to the direct child.
        if let Err(err) = child.start_kill() {
            debug!(pid, error = %err, "direct kill of script process failed");
        }
    }
}

async fn wait_for_exit(child: &mut Child, window: Duration) -> bool {
    matches!(tokio::time::timeout(window, child.wait()).await, Ok(Ok(_)))
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::Stdio;
    use std::time::Instant;

    use tokio::process::Command;

    use super::*;

    fn spawn(script: &str) -> std::io::Result<Child> {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
    }

    #[tokio::test]
    async fn interrupt_stops_cooperative_child() -> std::io::Result<()> {
        let mut child = spawn("sleep 30")?;
        let mut teardown = Teardown::new(Duration::from_secs(2), Duration::from_millis(50));
        assert_eq!(teardown.state(), TeardownState::Running);

        let outcome = teardown.run(&mut child).await;
        assert_eq!(outcome, TeardownOutcome::Interrupted);
        assert_eq!(teardown.state(), TeardownState::Terminated);
        Ok(())
    }

    #[tokio::test]
    async fn kill_follows_ignored_interrupt() -> std::io::Result<()> {
        let mut child = spawn("trap '' INT; while :; do sleep 1; done")?;
        // Give the shell time to install the trap.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let mut teardown = Teardown::new(Duration::from_millis(150), Duration::from_secs(1));
        let outcome = teardown.run(&mut child).await;

        assert_eq!(outcome, TeardownOutcome::Killed);
        assert!(started.elapsed() < Duration::from_secs(2));
        Ok(())
    }

    #[tokio::test]
    async fn finished_child_needs_no_teardown() -> std::io::Result<()> {
        let mut child = spawn("exit 0")?;
        child.wait().await?;

        let mut teardown = Teardown::new(Duration::from_millis(150), Duration::from_millis(50));
        assert_eq!(
            teardown.run(&mut child).await,
            TeardownOutcome::AlreadyExited
        );
        Ok(())
    }
}
