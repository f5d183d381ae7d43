use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// What a repeated step asks the driver to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The step returned `Stop`.
    Finished,
    /// The cancel signal fired (or its sender went away).
    Cancelled,
}

/// Runs `step` immediately, then again every `interval` while it returns
/// `Continue`. Cancellation is checked before each step and interrupts the
/// wait between steps.
pub async fn repeat_every<F, Fut>(
    interval: Duration,
    cancel: &mut watch::Receiver<bool>,
    mut step: F,
) -> Outcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Step>,
{
    loop {
        if *cancel.borrow() {
            return Outcome::Cancelled;
        }
        if step().await == Step::Stop {
            return Outcome::Finished;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return Outcome::Cancelled;
                }
            }
        }
    }
}
