//! Single-slot command channel from the protocol server to the worker.
//!
//! The slot doubles as admission control: while a command waits there, further
//! mutating requests are refused with `EnqueueError::Busy`.
use crate::error::EnqueueError;
use crossbeam_channel as xch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Calibrate,
    TriggerRun,
    Reset,
    Quit,
}

impl Command {
    /// Map a protocol method to the command it schedules. `Quit` has no
    /// method; only the server's own shutdown path sends it.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "calibrate" => Some(Command::Calibrate),
            "trigger_run" => Some(Command::TriggerRun),
            "reset" => Some(Command::Reset),
            _ => None,
        }
    }
}

/// Create the capacity-1 channel.
pub fn channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = xch::bounded(1);
    (CommandSender { tx }, CommandReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: xch::Sender<Command>,
}

impl CommandSender {
    /// Non-blocking enqueue; never drops or overwrites a pending command.
    pub fn try_enqueue(&self, cmd: Command) -> Result<(), EnqueueError> {
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(xch::TrySendError::Full(_)) => Err(EnqueueError::Busy),
            Err(xch::TrySendError::Disconnected(_)) => Err(EnqueueError::Terminated),
        }
    }

    /// Deliver `Quit`, waiting behind any pending command.
    /// Returns false when the worker is already gone.
    pub fn quit(&self) -> bool {
        self.tx.send(Command::Quit).is_ok()
    }

    pub fn is_pending(&self) -> bool {
        !self.tx.is_empty()
    }
}

#[derive(Debug)]
pub struct CommandReceiver {
    rx: xch::Receiver<Command>,
}

impl CommandReceiver {
    /// Block until the next command; `None` once every sender is dropped.
    pub fn dequeue(&self) -> Option<Command> {
        self.rx.recv().ok()
    }
}
