#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! DPD computation engine core (transmitter-agnostic).
//!
//! Everything that touches the radio goes through the collaborator traits in
//! `dpdce_traits`; this crate owns the control architecture around them.
//!
//! ## Architecture
//!
//! - **State**: one mutex over settings, counters and results (`state`)
//! - **Commands**: capacity-1 channel from server to worker (`command`)
//! - **Worker**: the command state machine and its guards (`worker`)
//! - **Phases**: RX gain calibration (`calibrate`), capture + model (`capture`)
//! - **Server**: method dispatch over a request/response transport (`server`, `rpc`)
//! - **Artifacts**: plot file naming and cleanup (`artifacts`)
//! - **Schedule**: default measurement count / learning rate annealing (`schedule`)

pub mod artifacts;
mod calibrate;
mod capture;
pub mod command;
pub mod conversions;
pub mod engine;
pub mod error;
pub mod mocks;
pub mod rpc;
pub mod schedule;
pub mod server;
pub mod state;
pub mod worker;

pub use artifacts::ArtifactManager;
pub use calibrate::MAX_TRIALS;
pub use command::{Command, CommandReceiver, CommandSender};
pub use engine::{Engine, EngineParams, current_settings, reset_to_defaults};
pub use error::{EngineError, EnqueueError, Result};
pub use schedule::LinearSchedule;
pub use server::{ProtocolServer, Reply};
pub use state::{EngineState, Results, Settings, SharedState, Snapshot};
pub use worker::{Collaborators, Worker};
