#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Servo rig logic (hardware-agnostic).
//!
//! All traffic to the controller board goes through `facerig_traits::Link`.
//!
//! ## Architecture
//!
//! - **Registry**: per-channel calibration windows and current angles (`registry`)
//! - **Coupling**: jaw inverse mirror and proportional pairs (`coupling`)
//! - **Wire**: frame encoding (`command`) and the single-writer dispatcher with
//!   group-to-singles fallback (`dispatch`)
//! - **Rig**: registry + dispatcher behind one lock (`rig`)
//! - **Interactive**: keyed trailing debounce in front of the rig (`interactive`)
//! - **Scripts**: parser (`script`) and cancellable background runner (`runner`)
//!
//! ## Concurrency
//!
//! The rig is shared as [`SharedRig`]. Resolve and send happen under the same
//! lock, so the debounce worker and the script worker never interleave frames.

pub mod calibration;
pub mod command;
pub mod config;
pub mod conversions;
pub mod coupling;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod hw_error;
pub mod interactive;
pub mod mocks;
pub mod preset;
pub mod registry;
pub mod rig;
pub mod runner;
pub mod script;
pub mod status;
pub mod util;

use std::sync::{Arc, Mutex};

pub use calibration::{CalibrationSink, MemorySink};
pub use command::Command;
pub use config::{DebounceCfg, LinkCfg, SafetyCfg, ScriptCfg};
pub use dispatch::{Delivery, SendReport};
pub use error::{BuildError, Result, RigError};
pub use interactive::{DebounceKey, InteractiveControl, SuppressGuard};
pub use registry::{CHANNEL_COUNT, Calibration, ChannelRegistry, EditOutcome, Field};
pub use rig::{ConnectReport, MoveMode, MoveOutcome, Rig, RigBuilder};
pub use runner::{RunSummary, ScriptRunner, StartOutcome};
pub use script::{Markers, Script};
pub use status::ExecutionState;
pub use util::CancelToken;

/// The rig as shared between the CLI, the debounce worker and the script worker.
pub type SharedRig = Arc<Mutex<Rig>>;

pub fn shared(rig: Rig) -> SharedRig {
    Arc::new(Mutex::new(rig))
}
