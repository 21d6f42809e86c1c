//! Business logic services.

#![allow(missing_docs)]

pub mod admission;
pub mod broadcast;
pub mod registry;
pub mod tally;

pub use admission::{AdmissionGate, Voter};
pub use broadcast::{BroadcastHub, Subscription};
pub use registry::PollRegistry;
pub use tally::{OptionResult, TallyService, TallySnapshot};
