//! Application state shared across handlers.

#![allow(missing_docs)]

use std::time::Duration;

use livepoll_core::{AdmissionGate, BroadcastHub, PollRegistry, TallyService};

/// Application state.
///
/// All services are explicitly constructed and injected at startup (or per
/// test case); nothing here is a process-wide singleton.
#[derive(Clone)]
pub struct AppState {
    pub registry: PollRegistry,
    pub admission: AdmissionGate,
    pub tally: TallyService,
    pub hub: BroadcastHub,
    /// SSE keep-alive comment interval.
    pub stream_keep_alive: Duration,
}
