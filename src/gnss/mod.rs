
/// Per-sample, per-channel exchange record and signal identities
pub mod synchro;

/// Shared navigation-data repository (ephemerides, iono, UTC, almanacs)
pub mod repository;

/// Acquisition and tracking machinery common to all signals
pub mod common;

pub mod gps_l1_ca;
pub mod galileo_e1;

/// Per-channel state machine sequencing acquisition, tracking and telemetry
pub mod channel;

/// Fan-in of per-channel observables onto a common receiver-time epoch
pub mod observables;

/// Hybrid weighted-least-squares PVT solver
pub mod pvt;
