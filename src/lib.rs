//! driftlog: offline-first encrypted storage and sync core for a personal
//! journaling application.
//!
//! Writes always land in the local encrypted store first; a best-effort
//! remote mirror and a pending-status scan reconcile with the remote
//! record store whenever the device is online.

pub mod assistant;
pub mod connectivity;
pub mod crypto;
pub mod db;
pub mod error;
pub mod model;
pub mod remote;
pub mod session;
pub mod sync;
