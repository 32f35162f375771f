//! Progress publication for executors.
//!
//! Smoothing and ETA live in `civdl_core::download::progress`; this module
//! only gates how often executors publish raw byte counters.

mod gate;

pub use gate::PublishGate;
