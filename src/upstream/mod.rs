//! Upstream client: fetch, parse, normalize (C1).

pub mod client;
pub mod normalize;
pub mod snapshot;

pub use client::UpstreamClient;
pub use snapshot::{ControllerSample, PilotSample, Snapshot, TransceiverSample};
