//! Sector State Engine (C5): per-aircraft sector occupancy with speed
//! hysteresis (spec.md §4.5).

pub mod engine;
pub mod loader;
pub mod polygon;
pub mod repo;

pub use engine::{SectorEngine, SectorTickOutcome};
pub use loader::SectorDefinition;
pub use repo::SectorRepository;
