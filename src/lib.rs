//! VATSIM live-state ingestion and session-reconstruction pipeline.
//!
//! Polls the VATSIM data feed, filters and buffers incoming samples, tracks
//! per-aircraft sector occupancy with speed hysteresis, detects completed
//! flight/controller sessions by silence, summarizes them, and archives the
//! raw rows — see SPEC_FULL.md for the full component design.

pub mod archiver;
pub mod batch_writer;
pub mod buffer;
pub mod config;
pub mod controllers;
pub mod controllers_repo;
pub mod db;
pub mod error;
pub mod filter_chain;
pub mod flights;
pub mod flights_repo;
pub mod geometry;
pub mod log_format;
pub mod metrics;
pub mod schema;
pub mod scheduler;
pub mod sector;
pub mod session;
pub mod summarizer;
pub mod telemetry;
pub mod transceivers;
pub mod transceivers_repo;
pub mod upstream;
pub mod web;

pub use config::Config;
pub use error::CoreError;
pub use scheduler::Scheduler;
