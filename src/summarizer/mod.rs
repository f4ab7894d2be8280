//! Summarizer (C7): roll a completed-and-merged session's raw rows into a
//! single summary row (spec.md §4.7).

pub mod controller;
pub mod flight;

pub use controller::ControllerSummarizer;
pub use flight::FlightSummarizer;
