//! Session Completion Detector (C6): identify completed sessions by
//! silence and apply the reconnection-merge rule (spec.md §4.6).

pub mod detector;
pub mod reconnect;

pub use detector::{CompletionCandidate, SessionDetector};
pub use reconnect::MergedSession;
