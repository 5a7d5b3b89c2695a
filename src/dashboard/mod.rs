//! Terminal dashboard for interactive speed measurement
//!
//! Submodules:
//! - `speed_dashboard`: ratatui UI, the test state machine and its events

pub mod speed_dashboard;

pub use speed_dashboard::{Dashboard, SpeedRating, TestEvent, TestPhase};
