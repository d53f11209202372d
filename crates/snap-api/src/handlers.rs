//! HTTP handlers.

pub mod health;
pub mod snaps;

pub use health::{health, ready};
pub use snaps::create_snap;
