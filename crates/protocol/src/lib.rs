//! Wire types shared by the orderdesk upload server and its clients.
//!
//! Every JSON body exchanged over the `/uploads` API is defined here so the
//! server and the Rust client cannot drift apart.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

pub use envelope::{Envelope, ErrorBody};
pub use types::{ParseTargetTypeError, TargetType};
