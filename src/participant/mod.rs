//! The `participant` module describes one node of the FBP network.
//!
//! - `definition`: the static identity and port schema announced on discovery.
//! - `participant`: the running node, its `Process` callback and the
//!   back-reference to the engine it sends through.
//! - `repeat`: a ready-made component used by the binary.

pub mod definition;
#[allow(clippy::module_inception)]
pub mod participant;
pub mod repeat;

pub use definition::{Definition, Port};
pub use participant::{Participant, Process};
pub use repeat::Repeat;
