//! Proctored live interview sessions.
//!
//! `session` holds the state machine, `driver` runs it on a Tokio task, and `remote`
//! bridges it to the candidate's browser over the interview socket.

pub mod devices;
pub mod driver;
pub mod exchange;
pub mod handlers;
pub mod media;
pub mod model;
pub mod proctor;
pub mod remote;
pub mod session;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
