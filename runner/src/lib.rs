//! Embeddable interpreter for declaratively authored hands-on labs.
//!
//! A lab is an ordered list of steps (terminal, console form, file inspection,
//! architecture diagram, quiz). Learner submissions are checked against
//! declarative rules, a simulated world is patched on success, and a small
//! state machine drives transitions and scoring.
//!
//! - **[`core`]**: Pure, deterministic logic (templating, world store, command
//!   matching, expression sandbox, topology checks, validators, lint).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting helpers (config, lab loading, replay scripts,
//!   rendering).
//!
//! [`session::Session`] ties the core together for one learner; [`play`]
//! replays scripted submissions for the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod lab;
pub mod logging;
pub mod play;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
