//! Test suites for the daemon process lifecycle.

mod process_behaviour;
mod support;
