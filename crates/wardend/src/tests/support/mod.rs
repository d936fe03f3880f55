//! Shared harness for the daemon behavioural suites.

mod process_world;

pub(crate) use process_world::{ProcessWorld, StepResult};
