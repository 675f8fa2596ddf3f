//! Humanized timing: delay distributions and the pacing policy built on them.

pub mod delay;
pub mod policy;

pub use delay::{DelayGenerator, DelayStrategy};
pub use policy::{FocusState, HumanizationPolicy};
