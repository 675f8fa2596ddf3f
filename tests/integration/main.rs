//! End-to-end sweeps driven against the simulated host.

mod harness;
mod safety;
mod sweeps;
