// Flowhook worker
//
// Background processing for the run lifecycle. Currently the Timeout Sweeper,
// which can run inside flowhook-api or standalone via the flowhook-worker binary.

pub mod sweeper;

pub use sweeper::{SweepReport, SweeperConfig, SweeperHandle, TimeoutSweeper};
