pub mod classify;
pub mod config;
pub mod simulate;

pub use classify::run_classify;
pub use simulate::run_simulate;
