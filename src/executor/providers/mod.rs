//! Execution providers
//!
//! Each provider adapts one upstream build API to the `SwapProvider`
//! trait. Cascade ordering lives in the executor, not here.

pub mod jupiter;
pub mod pumpportal;
pub mod raydium;

pub use jupiter::JupiterProvider;
pub use pumpportal::PumpPortalProvider;
pub use raydium::RaydiumProvider;
