//! # Architecture Abstraction Layer
//!
//! Implementations of [`Port`](crate::port::Port). Firmware builds get the
//! Cortex-M3 port; hosted builds get a simulated single-core machine that
//! the tests and the host demo drive by hand.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m3;

#[cfg(not(target_os = "none"))]
pub mod sim;
