//! # Resilience Module
//!
//! Rate-limit protection shared by every worker of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docsync::resilience::CircuitBreaker;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::with_delays(
//!     "distribution_service",
//!     Duration::from_secs(30),
//!     Duration::from_secs(900),
//! );
//!
//! breaker.wait_if_needed().await;
//! // ... issue the remote call ...
//! breaker.on_success();
//! # }
//! ```

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState};
