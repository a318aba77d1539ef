//! Prometheus metrics for a harness run.
//!
//! # Example
//!
//! ```ignore
//! use setupbench_runner::metrics::HarnessMetrics;
//!
//! let metrics = HarnessMetrics::new()?;
//! metrics.observe_task("database_setup", true, 312.5);
//! metrics.write_to(&config.metrics_path()).await?;
//! ```

pub mod prometheus;

pub use self::prometheus::HarnessMetrics;
