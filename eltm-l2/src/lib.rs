//! eltm-l2: L1 to L2 reduction.
//!
//! Sums electron counts over the azimuthal x incident plane for every
//! (energy step, cycle) pair and derives the plane mean:
//! - **total** - exact integer sum of the 42 plane samples
//! - **mean** - total divided by 42 in floating point
//!
#![warn(missing_docs)]

mod aggregate;

pub use aggregate::{aggregate, aggregate_all, L2Aggregator};
