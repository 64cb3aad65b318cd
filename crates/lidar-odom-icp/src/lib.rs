#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod icp;
pub use icp::IterativeClosestPoint;

mod ops;

mod registration;
pub use registration::*;
