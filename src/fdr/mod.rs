//! The finite-domain representation (FDR) consumed by this crate: variables,
//! partial states, operators, and the mutex/mgroup structures that annotate
//! them.

pub mod model;
pub mod mutex;
