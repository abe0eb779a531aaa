//! The symbolic layer: fact/group BDD encoding,
//! constraint collections derived from the mutex tables, and the
//! fixed-point disambiguation routine used both during FDR construction and
//! goal tightening.

pub mod constraints;
pub mod disambiguation;
pub mod variables;
