// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! # pddl-symbolic
//!
//! A symbolic optimal planner core for finite-domain classical planning
//! tasks. Given a task described by a set of multi-valued state variables,
//! an initial assignment, a partial goal assignment and a set of cost-bearing
//! operators, [`task::SymbolicTask`] computes a cost-optimal operator
//! sequence (or proves none exists) *without* enumerating individual states:
//! sets of states are represented as reduced ordered binary decision
//! diagrams (BDDs) and advanced with image/pre-image transition operators.
//!
//! ## Layering
//!
//! ```text
//! fdr + mutex/mgroup  -->  ordering  -->  symbolic (vars/constraints/disambig)
//!                                          |
//!                                          v
//!                                     transition
//!                                          |
//!                                          v
//!                                       search  <--  task (glue + config + log)
//! ```
//!
//! Components [`bdd`] through [`search`] have no knowledge of the search
//! loop itself; [`task`] composes them and exposes the public search entry
//! points ([`task::SymbolicTask::search_fw`],
//! [`task::SymbolicTask::search_bw`], [`task::SymbolicTask::search_fw_bw`]).
//!
//! ## Non-goals
//!
//! Conditional effects, numeric fluents, temporal/durative actions, derived
//! predicates, parallel multi-core search and anytime suboptimal search are
//! out of scope; conditional effects in particular must be compiled away
//! before a [`fdr::model::Operator`] reaches this crate
//! ([`fdr::model::FdrTask::has_conditional_effects`] must be `false`).

pub mod bdd;
pub mod symbolic;
pub mod fdr;
pub mod ordering;
pub mod transition;
pub mod search;
pub mod task;
pub mod error;

pub use error::{SymbolicError, SymbolicResult};
pub use task::{SymbolicConfig, SymbolicConfigBuilder, DirectionConfig, SymbolicTask};
pub use fdr::model::{FdrTask, Operator, PartialState, Variable as FdrVariable};
pub use fdr::mutex::{MutexPairs, MutexGroups, MutexGroup};
pub use search::engine::{SearchOutcome, Plan};
