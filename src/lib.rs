//! This library crate contains the messaging and service location substrate of an execution grid.
//!
//! Submodules have been introduced to split responsibilities. They form a chain of dependencies
//! from the low-level, project agnostic messaging [`library`], over the grid [`domain`] with its
//! directory service, up to the executable [`modules`](module) driven by the command line.

#![warn(missing_docs)]

pub mod domain;
pub mod library;
pub mod module;
