//! # `pencil_fft`: distributed N-dimensional FFTs over pencil decompositions
//!
//! An N-dimensional global grid is split along `M < N` axes across an
//! M-dimensional grid of processes, leaving at least one axis fully local
//! everywhere. 1-D transforms run along the local axis; global
//! transpositions re-point the decomposition so every axis takes a turn
//! being local. [`plan::Plan`] chains the stages into a complete N-D
//! transform with forward and inverse application.
#![warn(clippy::pedantic)]
pub mod array;
pub mod collect;
pub mod distribution;
pub mod dtype;
pub mod error;
mod fft1d;
pub mod pencil;
pub mod permutation;
pub mod plan;
pub mod reduce;
pub mod topology;
pub mod transform;
pub mod transpose;

pub use array::DistArray;
pub use dtype::{Dtype, Element, RealScalar};
pub use error::{Error, Result};
pub use pencil::Pencil;
pub use permutation::Permutation;
pub use plan::Plan;
pub use topology::{balanced_dims, Topology};
pub use transform::{R2rKind, Transform};
pub use transpose::{transpose_into, TransposeMethod};
