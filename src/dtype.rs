//! Element types admissible in distributed arrays.
//!
//! A pencil carries a [`Dtype`] tag describing the flavour of its elements;
//! arrays and transpositions are generic over a concrete [`Element`] type
//! and check the two against each other. Elements travel over the wire as
//! their real scalar components, which keeps the message layer's datatype
//! handling to the two floating point types.

use bytemuck::Pod;
use mpi::traits::Equivalence;
use num_complex::Complex;
use num_traits::{Float, FromPrimitive, Zero};
use std::ops::{AddAssign, MulAssign, SubAssign};

/// Scalar flavour of a pencil's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Real,
    Complex,
}

/// Real scalar types the 1-D transform libraries operate on.
pub trait RealScalar:
    rustfft::FftNum
    + rustdct::DctNum
    + Float
    + FromPrimitive
    + Pod
    + Equivalence
    + Default
    + Element<Real = Self>
{
}

impl RealScalar for f32 {}
impl RealScalar for f64 {}

/// Element type of a distributed array: a real scalar or its complex pair.
pub trait Element:
    Pod
    + PartialEq
    + std::fmt::Debug
    + Zero
    + AddAssign
    + SubAssign
    + MulAssign<<Self as Element>::Real>
    + Send
    + Sync
    + 'static
{
    type Real: RealScalar;
    const DTYPE: Dtype;
    /// Scalar components per element (what actually travels over the wire).
    const COMPONENTS: usize;

    /// Modulus of the element (absolute value, or complex norm).
    fn modulus(self) -> Self::Real;
}

impl Element for f32 {
    type Real = f32;
    const DTYPE: Dtype = Dtype::Real;
    const COMPONENTS: usize = 1;

    fn modulus(self) -> f32 {
        self.abs()
    }
}

impl Element for f64 {
    type Real = f64;
    const DTYPE: Dtype = Dtype::Real;
    const COMPONENTS: usize = 1;

    fn modulus(self) -> f64 {
        self.abs()
    }
}

impl Element for Complex<f32> {
    type Real = f32;
    const DTYPE: Dtype = Dtype::Complex;
    const COMPONENTS: usize = 2;

    fn modulus(self) -> f32 {
        self.norm()
    }
}

impl Element for Complex<f64> {
    type Real = f64;
    const DTYPE: Dtype = Dtype::Complex;
    const COMPONENTS: usize = 2;

    fn modulus(self) -> f64 {
        self.norm()
    }
}

/// View a typed buffer as its wire scalars.
pub(crate) fn as_scalars<T: Element>(buf: &[T]) -> &[T::Real] {
    bytemuck::cast_slice(buf)
}

/// Mutable wire-scalar view of a typed buffer.
pub(crate) fn as_scalars_mut<T: Element>(buf: &mut [T]) -> &mut [T::Real] {
    bytemuck::cast_slice_mut(buf)
}
