//! Process-local storage for pencil-distributed data.
//!
//! A [`DistArray`] owns a dense buffer whose dimensions follow its pencil's
//! *memory* order; logical-order access goes through the pencil's
//! permutation. The throughput-friendly access pattern is to walk the
//! buffer in memory order and recover logical coordinates through the
//! permutation, which is what [`DistArray::fill_with`] does for writes.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::pencil::Pencil;
use ndarray::{Array, ArrayView, ArrayViewMut, Dim, Dimension, IntoDimension};
use num_traits::Zero;
use std::ops::{AddAssign, Index, Range, SubAssign};

/// Dense local block of a pencil-distributed global array.
#[derive(Clone)]
pub struct DistArray<T: Element, const N: usize, const M: usize>
where
    Dim<[usize; N]>: Dimension,
{
    pencil: Pencil<N, M>,
    data: Array<T, Dim<[usize; N]>>,
}

impl<T: Element, const N: usize, const M: usize> DistArray<T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    /// Allocate a zero-initialised array on `pencil`.
    ///
    /// # Errors
    /// [`Error::Type`] if the pencil's dtype does not match `T`.
    pub fn zeros(pencil: &Pencil<N, M>) -> Result<Self> {
        if pencil.dtype() != T::DTYPE {
            return Err(Error::Type(format!(
                "array element flavour {:?} does not match pencil dtype {:?}",
                T::DTYPE,
                pencil.dtype()
            )));
        }
        Ok(Self {
            pencil: pencil.clone(),
            data: Array::zeros(pencil.shape_mem()),
        })
    }

    /// Wrap an existing buffer, which must hold the local block in memory
    /// order.
    ///
    /// # Errors
    /// [`Error::Shape`] if the buffer length differs from the pencil's
    /// local size; [`Error::Type`] on a dtype mismatch.
    pub fn from_vec(pencil: &Pencil<N, M>, buf: Vec<T>) -> Result<Self> {
        if pencil.dtype() != T::DTYPE {
            return Err(Error::Type(format!(
                "array element flavour {:?} does not match pencil dtype {:?}",
                T::DTYPE,
                pencil.dtype()
            )));
        }
        if buf.len() != pencil.local_len() {
            return Err(Error::Shape {
                got: vec![buf.len()],
                expected: vec![pencil.local_len()],
            });
        }
        let data = Array::from_shape_vec(pencil.shape_mem(), buf)
            .expect("buffer length was checked against the pencil");
        Ok(Self {
            pencil: pencil.clone(),
            data,
        })
    }

    /// A zeroed array on the same pencil.
    #[must_use]
    pub fn similar(&self) -> Self {
        Self::zeros(&self.pencil).expect("pencil dtype already matched")
    }

    #[must_use]
    pub fn pencil(&self) -> &Pencil<N, M> {
        &self.pencil
    }

    /// Local shape in logical axis order.
    #[must_use]
    pub fn local_shape(&self) -> [usize; N] {
        self.pencil.local_shape()
    }

    /// Global index range owned locally, in logical axis order.
    #[must_use]
    pub fn local_range(&self) -> [Range<usize>; N] {
        self.pencil.local_range()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat view of the local block in memory order.
    ///
    /// # Panics
    /// Never; the buffer is always dense.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice().expect("local block is dense")
    }

    /// Mutable flat view of the local block in memory order.
    ///
    /// # Panics
    /// Never; the buffer is always dense.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_slice_mut().expect("local block is dense")
    }

    /// View with axes in logical order (strides reflect the memory
    /// permutation).
    #[must_use]
    pub fn view_logical(&self) -> ArrayView<'_, T, Dim<[usize; N]>> {
        self.data
            .view()
            .permuted_axes(self.pencil.permutation().inverse().axes())
    }

    /// Mutable view with axes in logical order.
    pub fn view_logical_mut(&mut self) -> ArrayViewMut<'_, T, Dim<[usize; N]>> {
        let perm = self.pencil.permutation().inverse().axes();
        self.data.view_mut().permuted_axes(perm)
    }

    fn mem_offset(&self, local: [usize; N]) -> usize {
        let strides = self.pencil.axis_strides();
        local
            .iter()
            .zip(strides.iter())
            .map(|(&i, &s)| i * s)
            .sum()
    }

    /// Element at a logical **local** index.
    ///
    /// # Panics
    /// If the index is outside the local shape.
    #[must_use]
    pub fn get_local(&self, local: [usize; N]) -> &T {
        let shape = self.local_shape();
        assert!(
            local.iter().zip(shape.iter()).all(|(&i, &s)| i < s),
            "local index {local:?} outside shape {shape:?}"
        );
        &self.as_slice()[self.mem_offset(local)]
    }

    /// Element at a logical **global** index.
    ///
    /// # Errors
    /// [`Error::Index`] if the index is not owned locally.
    pub fn get_global(&self, global: [usize; N]) -> Result<&T> {
        let local = self.localize(global)?;
        Ok(&self.as_slice()[self.mem_offset(local)])
    }

    /// Overwrite the element at a logical global index.
    ///
    /// # Errors
    /// [`Error::Index`] if the index is not owned locally.
    pub fn set_global(&mut self, global: [usize; N], value: T) -> Result<()> {
        let local = self.localize(global)?;
        let off = self.mem_offset(local);
        self.as_mut_slice()[off] = value;
        Ok(())
    }

    fn localize(&self, global: [usize; N]) -> Result<[usize; N]> {
        let range = self.local_range();
        if global
            .iter()
            .zip(range.iter())
            .any(|(g, r)| !r.contains(g))
        {
            return Err(Error::Index {
                index: global.to_vec(),
                range: range.iter().map(|r| (r.start, r.end)).collect(),
            });
        }
        Ok(std::array::from_fn(|a| global[a] - range[a].start))
    }

    /// Read-only adapter indexed by global logical indices.
    #[must_use]
    pub fn global_view(&self) -> GlobalView<'_, T, N, M> {
        GlobalView { arr: self }
    }

    /// Mutable adapter indexed by global logical indices.
    pub fn global_view_mut(&mut self) -> GlobalViewMut<'_, T, N, M> {
        GlobalViewMut { arr: self }
    }

    fn get_global_mut(&mut self, global: [usize; N]) -> Result<&mut T> {
        let local = self.localize(global)?;
        let off = self.mem_offset(local);
        Ok(&mut self.as_mut_slice()[off])
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Fill the local block by evaluating `f` at every owned logical
    /// **global** index, walking the buffer in memory order.
    pub fn fill_with(&mut self, mut f: impl FnMut([usize; N]) -> T) {
        let shape_mem = self.pencil.shape_mem();
        let axes = self.pencil.permutation().axes();
        let range = self.pencil.local_range();
        for (flat, x) in self.as_mut_slice().iter_mut().enumerate() {
            let mut rem = flat;
            let mut global = [0usize; N];
            for d in (0..N).rev() {
                global[axes[d]] = range[axes[d]].start + rem % shape_mem[d];
                rem /= shape_mem[d];
            }
            *x = f(global);
        }
    }

    /// Multiply every element by a real scalar.
    pub fn scale(&mut self, s: T::Real) {
        for x in self.as_mut_slice() {
            *x *= s;
        }
    }

    /// Largest elementwise modulus of `self - other` on this process.
    ///
    /// # Panics
    /// If the two arrays live on different pencils.
    #[must_use]
    pub fn max_abs_diff(&self, other: &Self) -> T::Real {
        assert!(
            self.pencil.matches(&other.pencil),
            "arrays live on different pencils"
        );
        self.as_slice()
            .iter()
            .zip(other.as_slice())
            .map(|(&a, &b)| {
                let mut d = a;
                d -= b;
                d.modulus()
            })
            .fold(T::Real::zero(), |acc, v| if v > acc { v } else { acc })
    }
}

impl<T: Element, const N: usize, const M: usize> std::fmt::Debug for DistArray<T, N, M>
where
    Dim<[usize; N]>: Dimension,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistArray")
            .field("pencil", &self.pencil)
            .field("data", &self.data)
            .finish()
    }
}

impl<T: Element, const N: usize, const M: usize> PartialEq for DistArray<T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    fn eq(&self, other: &Self) -> bool {
        self.pencil.matches(&other.pencil) && self.as_slice() == other.as_slice()
    }
}

impl<T: Element, const N: usize, const M: usize> AddAssign<&DistArray<T, N, M>>
    for DistArray<T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    fn add_assign(&mut self, rhs: &DistArray<T, N, M>) {
        assert!(self.pencil.matches(&rhs.pencil));
        for (a, &b) in self.as_mut_slice().iter_mut().zip(rhs.as_slice()) {
            *a += b;
        }
    }
}

impl<T: Element, const N: usize, const M: usize> SubAssign<&DistArray<T, N, M>>
    for DistArray<T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    fn sub_assign(&mut self, rhs: &DistArray<T, N, M>) {
        assert!(self.pencil.matches(&rhs.pencil));
        for (a, &b) in self.as_mut_slice().iter_mut().zip(rhs.as_slice()) {
            *a -= b;
        }
    }
}

/// Global-index adapter over a [`DistArray`]; reads are restricted to the
/// local range.
pub struct GlobalView<'a, T: Element, const N: usize, const M: usize>
where
    Dim<[usize; N]>: Dimension,
{
    arr: &'a DistArray<T, N, M>,
}

impl<T: Element, const N: usize, const M: usize> GlobalView<'_, T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    /// Fallible global-index read.
    ///
    /// # Errors
    /// [`Error::Index`] outside the local range.
    pub fn get(&self, global: [usize; N]) -> Result<&T> {
        self.arr.get_global(global)
    }

    #[must_use]
    pub fn range(&self) -> [Range<usize>; N] {
        self.arr.local_range()
    }
}

impl<T: Element, const N: usize, const M: usize> Index<[usize; N]> for GlobalView<'_, T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    type Output = T;

    fn index(&self, global: [usize; N]) -> &T {
        match self.arr.get_global(global) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

/// Mutable global-index adapter over a [`DistArray`].
pub struct GlobalViewMut<'a, T: Element, const N: usize, const M: usize>
where
    Dim<[usize; N]>: Dimension,
{
    arr: &'a mut DistArray<T, N, M>,
}

impl<T: Element, const N: usize, const M: usize> GlobalViewMut<'_, T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    /// Fallible global-index write access.
    ///
    /// # Errors
    /// [`Error::Index`] outside the local range.
    pub fn get_mut(&mut self, global: [usize; N]) -> Result<&mut T> {
        self.arr.get_global_mut(global)
    }

    #[must_use]
    pub fn range(&self) -> [Range<usize>; N] {
        self.arr.local_range()
    }
}

impl<T: Element, const N: usize, const M: usize> Index<[usize; N]> for GlobalViewMut<'_, T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    type Output = T;

    fn index(&self, global: [usize; N]) -> &T {
        match self.arr.get_global(global) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T: Element, const N: usize, const M: usize> std::ops::IndexMut<[usize; N]>
    for GlobalViewMut<'_, T, N, M>
where
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    fn index_mut(&mut self, global: [usize; N]) -> &mut T {
        match self.arr.get_global_mut(global) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}
