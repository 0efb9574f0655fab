//! # Pencil distributed data
//!
//! A [`Pencil`] describes one configuration of an N-dimensional global grid
//! over an M-dimensional process grid: which axes are decomposed over which
//! grid dimension, which stay local, and in what order the local axes sit
//! in memory. It holds no data; [`crate::array::DistArray`] pairs a pencil
//! with a buffer.

use crate::distribution::Distribution;
use crate::dtype::Dtype;
use crate::error::{Error, Result};
use crate::permutation::Permutation;
use crate::topology::Topology;
use std::ops::Range;
use std::rc::Rc;

/// Pencil distribution descriptor.
///
/// *N* is the number of grid dimensions, *M* the number of decomposed axes;
/// `M <= N - 1`, so at least one axis is fully local on every process.
#[derive(Clone)]
pub struct Pencil<const N: usize, const M: usize> {
    topology: Rc<Topology<M>>,
    global_shape: [usize; N],
    decomp_axes: [usize; M],
    perm: Permutation<N>,
    dtype: Dtype,
    dists: [Distribution; N],
}

impl<const N: usize, const M: usize> Pencil<N, M> {
    /// Construct a pencil with identity memory order.
    ///
    /// # Arguments
    /// * `topology`: process grid; axis `decomp_axes[k]` is split over grid
    ///   dimension `k`
    /// * `global_shape`: grid points per logical axis
    /// * `decomp_axes`: decomposed axes, all distinct
    /// * `dtype`: element flavour of the data living on this pencil
    ///
    /// # Errors
    /// [`Error::Config`] on `M >= N`, an empty global axis, or duplicate or
    /// out-of-range decomposed axes.
    pub fn new(
        topology: Rc<Topology<M>>,
        global_shape: [usize; N],
        decomp_axes: [usize; M],
        dtype: Dtype,
    ) -> Result<Self> {
        if M >= N {
            return Err(Error::Config(format!(
                "{} decomposed axes leave no local axis in a {}-dimensional grid",
                M, N
            )));
        }
        if global_shape.iter().any(|&s| s == 0) {
            return Err(Error::Config(format!("empty global shape {global_shape:?}")));
        }
        let mut seen = [false; N];
        for &a in &decomp_axes {
            if a >= N || seen[a] {
                return Err(Error::Config(format!(
                    "decomposed axes {decomp_axes:?} are not distinct axes of 0..{}",
                    N
                )));
            }
            seen[a] = true;
        }
        let dists: [Distribution; N] = std::array::from_fn(|a| {
            match decomp_axes.iter().position(|&d| d == a) {
                Some(k) => {
                    Distribution::split(global_shape[a], topology.nprocs(k), topology.coord(k))
                }
                None => Distribution::contiguous(global_shape[a]),
            }
        });
        Ok(Self {
            topology,
            global_shape,
            decomp_axes,
            perm: Permutation::identity(),
            dtype,
            dists,
        })
    }

    /// Same pencil with a different memory order.
    #[must_use]
    pub fn with_permutation(mut self, perm: Permutation<N>) -> Self {
        self.perm = perm;
        self
    }

    /// Derive a pencil on the same topology, shape and dtype with different
    /// decomposed axes and memory order.
    ///
    /// # Errors
    /// Same conditions as [`Pencil::new`].
    pub fn derive(&self, decomp_axes: [usize; M], perm: Permutation<N>) -> Result<Self> {
        Ok(Self::new(
            Rc::clone(&self.topology),
            self.global_shape,
            decomp_axes,
            self.dtype,
        )?
        .with_permutation(perm))
    }

    /// Derive a pencil with a different global shape, keeping everything
    /// else.
    ///
    /// # Errors
    /// [`Error::Config`] on an empty axis.
    pub fn with_shape(&self, global_shape: [usize; N]) -> Result<Self> {
        Ok(Self::new(
            Rc::clone(&self.topology),
            global_shape,
            self.decomp_axes,
            self.dtype,
        )?
        .with_permutation(self.perm))
    }

    /// Derive a pencil with a different element flavour.
    #[must_use]
    pub fn with_dtype(&self, dtype: Dtype) -> Self {
        let mut p = self.clone();
        p.dtype = dtype;
        p
    }

    #[must_use]
    pub fn topology(&self) -> &Rc<Topology<M>> {
        &self.topology
    }

    #[must_use]
    pub fn global_shape(&self) -> [usize; N] {
        self.global_shape
    }

    #[must_use]
    pub fn global_len(&self) -> usize {
        self.global_shape.iter().product()
    }

    #[must_use]
    pub fn decomp_axes(&self) -> [usize; M] {
        self.decomp_axes
    }

    #[must_use]
    pub fn permutation(&self) -> Permutation<N> {
        self.perm
    }

    #[must_use]
    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Distribution of `axis` over its sub-communicator (or the whole axis
    /// if local).
    #[must_use]
    pub fn dist(&self, axis: usize) -> &Distribution {
        &self.dists[axis]
    }

    /// Grid-dimension slot of `axis`, if it is decomposed.
    #[must_use]
    pub fn slot(&self, axis: usize) -> Option<usize> {
        self.decomp_axes.iter().position(|&a| a == axis)
    }

    #[must_use]
    pub fn is_local_axis(&self, axis: usize) -> bool {
        self.slot(axis).is_none()
    }

    /// Global index range owned locally, in logical axis order.
    #[must_use]
    pub fn local_range(&self) -> [Range<usize>; N] {
        std::array::from_fn(|a| self.dists[a].range())
    }

    /// Local shape in logical axis order.
    #[must_use]
    pub fn local_shape(&self) -> [usize; N] {
        std::array::from_fn(|a| self.dists[a].sz)
    }

    /// Local shape in memory order (dimension `N - 1` fastest).
    #[must_use]
    pub fn shape_mem(&self) -> [usize; N] {
        self.perm.apply(self.local_shape())
    }

    /// Total number of local elements.
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.local_shape().iter().product()
    }

    /// Element stride of each logical axis in the local buffer.
    #[must_use]
    pub fn axis_strides(&self) -> [usize; N] {
        let shape_mem = self.shape_mem();
        let mut stride_mem = [1usize; N];
        for d in (0..N.saturating_sub(1)).rev() {
            stride_mem[d] = stride_mem[d + 1] * shape_mem[d + 1];
        }
        self.perm.apply_inverse(stride_mem)
    }

    /// Whether two pencils describe the same distribution of the same grid
    /// (same topology object, shape, decomposition, memory order and
    /// element flavour).
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.topology, &other.topology)
            && self.global_shape == other.global_shape
            && self.decomp_axes == other.decomp_axes
            && self.perm == other.perm
            && self.dtype == other.dtype
    }
}

impl<const N: usize, const M: usize> std::fmt::Debug for Pencil<N, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pencil")
            .field("global_shape", &self.global_shape)
            .field("decomp_axes", &self.decomp_axes)
            .field("perm", &self.perm.axes())
            .field("dtype", &self.dtype)
            .field("local_shape", &self.local_shape())
            .finish()
    }
}
