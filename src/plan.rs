//! Plan compiler and executor.
//!
//! A [`Plan`] chains one 1-D transform per logical axis into a full N-D
//! transform. Stages run over axes `N-1, N-2, …, 0`; every stage's pencil
//! keeps its axis fully local and memory-fastest, and adjacent stages
//! differ in exactly one decomposed axis, so a single transposition
//! connects them. Stage data ping-pongs between two untyped scratch
//! buffers owned by the plan; `apply` therefore takes `&mut self`, which
//! also rules out concurrent applies on one plan.

use crate::array::DistArray;
use crate::dtype::{Dtype, Element, RealScalar};
use crate::error::{Error, Result};
use crate::fft1d::{build_lane, Lane1d};
use crate::pencil::Pencil;
use crate::permutation::Permutation;
use crate::topology::Topology;
use crate::transform::Transform;
use crate::transpose::{self, Route, TransposeMethod};
use log::debug;
use mpi::topology::Communicator;
use ndarray::{Dim, Dimension, IntoDimension};
use num_complex::Complex;
use num_traits::{FromPrimitive, Zero};
use rustdct::DctPlanner;
use rustfft::FftPlanner;
use std::marker::PhantomData;
use std::mem::size_of;
use std::rc::Rc;

/// Growable untyped scratch buffer, viewed as typed slices per stage.
struct ScratchBuf<R: RealScalar> {
    data: Vec<Complex<R>>,
}

impl<R: RealScalar> ScratchBuf<R> {
    fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Typed window of the first `len` elements, growing the buffer as
    /// needed.
    ///
    /// # Errors
    /// [`Error::Oom`] when growth fails.
    fn typed<T: Element<Real = R>>(&mut self, len: usize) -> Result<&mut [T]> {
        let bytes = len * size_of::<T>();
        let unit = size_of::<Complex<R>>();
        let units = (bytes + unit - 1) / unit;
        if self.data.len() < units {
            let additional = units - self.data.len();
            self.data
                .try_reserve(additional)
                .map_err(|_| Error::Oom {
                    bytes: additional * unit,
                })?;
            self.data.resize(units, Complex::zero());
        }
        Ok(&mut bytemuck::cast_slice_mut(&mut self.data[..units])[..len])
    }
}

/// Which scratch buffer currently holds the live stage data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Loc {
    I,
    O,
}

impl Loc {
    fn other(self) -> Self {
        match self {
            Self::I => Self::O,
            Self::O => Self::I,
        }
    }
}

/// Typed window of the buffer at `loc`.
fn at<'a, T: Element>(
    loc: Loc,
    ibuf: &'a mut ScratchBuf<T::Real>,
    obuf: &'a mut ScratchBuf<T::Real>,
    len: usize,
) -> Result<&'a mut [T]> {
    match loc {
        Loc::I => ibuf.typed(len),
        Loc::O => obuf.typed(len),
    }
}

/// Typed windows of the buffer at `loc` and its partner, possibly of
/// different element types.
fn cross<'a, A: Element, B: Element<Real = A::Real>>(
    loc: Loc,
    ibuf: &'a mut ScratchBuf<A::Real>,
    obuf: &'a mut ScratchBuf<A::Real>,
    len_at: usize,
    len_other: usize,
) -> Result<(&'a mut [A], &'a mut [B])> {
    match loc {
        Loc::I => Ok((ibuf.typed(len_at)?, obuf.typed(len_other)?)),
        Loc::O => Ok((obuf.typed(len_at)?, ibuf.typed(len_other)?)),
    }
}

/// Transpose the live data (element type `T`) from `cur` onto `target`,
/// returning where it ended up.
fn move_typed<T: Element, const N: usize, const M: usize>(
    cur: &Pencil<N, M>,
    target: &Pencil<N, M>,
    loc: Loc,
    ibuf: &mut ScratchBuf<T::Real>,
    obuf: &mut ScratchBuf<T::Real>,
    method: TransposeMethod,
) -> Result<Loc> {
    match transpose::route(cur, target)? {
        Route::Local => {
            let (src, dst) = cross::<T, T>(loc, ibuf, obuf, cur.local_len(), target.local_len())?;
            transpose::repermute(cur, src, target, dst);
        }
        Route::Exchange(ex) => {
            {
                let (src, packed) =
                    cross::<T, T>(loc, ibuf, obuf, cur.local_len(), cur.local_len())?;
                transpose::pack(&ex, cur, target, src, packed);
            }
            {
                let (recv, send) =
                    cross::<T, T>(loc, ibuf, obuf, target.local_len(), cur.local_len())?;
                transpose::exchange(&ex, cur.topology(), method, send, recv)?;
            }
            {
                let (recvd, unpacked) =
                    cross::<T, T>(loc, ibuf, obuf, target.local_len(), target.local_len())?;
                transpose::unpack(&ex, cur, target, recvd, unpacked);
            }
        }
    }
    Ok(loc.other())
}

/// Dtype-dispatching wrapper around [`move_typed`].
fn move_to<R: RealScalar, const N: usize, const M: usize>(
    cur: &Pencil<N, M>,
    target: &Pencil<N, M>,
    loc: Loc,
    ibuf: &mut ScratchBuf<R>,
    obuf: &mut ScratchBuf<R>,
    method: TransposeMethod,
) -> Result<Loc>
where
    Complex<R>: Element<Real = R>,
{
    match cur.dtype() {
        Dtype::Real => move_typed::<R, N, M>(cur, target, loc, ibuf, obuf, method),
        Dtype::Complex => move_typed::<Complex<R>, N, M>(cur, target, loc, ibuf, obuf, method),
    }
}

/// Run one prepared 1-D lane plan over the live stage data.
#[allow(clippy::too_many_arguments)]
fn run_lane<R: RealScalar>(
    lane: &Lane1d<R>,
    loc: &mut Loc,
    len_in: usize,
    len_out: usize,
    ibuf: &mut ScratchBuf<R>,
    obuf: &mut ScratchBuf<R>,
    fft_scratch: &mut [Complex<R>],
    lane_tmp: &mut [Complex<R>],
    r2r_scratch: &mut [R],
) -> Result<()>
where
    Complex<R>: Element<Real = R>,
{
    match lane {
        Lane1d::None => {}
        Lane1d::C2c { .. } => {
            lane.run_c2c(at::<Complex<R>>(*loc, ibuf, obuf, len_in)?, fft_scratch);
        }
        Lane1d::R2r { .. } => {
            lane.run_r2r(at::<R>(*loc, ibuf, obuf, len_in)?, r2r_scratch);
        }
        Lane1d::R2c { .. } => {
            let (input, output) = cross::<R, Complex<R>>(*loc, ibuf, obuf, len_in, len_out)?;
            lane.run_r2c(input, output, lane_tmp, fft_scratch);
            *loc = loc.other();
        }
        Lane1d::C2r { .. } => {
            let (input, output) = cross::<Complex<R>, R>(*loc, ibuf, obuf, len_in, len_out)?;
            lane.run_c2r(input, output, lane_tmp, fft_scratch);
            *loc = loc.other();
        }
    }
    Ok(())
}

fn check_pencil<const N: usize, const M: usize>(
    got: &Pencil<N, M>,
    expected: &Pencil<N, M>,
) -> Result<()> {
    if got.matches(expected) {
        Ok(())
    } else {
        Err(Error::Shape {
            got: got.global_shape().to_vec(),
            expected: expected.global_shape().to_vec(),
        })
    }
}

/// One `(pencil in, pencil out, 1-D transform)` triple of a plan.
struct Stage<R: RealScalar, const N: usize, const M: usize> {
    axis: usize,
    transform: Transform,
    pencil_in: Pencil<N, M>,
    pencil_out: Pencil<N, M>,
    forward: Lane1d<R>,
    inverse: Lane1d<R>,
}

/// Distributed N-D transform plan over an M-dimensional process grid.
///
/// `In` and `Out` are the element types of the user-facing input and
/// output arrays; they are validated against the transform list at
/// construction.
pub struct Plan<In, Out, const N: usize, const M: usize>
where
    In: Element,
    Out: Element<Real = In::Real>,
    Complex<In::Real>: Element<Real = In::Real>,
{
    topology: Rc<Topology<M>>,
    transforms: [Transform; N],
    stages: Vec<Stage<In::Real, N, M>>,
    input_pencil: Pencil<N, M>,
    output_pencil: Pencil<N, M>,
    method: TransposeMethod,
    ibuf: ScratchBuf<In::Real>,
    obuf: ScratchBuf<In::Real>,
    fft_scratch: Vec<Complex<In::Real>>,
    lane_tmp: Vec<Complex<In::Real>>,
    r2r_scratch: Vec<In::Real>,
    scale: f64,
    _elems: PhantomData<(In, Out)>,
}

impl<In, Out, const N: usize, const M: usize> Plan<In, Out, N, M>
where
    In: Element,
    Out: Element<Real = In::Real>,
    Complex<In::Real>: Element<Real = In::Real>,
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    /// Compile a plan.
    ///
    /// Collective on `comm` (the process grid is built here). The initial
    /// pencil is decomposed over the first `M` logical axes with identity
    /// memory order; `global_shape` is the logical shape of the *input*
    /// array, and per-axis output lengths follow from `transforms`.
    ///
    /// # Arguments
    /// * `comm`: flat communicator carrying all participating ranks
    /// * `global_shape`: grid points per logical input axis
    /// * `transforms`: the 1-D transform applied along each logical axis
    /// * `proc_dims`: process grid (see [`crate::topology::balanced_dims`])
    /// * `method`: communication strategy of the transpositions
    ///
    /// # Errors
    /// [`Error::Type`] if the transform chain does not connect `In` to
    /// `Out`; [`Error::Config`] for an odd-length real↔complex axis, an
    /// invalid process grid, or a decomposition the stage chain cannot
    /// free up; [`Error::Comm`] from topology construction.
    pub fn new<C: Communicator>(
        comm: &C,
        global_shape: [usize; N],
        transforms: [Transform; N],
        proc_dims: [i32; M],
        method: TransposeMethod,
    ) -> Result<Self> {
        // The chain runs over axes N-1 .. 0; element flavour evolves along
        // the way and must land on `Out`.
        let mut dtype = In::DTYPE;
        for n in (0..N).rev() {
            dtype = transforms[n].output_dtype(dtype)?;
        }
        if dtype != Out::DTYPE {
            return Err(Error::Type(format!(
                "transform chain produces {:?} data, plan output type is {:?}",
                dtype,
                Out::DTYPE
            )));
        }
        for n in 0..N {
            let t = transforms[n];
            if t == Transform::Rfft && global_shape[n] % 2 != 0 {
                return Err(Error::Config(format!(
                    "real transform along axis {n} requires an even length, got {}",
                    global_shape[n]
                )));
            }
            if matches!(t, Transform::Irfft | Transform::Brfft) && global_shape[n] < 2 {
                return Err(Error::Config(format!(
                    "complex-to-real transform along axis {n} needs at least 2 coefficients"
                )));
            }
        }

        let topology = Rc::new(Topology::new(comm, proc_dims)?);
        let init_axes: [usize; M] = std::array::from_fn(|k| k);
        let mut cur = Pencil::new(Rc::clone(&topology), global_shape, init_axes, In::DTYPE)?;

        let mut fft_planner = FftPlanner::new();
        let mut dct_planner = DctPlanner::new();
        let mut stages = Vec::with_capacity(N);
        let mut scale = 1.0;
        for n in (0..N).rev() {
            let mut axes = cur.decomp_axes();
            if let Some(slot) = cur.slot(n) {
                let replacement = n + 1;
                if axes.iter().any(|&a| a == replacement) {
                    return Err(Error::Config(format!(
                        "cannot localise axis {n}: axis {replacement} is already decomposed"
                    )));
                }
                axes[slot] = replacement;
            }
            let pencil_in = cur.derive(axes, Permutation::fastest(n))?;
            debug_assert!(pencil_in.is_local_axis(n));

            let t = transforms[n];
            let n_in = pencil_in.global_shape()[n];
            let out_dtype = t.output_dtype(pencil_in.dtype())?;
            let n_out = t.output_len(n_in);
            let pencil_out = if out_dtype == pencil_in.dtype() && n_out == n_in {
                pencil_in.clone()
            } else {
                let mut shape = pencil_in.global_shape();
                shape[n] = n_out;
                pencil_in.with_shape(shape)?.with_dtype(out_dtype)
            };

            let forward = build_lane(t, n_in, &mut fft_planner, &mut dct_planner)?;
            let inverse = build_lane(
                t.unnormalized_inverse(),
                n_out,
                &mut fft_planner,
                &mut dct_planner,
            )?;
            scale *= t.scale_factor(n_in);
            debug!(
                "stage axis {n}: {:?}, {:?} -> {:?}",
                t, pencil_in, pencil_out
            );
            cur = pencil_out.clone();
            stages.push(Stage {
                axis: n,
                transform: t,
                pencil_in,
                pencil_out,
                forward,
                inverse,
            });
        }

        let mut fft_len = 0;
        let mut tmp_len = 0;
        let mut r2r_len = 0;
        for s in &stages {
            for lane in [&s.forward, &s.inverse] {
                fft_len = fft_len.max(lane.fft_scratch_len());
                tmp_len = tmp_len.max(lane.tmp_len());
                r2r_len = r2r_len.max(lane.real_scratch_len());
            }
        }

        let input_pencil = stages.first().expect("N >= 1 stages").pencil_in.clone();
        let output_pencil = stages.last().expect("N >= 1 stages").pencil_out.clone();
        debug!(
            "plan compiled: {:?} -> {:?}, {} stages, scale {}",
            input_pencil.global_shape(),
            output_pencil.global_shape(),
            stages.len(),
            scale
        );
        Ok(Self {
            topology,
            transforms,
            stages,
            input_pencil,
            output_pencil,
            method,
            ibuf: ScratchBuf::new(),
            obuf: ScratchBuf::new(),
            fft_scratch: vec![Complex::zero(); fft_len],
            lane_tmp: vec![Complex::zero(); tmp_len],
            r2r_scratch: vec![In::Real::zero(); r2r_len],
            scale,
            _elems: PhantomData,
        })
    }

    /// Allocate a zeroed array on the plan's input pencil.
    ///
    /// The array shares only the topology with the plan and may outlive it.
    ///
    /// # Errors
    /// Does not fail for a plan constructed through [`Plan::new`].
    pub fn allocate_input(&self) -> Result<DistArray<In, N, M>> {
        DistArray::zeros(&self.input_pencil)
    }

    /// Allocate a zeroed array on the plan's output pencil.
    ///
    /// # Errors
    /// Does not fail for a plan constructed through [`Plan::new`].
    pub fn allocate_output(&self) -> Result<DistArray<Out, N, M>> {
        DistArray::zeros(&self.output_pencil)
    }

    /// Apply the forward N-D transform of `src` into `dst`.
    ///
    /// Collective: every rank of the plan's topology must call in
    /// lock-step with arrays on the matching pencils.
    ///
    /// # Errors
    /// [`Error::Shape`] unless `src` lives on the input pencil and `dst`
    /// on the output pencil; [`Error::Comm`]/[`Error::Oom`] from the
    /// transpositions and scratch buffers.
    pub fn apply_forward(
        &mut self,
        dst: &mut DistArray<Out, N, M>,
        src: &DistArray<In, N, M>,
    ) -> Result<()> {
        check_pencil(src.pencil(), &self.input_pencil)?;
        check_pencil(dst.pencil(), &self.output_pencil)?;
        let method = self.method;
        let Self {
            stages,
            ibuf,
            obuf,
            fft_scratch,
            lane_tmp,
            r2r_scratch,
            ..
        } = self;

        ibuf.typed::<In>(src.len())?.copy_from_slice(src.as_slice());
        let mut loc = Loc::I;
        let mut cur = stages[0].pencil_in.clone();
        for stage in stages.iter() {
            if !cur.matches(&stage.pencil_in) {
                loc = move_to::<In::Real, N, M>(&cur, &stage.pencil_in, loc, ibuf, obuf, method)?;
            }
            run_lane(
                &stage.forward,
                &mut loc,
                stage.pencil_in.local_len(),
                stage.pencil_out.local_len(),
                ibuf,
                obuf,
                fft_scratch.as_mut_slice(),
                lane_tmp.as_mut_slice(),
                r2r_scratch.as_mut_slice(),
            )?;
            cur = stage.pencil_out.clone();
        }
        let out = at::<Out>(loc, ibuf, obuf, dst.len())?;
        dst.as_mut_slice().copy_from_slice(out);
        Ok(())
    }

    /// Apply the inverse N-D transform without normalisation: stages run
    /// in reverse order with each transform's unnormalised inverse, so the
    /// round trip scales by [`Plan::scale_factor`].
    ///
    /// # Errors
    /// [`Error::Shape`] unless `src` lives on the output pencil and `dst`
    /// on the input pencil; otherwise as [`Plan::apply_forward`].
    pub fn apply_inverse_unnormalized(
        &mut self,
        dst: &mut DistArray<In, N, M>,
        src: &DistArray<Out, N, M>,
    ) -> Result<()> {
        check_pencil(src.pencil(), &self.output_pencil)?;
        check_pencil(dst.pencil(), &self.input_pencil)?;
        let method = self.method;
        let Self {
            stages,
            ibuf,
            obuf,
            fft_scratch,
            lane_tmp,
            r2r_scratch,
            ..
        } = self;

        ibuf.typed::<Out>(src.len())?.copy_from_slice(src.as_slice());
        let mut loc = Loc::I;
        let mut cur = stages.last().expect("N >= 1 stages").pencil_out.clone();
        for stage in stages.iter().rev() {
            if !cur.matches(&stage.pencil_out) {
                loc = move_to::<In::Real, N, M>(&cur, &stage.pencil_out, loc, ibuf, obuf, method)?;
            }
            run_lane(
                &stage.inverse,
                &mut loc,
                stage.pencil_out.local_len(),
                stage.pencil_in.local_len(),
                ibuf,
                obuf,
                fft_scratch.as_mut_slice(),
                lane_tmp.as_mut_slice(),
                r2r_scratch.as_mut_slice(),
            )?;
            cur = stage.pencil_in.clone();
        }
        let out = at::<In>(loc, ibuf, obuf, dst.len())?;
        dst.as_mut_slice().copy_from_slice(out);
        Ok(())
    }

    /// Apply the normalised inverse N-D transform: the unnormalised
    /// inverse followed by division by [`Plan::scale_factor`].
    ///
    /// # Errors
    /// As [`Plan::apply_inverse_unnormalized`].
    pub fn apply_inverse(
        &mut self,
        dst: &mut DistArray<In, N, M>,
        src: &DistArray<Out, N, M>,
    ) -> Result<()> {
        self.apply_inverse_unnormalized(dst, src)?;
        let inv = In::Real::from_f64(1.0 / self.scale)
            .ok_or_else(|| Error::Type("scale factor does not fit the scalar type".into()))?;
        dst.scale(inv);
        Ok(())
    }

    /// Forward transform into a freshly allocated output array.
    ///
    /// # Errors
    /// As [`Plan::apply_forward`].
    pub fn forward(&mut self, src: &DistArray<In, N, M>) -> Result<DistArray<Out, N, M>> {
        let mut dst = self.allocate_output()?;
        self.apply_forward(&mut dst, src)?;
        Ok(dst)
    }

    /// Normalised inverse transform into a freshly allocated input array.
    ///
    /// # Errors
    /// As [`Plan::apply_inverse`].
    pub fn inverse(&mut self, src: &DistArray<Out, N, M>) -> Result<DistArray<In, N, M>> {
        let mut dst = self.allocate_input()?;
        self.apply_inverse(&mut dst, src)?;
        Ok(dst)
    }

    #[must_use]
    pub fn input_pencil(&self) -> &Pencil<N, M> {
        &self.input_pencil
    }

    #[must_use]
    pub fn output_pencil(&self) -> &Pencil<N, M> {
        &self.output_pencil
    }

    /// Global index range owned locally on the input side.
    #[must_use]
    pub fn input_range(&self) -> [std::ops::Range<usize>; N] {
        self.input_pencil.local_range()
    }

    /// Global index range owned locally on the output side.
    #[must_use]
    pub fn output_range(&self) -> [std::ops::Range<usize>; N] {
        self.output_pencil.local_range()
    }

    #[must_use]
    pub fn global_shape_in(&self) -> [usize; N] {
        self.input_pencil.global_shape()
    }

    #[must_use]
    pub fn global_shape_out(&self) -> [usize; N] {
        self.output_pencil.global_shape()
    }

    #[must_use]
    pub fn topology(&self) -> &Rc<Topology<M>> {
        &self.topology
    }

    #[must_use]
    pub fn transforms(&self) -> [Transform; N] {
        self.transforms
    }

    #[must_use]
    pub fn transpose_method(&self) -> TransposeMethod {
        self.method
    }

    /// Divisor normalising a forward + unnormalised-inverse round trip:
    /// the product of the per-axis transform scale factors.
    #[must_use]
    pub fn scale_factor(&self) -> f64 {
        self.scale
    }

    /// The logical axis and transform of every stage, in execution order.
    #[must_use]
    pub fn stage_layout(&self) -> Vec<(usize, Transform)> {
        self.stages.iter().map(|s| (s.axis, s.transform)).collect()
    }
}

impl<R, const N: usize, const M: usize> Plan<R, Complex<R>, N, M>
where
    R: RealScalar,
    Complex<R>: Element<Real = R>,
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    /// Real-to-complex plan: `Rfft` along the last (memory-fastest) axis,
    /// `Fft` along the rest.
    ///
    /// # Errors
    /// As [`Plan::new`]; the last axis length must be even.
    pub fn r2c<C: Communicator>(
        comm: &C,
        global_shape: [usize; N],
        proc_dims: [i32; M],
        method: TransposeMethod,
    ) -> Result<Self> {
        let mut transforms = [Transform::Fft; N];
        transforms[N - 1] = Transform::Rfft;
        Self::new(comm, global_shape, transforms, proc_dims, method)
    }
}

impl<R, const N: usize, const M: usize> Plan<Complex<R>, Complex<R>, N, M>
where
    R: RealScalar,
    Complex<R>: Element<Real = R>,
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    /// Complex-to-complex plan: `Fft` along every axis.
    ///
    /// # Errors
    /// As [`Plan::new`].
    pub fn c2c<C: Communicator>(
        comm: &C,
        global_shape: [usize; N],
        proc_dims: [i32; M],
        method: TransposeMethod,
    ) -> Result<Self> {
        Self::new(
            comm,
            global_shape,
            [Transform::Fft; N],
            proc_dims,
            method,
        )
    }
}

impl<R, const N: usize, const M: usize> Plan<R, R, N, M>
where
    R: RealScalar,
    Complex<R>: Element<Real = R>,
    Dim<[usize; N]>: Dimension,
    [usize; N]: IntoDimension<Dim = Dim<[usize; N]>>,
{
    /// Real-to-real plan applying the same kind along every axis.
    ///
    /// # Errors
    /// As [`Plan::new`].
    pub fn r2r<C: Communicator>(
        comm: &C,
        global_shape: [usize; N],
        kind: crate::transform::R2rKind,
        proc_dims: [i32; M],
        method: TransposeMethod,
    ) -> Result<Self> {
        Self::new(
            comm,
            global_shape,
            [Transform::R2r(kind); N],
            proc_dims,
            method,
        )
    }
}
