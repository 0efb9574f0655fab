//! 1-D stage executors.
//!
//! Every plan stage operates along its pencil's memory-fastest axis, so the
//! local block is a dense sequence of equally long lanes. The executors
//! here run one prepared 1-D transform over all lanes of a buffer. Complex
//! transforms come straight from the FFT library; the real↔complex pair is
//! expressed through a full-length complex FFT with a pack / Hermitian
//! mirror step around it; real-to-real kinds come from the DCT library.

use crate::dtype::RealScalar;
use crate::error::Result;
use crate::transform::{R2rKind, Transform};
use num_complex::Complex;
use num_traits::{FromPrimitive, One, Zero};
use rustdct::{Dct2, Dct3, Dct4, DctPlanner, Dst2, Dst3, Dst4, RequiredScratch};
use rustdct::{TransformType2And3, TransformType4};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

pub(crate) enum R2rPlan<R: RealScalar> {
    Type23(Arc<dyn TransformType2And3<R>>),
    Type4(Arc<dyn TransformType4<R>>),
}

/// A prepared 1-D transform, executable over all lanes of a stage buffer.
pub(crate) enum Lane1d<R: RealScalar> {
    None,
    C2c {
        fft: Arc<dyn Fft<R>>,
        len: usize,
        normalize: bool,
    },
    R2c {
        fft: Arc<dyn Fft<R>>,
        /// Real lane length; complex lanes keep `n / 2 + 1` coefficients.
        n: usize,
    },
    C2r {
        fft: Arc<dyn Fft<R>>,
        /// Real lane length.
        n: usize,
        normalize: bool,
    },
    R2r {
        kind: R2rKind,
        plan: R2rPlan<R>,
        len: usize,
    },
}

/// Prepare the 1-D plan for `transform` on input lanes of length `n_in`.
///
/// # Errors
/// None today; kept fallible so planner-side validation can surface here.
pub(crate) fn build_lane<R: RealScalar>(
    transform: Transform,
    n_in: usize,
    fft_planner: &mut FftPlanner<R>,
    dct_planner: &mut DctPlanner<R>,
) -> Result<Lane1d<R>> {
    let lane = match transform {
        Transform::None => Lane1d::None,
        Transform::Fft => Lane1d::C2c {
            fft: fft_planner.plan_fft_forward(n_in),
            len: n_in,
            normalize: false,
        },
        Transform::Ifft => Lane1d::C2c {
            fft: fft_planner.plan_fft_inverse(n_in),
            len: n_in,
            normalize: true,
        },
        Transform::Bfft => Lane1d::C2c {
            fft: fft_planner.plan_fft_inverse(n_in),
            len: n_in,
            normalize: false,
        },
        Transform::Rfft => Lane1d::R2c {
            fft: fft_planner.plan_fft_forward(n_in),
            n: n_in,
        },
        Transform::Irfft | Transform::Brfft => {
            let n = transform.output_len(n_in);
            Lane1d::C2r {
                fft: fft_planner.plan_fft_inverse(n),
                n,
                normalize: transform == Transform::Irfft,
            }
        }
        Transform::R2r(kind) => {
            let plan = match kind {
                R2rKind::Dct2 => R2rPlan::Type23(dct_planner.plan_dct2(n_in)),
                R2rKind::Dct3 => R2rPlan::Type23(dct_planner.plan_dct3(n_in)),
                R2rKind::Dst2 => R2rPlan::Type23(dct_planner.plan_dst2(n_in)),
                R2rKind::Dst3 => R2rPlan::Type23(dct_planner.plan_dst3(n_in)),
                R2rKind::Dct4 => R2rPlan::Type4(dct_planner.plan_dct4(n_in)),
                R2rKind::Dst4 => R2rPlan::Type4(dct_planner.plan_dst4(n_in)),
            };
            Lane1d::R2r {
                kind,
                plan,
                len: n_in,
            }
        }
    };
    Ok(lane)
}

impl<R: RealScalar> Lane1d<R> {
    /// Complex scratch demanded by the FFT library.
    pub(crate) fn fft_scratch_len(&self) -> usize {
        match self {
            Self::C2c { fft, .. } | Self::R2c { fft, .. } | Self::C2r { fft, .. } => {
                fft.get_inplace_scratch_len()
            }
            _ => 0,
        }
    }

    /// Full-length complex lane buffer for the real↔complex wrappers.
    pub(crate) fn tmp_len(&self) -> usize {
        match self {
            Self::R2c { n, .. } | Self::C2r { n, .. } => *n,
            _ => 0,
        }
    }

    /// Real scratch demanded by the DCT library.
    pub(crate) fn real_scratch_len(&self) -> usize {
        match self {
            Self::R2r { plan, .. } => match plan {
                R2rPlan::Type23(p) => p.get_scratch_len(),
                R2rPlan::Type4(p) => p.get_scratch_len(),
            },
            _ => 0,
        }
    }

    /// In-place complex transform over all lanes of `buf`.
    ///
    /// # Panics
    /// If called on a lane plan of a different kind.
    pub(crate) fn run_c2c(&self, buf: &mut [Complex<R>], scratch: &mut [Complex<R>]) {
        let Self::C2c { fft, len, normalize } = self else {
            unreachable!("stage executor mismatch: expected a c2c lane plan");
        };
        let inv_len = normalization(*len);
        for lane in buf.chunks_exact_mut(*len) {
            fft.process_with_scratch(lane, scratch);
            if *normalize {
                for x in lane {
                    *x = x.scale(inv_len);
                }
            }
        }
    }

    /// Real-to-complex transform from `input` lanes into `output` lanes.
    ///
    /// # Panics
    /// If called on a lane plan of a different kind.
    pub(crate) fn run_r2c(
        &self,
        input: &[R],
        output: &mut [Complex<R>],
        tmp: &mut [Complex<R>],
        scratch: &mut [Complex<R>],
    ) {
        let Self::R2c { fft, n } = self else {
            unreachable!("stage executor mismatch: expected an r2c lane plan");
        };
        let n = *n;
        let n_out = n / 2 + 1;
        let tmp = &mut tmp[..n];
        for (in_lane, out_lane) in input.chunks_exact(n).zip(output.chunks_exact_mut(n_out)) {
            for (t, &x) in tmp.iter_mut().zip(in_lane) {
                *t = Complex::new(x, R::zero());
            }
            fft.process_with_scratch(tmp, scratch);
            out_lane.copy_from_slice(&tmp[..n_out]);
        }
    }

    /// Complex-to-real transform from `input` lanes into `output` lanes,
    /// reconstructing the Hermitian-symmetric spectrum first.
    ///
    /// # Panics
    /// If called on a lane plan of a different kind.
    pub(crate) fn run_c2r(
        &self,
        input: &[Complex<R>],
        output: &mut [R],
        tmp: &mut [Complex<R>],
        scratch: &mut [Complex<R>],
    ) {
        let Self::C2r { fft, n, normalize } = self else {
            unreachable!("stage executor mismatch: expected a c2r lane plan");
        };
        let n = *n;
        let n_in = n / 2 + 1;
        let inv_len = normalization(n);
        let tmp = &mut tmp[..n];
        for (in_lane, out_lane) in input.chunks_exact(n_in).zip(output.chunks_exact_mut(n)) {
            tmp[..n_in].copy_from_slice(in_lane);
            for j in n_in..n {
                tmp[j] = tmp[n - j].conj();
            }
            fft.process_with_scratch(tmp, scratch);
            if *normalize {
                for (o, t) in out_lane.iter_mut().zip(tmp.iter()) {
                    *o = t.re * inv_len;
                }
            } else {
                for (o, t) in out_lane.iter_mut().zip(tmp.iter()) {
                    *o = t.re;
                }
            }
        }
    }

    /// In-place real-to-real transform over all lanes of `buf`.
    ///
    /// # Panics
    /// If called on a lane plan of a different kind.
    pub(crate) fn run_r2r(&self, buf: &mut [R], scratch: &mut [R]) {
        let Self::R2r { kind, plan, len } = self else {
            unreachable!("stage executor mismatch: expected an r2r lane plan");
        };
        for lane in buf.chunks_exact_mut(*len) {
            match (plan, kind) {
                (R2rPlan::Type23(p), R2rKind::Dct2) => p.process_dct2_with_scratch(lane, scratch),
                (R2rPlan::Type23(p), R2rKind::Dct3) => p.process_dct3_with_scratch(lane, scratch),
                (R2rPlan::Type23(p), R2rKind::Dst2) => p.process_dst2_with_scratch(lane, scratch),
                (R2rPlan::Type23(p), R2rKind::Dst3) => p.process_dst3_with_scratch(lane, scratch),
                (R2rPlan::Type4(p), R2rKind::Dct4) => p.process_dct4_with_scratch(lane, scratch),
                (R2rPlan::Type4(p), R2rKind::Dst4) => p.process_dst4_with_scratch(lane, scratch),
                _ => unreachable!("r2r plan built for a different kind"),
            }
        }
    }
}

fn normalization<R: RealScalar>(n: usize) -> R {
    R::one() / R::from_usize(n).expect("axis length fits the scalar type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Transform;
    use float_cmp::approx_eq;

    fn planners() -> (FftPlanner<f64>, DctPlanner<f64>) {
        (FftPlanner::new(), DctPlanner::new())
    }

    #[test]
    fn c2c_roundtrip_scales_by_len() {
        let (mut fp, mut dp) = planners();
        let fwd = build_lane::<f64>(Transform::Fft, 8, &mut fp, &mut dp).unwrap();
        let bwd = build_lane::<f64>(Transform::Bfft, 8, &mut fp, &mut dp).unwrap();
        let mut scratch = vec![Complex::zero(); fwd.fft_scratch_len().max(bwd.fft_scratch_len())];
        let orig: Vec<Complex<f64>> = (0..8)
            .map(|i| Complex::new(f64::from(i), -0.5 * f64::from(i)))
            .collect();
        let mut buf = orig.clone();
        fwd.run_c2c(&mut buf, &mut scratch);
        bwd.run_c2c(&mut buf, &mut scratch);
        for (a, b) in buf.iter().zip(orig.iter()) {
            assert!(approx_eq!(f64, a.re, 8.0 * b.re, epsilon = 1e-12));
            assert!(approx_eq!(f64, a.im, 8.0 * b.im, epsilon = 1e-12));
        }
    }

    #[test]
    fn r2c_then_c2r_recovers_input() {
        let (mut fp, mut dp) = planners();
        let n = 16;
        let fwd = build_lane::<f64>(Transform::Rfft, n, &mut fp, &mut dp).unwrap();
        let bwd = build_lane::<f64>(Transform::Irfft, n / 2 + 1, &mut fp, &mut dp).unwrap();
        let mut tmp = vec![Complex::zero(); n];
        let mut scratch = vec![Complex::zero(); fwd.fft_scratch_len().max(bwd.fft_scratch_len())];
        let input: Vec<f64> = (0..n).map(|i| (0.3 * i as f64).sin() + 0.1).collect();
        let mut spectrum = vec![Complex::zero(); n / 2 + 1];
        fwd.run_r2c(&input, &mut spectrum, &mut tmp, &mut scratch);
        let mut back = vec![0.0; n];
        bwd.run_c2r(&spectrum, &mut back, &mut tmp, &mut scratch);
        for (a, b) in back.iter().zip(input.iter()) {
            assert!(approx_eq!(f64, *a, *b, epsilon = 1e-12), "{a} vs {b}");
        }
    }

    #[test]
    fn dct2_dct3_roundtrip_scales_by_half_len() {
        let (mut fp, mut dp) = planners();
        let n = 12;
        let fwd = build_lane::<f64>(Transform::R2r(R2rKind::Dct2), n, &mut fp, &mut dp).unwrap();
        let bwd = build_lane::<f64>(Transform::R2r(R2rKind::Dct3), n, &mut fp, &mut dp).unwrap();
        let mut scratch =
            vec![0.0; fwd.real_scratch_len().max(bwd.real_scratch_len())];
        let orig: Vec<f64> = (0..n).map(|i| (i as f64).cos()).collect();
        let mut buf = orig.clone();
        fwd.run_r2r(&mut buf, &mut scratch);
        bwd.run_r2r(&mut buf, &mut scratch);
        let scale = n as f64 / 2.0;
        for (a, b) in buf.iter().zip(orig.iter()) {
            assert!(approx_eq!(f64, *a, scale * b, epsilon = 1e-9), "{a} vs {b}");
        }
    }
}
