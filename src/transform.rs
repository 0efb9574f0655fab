//! 1-D transform descriptors.
//!
//! A [`Transform`] names what happens along one axis of a plan: how the
//! element flavour and the axis length evolve, what the unnormalised
//! inverse is, and how much a forward/inverse round trip scales the data.
//! The actual numerics are delegated to the 1-D transform libraries by the
//! plan compiler (see `fft1d`).

use crate::dtype::Dtype;
use crate::error::{Error, Result};

/// Real-to-real transform kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R2rKind {
    Dct2,
    Dct3,
    Dct4,
    Dst2,
    Dst3,
    Dst4,
}

impl R2rKind {
    /// The kind that undoes this one (up to the library's `n/2` factor).
    #[must_use]
    pub fn paired(self) -> Self {
        match self {
            Self::Dct2 => Self::Dct3,
            Self::Dct3 => Self::Dct2,
            Self::Dst2 => Self::Dst3,
            Self::Dst3 => Self::Dst2,
            Self::Dct4 | Self::Dst4 => self,
        }
    }
}

/// One axis-local 1-D transform of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Leave the axis untouched.
    None,
    /// Complex-to-complex forward FFT.
    Fft,
    /// Normalised complex-to-complex inverse FFT.
    Ifft,
    /// Unnormalised complex-to-complex inverse FFT.
    Bfft,
    /// Real-to-complex forward FFT; keeps `n/2 + 1` coefficients.
    Rfft,
    /// Normalised complex-to-real inverse FFT.
    Irfft,
    /// Unnormalised complex-to-real inverse FFT.
    Brfft,
    /// Real-to-real transform of the given kind.
    R2r(R2rKind),
}

impl Transform {
    #[must_use]
    pub fn is_identity(self) -> bool {
        self == Self::None
    }

    /// Element flavour produced from `input`.
    ///
    /// # Errors
    /// [`Error::Type`] if the transform does not accept `input`.
    pub fn output_dtype(self, input: Dtype) -> Result<Dtype> {
        let out = match (self, input) {
            (Self::None, d) => d,
            (Self::Fft | Self::Ifft | Self::Bfft, Dtype::Complex) => Dtype::Complex,
            (Self::Rfft, Dtype::Real) => Dtype::Complex,
            (Self::Irfft | Self::Brfft, Dtype::Complex) => Dtype::Real,
            (Self::R2r(_), Dtype::Real) => Dtype::Real,
            (t, d) => {
                return Err(Error::Type(format!("{t:?} does not accept {d:?} input")));
            }
        };
        Ok(out)
    }

    /// Axis length produced from an input length of `n`.
    #[must_use]
    pub fn output_len(self, n: usize) -> usize {
        match self {
            Self::Rfft => n / 2 + 1,
            Self::Irfft | Self::Brfft => 2 * (n - 1),
            _ => n,
        }
    }

    /// The transform undoing this one up to [`Transform::scale_factor`],
    /// as used by inverse plan traversal. The normalised kinds divide
    /// internally, so the plain forward transform undoes them exactly.
    #[must_use]
    pub fn unnormalized_inverse(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Fft => Self::Bfft,
            Self::Ifft | Self::Bfft => Self::Fft,
            Self::Rfft => Self::Brfft,
            Self::Irfft | Self::Brfft => Self::Rfft,
            Self::R2r(k) => Self::R2r(k.paired()),
        }
    }

    /// The normalised inverse from the transform catalogue.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Fft => Self::Ifft,
            Self::Ifft | Self::Bfft => Self::Fft,
            Self::Rfft => Self::Irfft,
            Self::Irfft | Self::Brfft => Self::Rfft,
            Self::R2r(k) => Self::R2r(k.paired()),
        }
    }

    /// Divisor this axis contributes to normalising the round trip
    /// `unnormalized_inverse ∘ self` for an input length of `n`.
    ///
    /// Unnormalised Fourier kinds contribute the full (real-side) axis
    /// length; the normalised kinds already divide internally and
    /// contribute `1`; the real-to-real kinds follow the 1-D library's
    /// convention of `n/2`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn scale_factor(self, n: usize) -> f64 {
        match self {
            Self::None | Self::Ifft | Self::Irfft => 1.0,
            Self::Fft | Self::Bfft | Self::Rfft => n as f64,
            Self::Brfft => self.output_len(n) as f64,
            Self::R2r(_) => n as f64 / 2.0,
        }
    }

    /// Whether the transform connects real and complex data, which pins
    /// the (even) logical length of its axis.
    #[must_use]
    pub fn is_real_complex(self) -> bool {
        matches!(self, Self::Rfft | Self::Irfft | Self::Brfft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_rules_follow_the_catalogue() {
        assert_eq!(
            Transform::Fft.output_dtype(Dtype::Complex).unwrap(),
            Dtype::Complex
        );
        assert_eq!(
            Transform::Rfft.output_dtype(Dtype::Real).unwrap(),
            Dtype::Complex
        );
        assert_eq!(
            Transform::Brfft.output_dtype(Dtype::Complex).unwrap(),
            Dtype::Real
        );
        assert_eq!(
            Transform::R2r(R2rKind::Dct2).output_dtype(Dtype::Real).unwrap(),
            Dtype::Real
        );
        assert_eq!(Transform::None.output_dtype(Dtype::Real).unwrap(), Dtype::Real);
        assert!(Transform::Fft.output_dtype(Dtype::Real).is_err());
        assert!(Transform::Rfft.output_dtype(Dtype::Complex).is_err());
        assert!(Transform::R2r(R2rKind::Dst4).output_dtype(Dtype::Complex).is_err());
    }

    #[test]
    fn length_rules() {
        assert_eq!(Transform::Rfft.output_len(16), 9);
        assert_eq!(Transform::Brfft.output_len(9), 16);
        assert_eq!(Transform::Irfft.output_len(9), 16);
        assert_eq!(Transform::Fft.output_len(21), 21);
        assert_eq!(Transform::R2r(R2rKind::Dct4).output_len(7), 7);
    }

    #[test]
    fn inverse_pairing() {
        // Double inversion of an unnormalised transform is the identity.
        for t in [
            Transform::None,
            Transform::Fft,
            Transform::Bfft,
            Transform::Rfft,
            Transform::Brfft,
            Transform::R2r(R2rKind::Dct2),
            Transform::R2r(R2rKind::Dst4),
        ] {
            assert_eq!(t.unnormalized_inverse().unnormalized_inverse(), t);
        }
        // The normalised kinds are undone by the plain forward transforms.
        assert_eq!(Transform::Ifft.unnormalized_inverse(), Transform::Fft);
        assert_eq!(Transform::Irfft.unnormalized_inverse(), Transform::Rfft);
        assert_eq!(Transform::Fft.inverse(), Transform::Ifft);
        assert_eq!(Transform::Rfft.inverse(), Transform::Irfft);
        assert_eq!(
            Transform::R2r(R2rKind::Dct2).inverse(),
            Transform::R2r(R2rKind::Dct3)
        );
    }

    #[test]
    fn scale_factors() {
        assert_eq!(Transform::Fft.scale_factor(16), 16.0);
        assert_eq!(Transform::Rfft.scale_factor(16), 16.0);
        assert_eq!(Transform::Brfft.scale_factor(9), 16.0);
        assert_eq!(Transform::Ifft.scale_factor(16), 1.0);
        assert_eq!(Transform::None.scale_factor(16), 1.0);
        assert_eq!(Transform::R2r(R2rKind::Dct2).scale_factor(16), 8.0);
    }
}
