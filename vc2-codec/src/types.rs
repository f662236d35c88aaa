//! Common codec types: profiles, wavelet kernels, frame rates, slice I/O
//! modes.

use vc2_core::{Rational, Result, StreamError};

/// VC-2 profile of a coded sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Low Delay profile.
    LowDelay,
    /// High Quality profile.
    HighQuality,
    /// Profile not (yet) known, e.g. before a sequence header is read.
    Unknown,
}

impl Profile {
    /// Wire value carried in the sequence header.
    pub fn wire_value(self) -> u32 {
        match self {
            Profile::LowDelay | Profile::Unknown => 0,
            Profile::HighQuality => 3,
        }
    }

    /// Interpret the sequence-header profile field.
    pub fn from_wire_value(value: u32) -> Self {
        match value {
            0 => Profile::LowDelay,
            3 => Profile::HighQuality,
            _ => Profile::Unknown,
        }
    }
}

/// Wavelet filter kernels supported by VC-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveletKernel {
    /// Deslauriers-Dubuc (9,7).
    Dd97,
    /// LeGall (5,3).
    LeGall,
    /// Deslauriers-Dubuc (13,7).
    Dd137,
    /// Haar without shift.
    Haar0,
    /// Haar with a single per-level shift.
    Haar1,
    /// Fidelity filter.
    Fidelity,
    /// Integer-lifting approximation of Daubechies (9,7).
    Daub97,
    /// Identity transform, diagnostic use only.
    Null,
}

impl WaveletKernel {
    /// Wire index used in picture preambles.
    pub fn wavelet_index(self) -> u32 {
        match self {
            WaveletKernel::Dd97 => 0,
            WaveletKernel::LeGall => 1,
            WaveletKernel::Dd137 => 2,
            WaveletKernel::Haar0 => 3,
            WaveletKernel::Haar1 => 4,
            WaveletKernel::Fidelity => 5,
            WaveletKernel::Daub97 => 6,
            WaveletKernel::Null => u32::MAX,
        }
    }

    /// Interpret a wire wavelet index.
    pub fn from_wavelet_index(index: u32) -> Result<Self> {
        Ok(match index {
            0 => WaveletKernel::Dd97,
            1 => WaveletKernel::LeGall,
            2 => WaveletKernel::Dd137,
            3 => WaveletKernel::Haar0,
            4 => WaveletKernel::Haar1,
            5 => WaveletKernel::Fidelity,
            6 => WaveletKernel::Daub97,
            other => return Err(StreamError::UnknownWaveletIndex(other).into()),
        })
    }
}

impl std::fmt::Display for WaveletKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WaveletKernel::Dd97 => "Deslauriers-Dubuc (9,7)",
            WaveletKernel::LeGall => "LeGall (5,3)",
            WaveletKernel::Dd137 => "Deslauriers-Dubuc (13,7)",
            WaveletKernel::Haar0 => "Haar (no shift)",
            WaveletKernel::Haar1 => "Haar (single shift)",
            WaveletKernel::Fidelity => "Fidelity",
            WaveletKernel::Daub97 => "Daubechies (9,7)",
            WaveletKernel::Null => "Null",
        };
        f.write_str(s)
    }
}

/// Source frame rates expressible in a sequence header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRate {
    Fr24000_1001,
    Fr24,
    Fr25,
    Fr30000_1001,
    Fr30,
    Fr50,
    Fr60000_1001,
    Fr60,
    Fr15000_1001,
    Fr25_2,
    Fr48,
}

impl FrameRate {
    /// Index used by the custom-frame-rate field of a sequence header.
    pub fn wire_index(self) -> u32 {
        match self {
            FrameRate::Fr24000_1001 => 1,
            FrameRate::Fr24 => 2,
            FrameRate::Fr25 => 3,
            FrameRate::Fr30000_1001 => 4,
            FrameRate::Fr30 => 5,
            FrameRate::Fr50 => 6,
            FrameRate::Fr60000_1001 => 7,
            FrameRate::Fr60 => 8,
            FrameRate::Fr15000_1001 => 9,
            FrameRate::Fr25_2 => 10,
            FrameRate::Fr48 => 11,
        }
    }

    /// Interpret a wire frame-rate index.
    pub fn from_wire_index(index: u32) -> Result<Self> {
        Ok(match index {
            1 => FrameRate::Fr24000_1001,
            2 => FrameRate::Fr24,
            3 => FrameRate::Fr25,
            4 => FrameRate::Fr30000_1001,
            5 => FrameRate::Fr30,
            6 => FrameRate::Fr50,
            7 => FrameRate::Fr60000_1001,
            8 => FrameRate::Fr60,
            9 => FrameRate::Fr15000_1001,
            10 => FrameRate::Fr25_2,
            11 => FrameRate::Fr48,
            other => return Err(StreamError::UnknownFrameRateIndex(other).into()),
        })
    }

    /// Frames per second as an exact rational.
    pub fn as_rational(self) -> Rational {
        match self {
            FrameRate::Fr24000_1001 => Rational::new(24000, 1001),
            FrameRate::Fr24 => Rational::new(24, 1),
            FrameRate::Fr25 => Rational::new(25, 1),
            FrameRate::Fr30000_1001 => Rational::new(30000, 1001),
            FrameRate::Fr30 => Rational::new(30, 1),
            FrameRate::Fr50 => Rational::new(50, 1),
            FrameRate::Fr60000_1001 => Rational::new(60000, 1001),
            FrameRate::Fr60 => Rational::new(60, 1),
            FrameRate::Fr15000_1001 => Rational::new(15000, 1001),
            FrameRate::Fr25_2 => Rational::new(25, 2),
            FrameRate::Fr48 => Rational::new(48, 1),
        }
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} fps", self.as_rational())
    }
}

/// How slice payloads are laid out and rate-controlled.
///
/// The mode is part of the stream-wide codec context: the picture
/// preamble and the slice payloads must be interpreted consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceIoMode {
    /// Low Delay slices with a fractional per-slice byte budget.
    LowDelay,
    /// High Quality slices padded to a constant per-picture byte budget.
    HqConstantRate,
    /// High Quality slices with self-describing lengths only.
    HqVariableRate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wavelet_index_roundtrip() {
        for index in 0..7 {
            let kernel = WaveletKernel::from_wavelet_index(index).unwrap();
            assert_eq!(kernel.wavelet_index(), index);
        }
        assert!(WaveletKernel::from_wavelet_index(7).is_err());
    }

    #[test]
    fn test_frame_rate_index_roundtrip() {
        for index in 1..=11 {
            let rate = FrameRate::from_wire_index(index).unwrap();
            assert_eq!(rate.wire_index(), index);
        }
        assert!(FrameRate::from_wire_index(0).is_err());
        assert!(FrameRate::from_wire_index(12).is_err());
    }

    #[test]
    fn test_profile_wire_values() {
        assert_eq!(Profile::HighQuality.wire_value(), 3);
        assert_eq!(Profile::from_wire_value(0), Profile::LowDelay);
        assert_eq!(Profile::from_wire_value(3), Profile::HighQuality);
        assert_eq!(Profile::from_wire_value(2), Profile::Unknown);
    }
}
