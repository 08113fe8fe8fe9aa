//! Interpolation kernels used by resampling and reprojection.
//!
//! Sample positions are expressed in source index space: the center of
//! source pixel `i` sits at `i`.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Interpolation methods, ordered from cheapest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
    Lanczos2,
    Lanczos3,
    Lanczos4,
}

impl Interpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "nn",
            Interpolation::Linear => "linear",
            Interpolation::Cubic => "bicubic",
            Interpolation::Lanczos2 => "lanczos_2",
            Interpolation::Lanczos3 => "lanczos_3",
            Interpolation::Lanczos4 => "lanczos_4",
        }
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nn" | "nearest" => Ok(Interpolation::Nearest),
            "linear" => Ok(Interpolation::Linear),
            "bicubic" | "cubic" => Ok(Interpolation::Cubic),
            "lanczos_2" | "lanczos2" => Ok(Interpolation::Lanczos2),
            "lanczos_3" | "lanczos3" | "lanczos" => Ok(Interpolation::Lanczos3),
            "lanczos_4" | "lanczos4" => Ok(Interpolation::Lanczos4),
            other => Err(format!("unknown interpolation '{}'", other)),
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contiguous, normalized filter taps starting at source index `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    pub start: usize,
    pub values: Vec<f32>,
}

/// A separable interpolation kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel {
    interpolation: Interpolation,
}

impl Kernel {
    pub fn new(interpolation: Interpolation) -> Self {
        Self { interpolation }
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Half-width of the kernel at unit scale.
    fn radius(&self) -> f64 {
        match self.interpolation {
            Interpolation::Nearest => 0.5,
            Interpolation::Linear => 1.0,
            Interpolation::Cubic => 2.0,
            Interpolation::Lanczos2 => 2.0,
            Interpolation::Lanczos3 => 3.0,
            Interpolation::Lanczos4 => 4.0,
        }
    }

    fn is_convolution(&self) -> bool {
        self.interpolation != Interpolation::Nearest
    }

    /// Support half-width, in source pixels, when shrinking by `ratio`.
    ///
    /// Convolution kernels widen when downsampling (`ratio > 1`) so that every
    /// source pixel contributes.
    pub fn size(&self, ratio: f64) -> f64 {
        if ratio <= 1.0 || !self.is_convolution() {
            self.radius()
        } else {
            self.radius() * ratio
        }
    }

    fn value(&self, x: f64) -> f64 {
        let x = x.abs();
        match self.interpolation {
            Interpolation::Nearest => {
                if x <= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Interpolation::Linear => (1.0 - x).max(0.0),
            Interpolation::Cubic => keys_cubic(x),
            Interpolation::Lanczos2 => lanczos(x, 2.0),
            Interpolation::Lanczos3 => lanczos(x, 3.0),
            Interpolation::Lanczos4 => lanczos(x, 4.0),
        }
    }

    /// Filter taps for a sample centered at `center` in a source axis of `len`
    /// pixels.
    ///
    /// Taps falling outside `[0, len)` are folded onto the nearest edge pixel;
    /// the result sums to one.
    pub fn weights(&self, center: f64, ratio: f64, len: usize) -> Weights {
        let last_index = len.saturating_sub(1) as i64;
        let nearest = || Weights {
            start: (center.round() as i64).clamp(0, last_index) as usize,
            values: vec![1.0],
        };

        if !self.is_convolution() || len == 0 {
            return nearest();
        }

        let support = self.size(ratio);
        let scale = if ratio > 1.0 { 1.0 / ratio } else { 1.0 };

        let first = (center - support).ceil() as i64;
        let last = (center + support).floor() as i64;
        let start = first.clamp(0, last_index);
        let end = last.clamp(0, last_index);

        let mut values = vec![0.0f64; (end - start + 1) as usize];
        let mut sum = 0.0;
        for i in first..=last {
            let w = self.value((i as f64 - center) * scale);
            if w == 0.0 {
                continue;
            }
            let j = i.clamp(start, end);
            values[(j - start) as usize] += w;
            sum += w;
        }

        if sum.abs() < f64::EPSILON {
            return nearest();
        }

        Weights {
            start: start as usize,
            values: values.into_iter().map(|w| (w / sum) as f32).collect(),
        }
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

fn lanczos(x: f64, n: f64) -> f64 {
    if x < n {
        sinc(x) * sinc(x / n)
    } else {
        0.0
    }
}

/// Keys cubic convolution with `a = -0.5`.
fn keys_cubic(x: f64) -> f64 {
    const A: f64 = -0.5;
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}
