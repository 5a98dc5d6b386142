//! Neighborhood operators and the windowed-evaluation driver.
//!
//! A [`NeighborhoodOperator`] is a coefficient per window element; applying it
//! at a cursor position is an inner product. [`apply_kernel`] runs any
//! [`NeighborhoodKernel`] over an output image: the output is split into
//! slabs that are processed on the rayon pool, and each slab is further split
//! into its interior piece (unchecked cursor) and boundary shell (checked
//! cursor).

use crate::core::boundary::BoundaryCondition;
use crate::core::error::{RegionError, RegionResult};
use crate::core::image::{Image, ImageSlab};
use crate::core::neighborhood::{
    BoundaryCursor, FaceSplit, InteriorCursor, Neighborhood, NeighborhoodAccess,
};
use crate::execution::progress::AbortHandle;
use log::{trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Something evaluated once per output position from a window of input.
pub trait NeighborhoodKernel: Sync {
    fn neighborhood(&self) -> &Neighborhood;

    fn evaluate<N: NeighborhoodAccess>(&self, window: &N) -> f32;
}

/// Coefficients laid out over a neighborhood in element order.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborhoodOperator {
    neighborhood: Neighborhood,
    coefficients: Vec<f32>,
}

impl NeighborhoodOperator {
    pub fn new(neighborhood: Neighborhood, coefficients: Vec<f32>) -> RegionResult<Self> {
        if coefficients.len() != neighborhood.len() {
            return Err(RegionError::DimensionMismatch {
                expected: neighborhood.len(),
                got: coefficients.len(),
            });
        }
        Ok(Self {
            neighborhood,
            coefficients,
        })
    }

    /// Uniform averaging window.
    pub fn mean(radius: Vec<usize>) -> RegionResult<Self> {
        let neighborhood = Neighborhood::new(radius)?;
        let weight = 1.0 / neighborhood.len() as f32;
        let coefficients = vec![weight; neighborhood.len()];
        Self::new(neighborhood, coefficients)
    }

    /// A 1-D coefficient array oriented along `axis` of an N-D window.
    pub fn along_axis(dimension: usize, axis: usize, coefficients: &[f64]) -> RegionResult<Self> {
        if axis >= dimension {
            return Err(RegionError::Invalid {
                reason: format!("axis {axis} out of range for dimension {dimension}"),
            });
        }
        let mut per_axis = vec![vec![1.0]; dimension];
        per_axis[axis] = coefficients.to_vec();
        Self::outer_product(&per_axis)
    }

    /// Combine one odd-length 1-D array per axis into an N-D operator.
    pub fn outer_product(per_axis: &[Vec<f64>]) -> RegionResult<Self> {
        if let Some(axis) = per_axis.iter().position(|c| c.len() % 2 == 0) {
            return Err(RegionError::Invalid {
                reason: format!(
                    "coefficients along axis {} have even length {}",
                    axis,
                    per_axis[axis].len()
                ),
            });
        }
        let radius: Vec<usize> = per_axis.iter().map(|c| c.len() / 2).collect();
        let neighborhood = Neighborhood::new(radius.clone())?;

        let coefficients = (0..neighborhood.len())
            .map(|i| {
                neighborhood
                    .offset(i)
                    .iter()
                    .zip(per_axis)
                    .zip(&radius)
                    .map(|((o, c), r)| c[(o + *r as i64) as usize])
                    .product::<f64>() as f32
            })
            .collect();
        Self::new(neighborhood, coefficients)
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    pub fn radius(&self) -> &[usize] {
        self.neighborhood.radius()
    }
}

impl NeighborhoodKernel for NeighborhoodOperator {
    fn neighborhood(&self) -> &Neighborhood {
        &self.neighborhood
    }

    #[inline]
    fn evaluate<N: NeighborhoodAccess>(&self, window: &N) -> f32 {
        window.inner_product(&self.coefficients)
    }
}

// ============================================================================
// Discrete Gaussian
// ============================================================================

/// Discrete Gaussian kernel built from modified Bessel functions.
///
/// Coefficient `k` is `e^{-t} I_k(t)` for variance `t`. Coefficients are added
/// until the kernel holds `1 - maximum_error` of the total mass or the half
/// width reaches `maximum_kernel_width`, then normalized to sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianOperator {
    pub variance: f64,
    pub maximum_error: f64,
    pub maximum_kernel_width: usize,
}

impl Default for GaussianOperator {
    fn default() -> Self {
        Self {
            variance: 1.0,
            maximum_error: 0.01,
            maximum_kernel_width: 32,
        }
    }
}

impl GaussianOperator {
    pub fn new(variance: f64) -> Self {
        Self {
            variance,
            ..Self::default()
        }
    }

    pub fn with_maximum_error(mut self, maximum_error: f64) -> Self {
        self.maximum_error = maximum_error;
        self
    }

    pub fn with_maximum_kernel_width(mut self, width: usize) -> Self {
        self.maximum_kernel_width = width;
        self
    }

    /// Check the parameters, describing the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !self.variance.is_finite() || self.variance < 0.0 {
            return Err(format!("variance must be finite and >= 0, got {}", self.variance));
        }
        if !(self.maximum_error > 0.0 && self.maximum_error < 1.0) {
            return Err(format!(
                "maximum error must lie in (0, 1), got {}",
                self.maximum_error
            ));
        }
        if self.maximum_kernel_width == 0 {
            return Err("maximum kernel width must be at least 1".to_string());
        }
        Ok(())
    }

    /// Symmetric, normalized 1-D coefficients of odd length.
    pub fn coefficients(&self) -> Vec<f64> {
        let t = self.variance;
        let et = (-t).exp();
        let cap = 1.0 - self.maximum_error;

        let mut half = vec![et * bessel_i0(t), et * bessel_i1(t)];
        let mut sum = half[0] + 2.0 * half[1];
        let mut k = 2;
        while sum < cap {
            let c = et * bessel_i(k, t);
            half.push(c);
            sum += 2.0 * c;
            if c < sum * f64::EPSILON {
                break;
            }
            if half.len() > self.maximum_kernel_width {
                warn!(
                    "Gaussian kernel for variance {} truncated at half width {} (mass {:.4})",
                    t,
                    half.len(),
                    sum
                );
                break;
            }
            k += 1;
        }

        for c in half.iter_mut() {
            *c /= sum;
        }
        half.iter().rev().chain(half.iter().skip(1)).copied().collect()
    }

    pub fn radius(&self) -> usize {
        self.coefficients().len() / 2
    }

    /// The 1-D kernel oriented along `axis` of a `dimension`-D window.
    pub fn along_axis(&self, dimension: usize, axis: usize) -> RegionResult<NeighborhoodOperator> {
        NeighborhoodOperator::along_axis(dimension, axis, &self.coefficients())
    }

    /// The N-D operator blurring along every axis at once.
    pub fn operator(&self, dimension: usize) -> RegionResult<NeighborhoodOperator> {
        let kernel = self.coefficients();
        NeighborhoodOperator::outer_product(&vec![kernel; dimension])
    }
}

fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.75 {
        let y = (x / 3.75).powi(2);
        1.0 + y
            * (3.5156229
                + y * (3.0899424
                    + y * (1.2067492 + y * (0.2659732 + y * (0.360768e-1 + y * 0.45813e-2)))))
    } else {
        let y = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + y * (0.1328592e-1
                    + y * (0.225319e-2
                        + y * (-0.157565e-2
                            + y * (0.916281e-2
                                + y * (-0.2057706e-1
                                    + y * (0.2635537e-1
                                        + y * (-0.1647633e-1 + y * 0.392377e-2))))))))
    }
}

fn bessel_i1(x: f64) -> f64 {
    let ax = x.abs();
    let ans = if ax < 3.75 {
        let y = (x / 3.75).powi(2);
        ax * (0.5
            + y * (0.87890594
                + y * (0.51498869
                    + y * (0.15084934 + y * (0.2658733e-1 + y * (0.301532e-2 + y * 0.32411e-3))))))
    } else {
        let y = 3.75 / ax;
        let tail = 0.2282967e-1 + y * (-0.2895312e-1 + y * (0.1787654e-1 - y * 0.420059e-2));
        let poly = 0.39894228
            + y * (-0.3988024e-1
                + y * (-0.362018e-2 + y * (0.163801e-2 + y * (-0.1031555e-1 + y * tail))));
        poly * (ax.exp() / ax.sqrt())
    };
    if x < 0.0 {
        -ans
    } else {
        ans
    }
}

/// `I_n(x)` for `n >= 2` by downward recurrence.
fn bessel_i(n: usize, x: f64) -> f64 {
    const ACC: f64 = 40.0;
    const BIGNO: f64 = 1.0e10;
    const BIGNI: f64 = 1.0e-10;

    if x == 0.0 {
        return 0.0;
    }
    let tox = 2.0 / x.abs();
    let mut bip = 0.0;
    let mut ans = 0.0;
    let mut bi = 1.0;
    let start = 2 * (n + (ACC * n as f64).sqrt() as usize);
    for j in (1..=start).rev() {
        let bim = bip + j as f64 * tox * bi;
        bip = bi;
        bi = bim;
        if bi.abs() > BIGNO {
            ans *= BIGNI;
            bi *= BIGNI;
            bip *= BIGNI;
        }
        if j == n {
            ans = bip;
        }
    }
    ans *= bessel_i0(x) / bi;
    if x < 0.0 && n % 2 == 1 {
        -ans
    } else {
        ans
    }
}

// ============================================================================
// Kernel driver
// ============================================================================

/// How an [`apply_kernel`] run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Completed,
    Aborted,
}

/// Evaluate `kernel` at every position of `output`'s buffered region, reading
/// windows from `input`.
///
/// Windows that leave `input`'s buffered region read through `condition`.
/// The abort flag is polled before each slab; an aborted run leaves the output
/// partially written.
pub fn apply_kernel<K: NeighborhoodKernel>(
    input: &Image,
    output: &mut Image,
    kernel: &K,
    condition: &dyn BoundaryCondition,
    abort: &AbortHandle,
) -> RegionResult<ApplyOutcome> {
    let neighborhood = kernel.neighborhood();
    if neighborhood.dimension() != output.buffered_region().dimension()
        || input.buffered_region().dimension() != output.buffered_region().dimension()
    {
        return Err(RegionError::DimensionMismatch {
            expected: output.buffered_region().dimension(),
            got: neighborhood.dimension(),
        });
    }

    let slabs = output.slabs_mut(rayon::current_num_threads());
    trace!("Applying kernel over {} slab(s)", slabs.len());
    slabs
        .into_par_iter()
        .try_for_each(|mut slab| -> RegionResult<()> {
            if abort.is_aborted() {
                return Ok(());
            }
            evaluate_slab(input, &mut slab, kernel, neighborhood, condition)
        })?;

    if abort.is_aborted() {
        Ok(ApplyOutcome::Aborted)
    } else {
        Ok(ApplyOutcome::Completed)
    }
}

fn evaluate_slab<K: NeighborhoodKernel>(
    input: &Image,
    slab: &mut ImageSlab<'_>,
    kernel: &K,
    neighborhood: &Neighborhood,
    condition: &dyn BoundaryCondition,
) -> RegionResult<()> {
    let faces = FaceSplit::new(slab.region(), input.buffered_region(), neighborhood.radius());

    if !faces.interior.is_empty() {
        let mut cursor = InteriorCursor::new(input, &faces.interior, neighborhood)?;
        while !cursor.is_at_end() {
            let value = kernel.evaluate(&cursor);
            slab.set(cursor.index(), value);
            cursor.advance();
        }
    }

    for face in &faces.boundary {
        let mut cursor = BoundaryCursor::new(input, face, neighborhood, condition)?;
        while !cursor.is_at_end() {
            let value = kernel.evaluate(&cursor);
            slab.set(cursor.index(), value);
            cursor.advance();
        }
    }
    Ok(())
}
