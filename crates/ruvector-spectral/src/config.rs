//! Explicit configuration threaded through matrix construction and products.
//!
//! A [`SpectralConfig`] is passed by reference to the constructors that need
//! it; nothing in the crate reads global state. It serializes with `serde`
//! and can be loaded from a JSON document.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How the dense Gram matrix of an inner product is computed before it is
/// compressed into diagonals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Construction {
    /// Basis-native quadrature with `N` points.
    Dense,
    /// Oversampled quadrature with `3N/2` points.
    Denser,
    /// Gauss rule of high enough order to integrate polynomial integrands
    /// exactly. Slow; meant for verification.
    Exact,
}

/// Algorithm used by matrix-vector products along an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatvecFormat {
    /// Per-diagonal accumulation over hyperplanes of the array.
    Vectorized,
    /// Row products against the compressed sparse row form.
    Compressed,
}

/// Standard sparse representation produced by `diags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparseFormat {
    /// Diagonal storage.
    Dia,
    /// Compressed sparse rows.
    Csr,
    /// Compressed sparse columns.
    Csc,
}

/// Settings governing construction, compression and comparison of matrices.
///
/// # Example
///
/// ```rust
/// use ruvector_spectral::config::{Construction, SpectralConfig};
///
/// let config = SpectralConfig {
///     construction: Construction::Denser,
///     ..Default::default()
/// };
/// assert_eq!(config.extract_abstol, 1e-10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Strategy for computing inner-product matrices.
    ///
    /// Default: `dense`.
    pub construction: Construction,

    /// Algorithm for matrix-vector products.
    ///
    /// Default: `vectorized`.
    pub matvec_format: MatvecFormat,

    /// Representation returned by `diags`.
    ///
    /// Default: `csr`.
    pub diags_format: SparseFormat,

    /// A diagonal is kept only if its largest magnitude exceeds this value.
    ///
    /// Default: `1e-10`.
    pub extract_abstol: f64,

    /// A diagonal is kept only if its largest magnitude relative to the
    /// largest matrix entry exceeds this value.
    ///
    /// Default: `1e-10`.
    pub extract_reltol: f64,

    /// Relative tolerance used by `clean_diagonals`.
    ///
    /// Default: `1e-8`.
    pub clean_reltol: f64,

    /// Tolerance on the 2-norm of the data difference in structural equality.
    ///
    /// Default: `1e-8`.
    pub equality_tol: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            construction: Construction::Dense,
            matvec_format: MatvecFormat::Vectorized,
            diags_format: SparseFormat::Csr,
            extract_abstol: 1e-10,
            extract_reltol: 1e-10,
            clean_reltol: 1e-8,
            equality_tol: 1e-8,
        }
    }
}

impl SpectralConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize this configuration to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
