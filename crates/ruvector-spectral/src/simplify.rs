//! Folding lists of tensor-product terms into distinct structural buckets.

use tracing::debug;

use crate::error::Result;
use crate::tpmatrix::TPMatrix;

/// Simplify every term and merge the structurally equal ones.
///
/// Two terms are merged when they share the block index and, axis by axis,
/// the operator key and values; the merged term carries the elementwise sum
/// of the scale arrays. Order of first appearance is kept.
pub fn get_simplified_tpmatrices(terms: &[TPMatrix]) -> Result<Vec<TPMatrix>> {
    let mut buckets: Vec<TPMatrix> = Vec::with_capacity(terms.len());
    for term in terms {
        let simplified = term.get_simplified()?.as_ref().clone();
        merge_into(&mut buckets, simplified)?;
    }
    debug!(
        terms = terms.len(),
        distinct = buckets.len(),
        "merged tensor-product terms"
    );
    Ok(buckets)
}

/// Merge `term` into the first equal entry of `buckets`, or append it.
pub(crate) fn merge_into(buckets: &mut Vec<TPMatrix>, term: TPMatrix) -> Result<()> {
    match buckets.iter_mut().find(|existing| **existing == term) {
        Some(existing) => existing.merge(&term),
        None => {
            buckets.push(term);
            Ok(())
        }
    }
}
