//! Normalization of one transaction's requests on one table

use crate::boundary::Boundary;
use crate::range::{KeyRange, LockRequest};

/// Rewrite a transaction's requests as disjoint, sorted pieces
///
/// The requests are cut at every boundary, each piece takes the strongest
/// mode asked for it, and touching pieces of equal mode are merged again.
/// A transaction applying for the result never conflicts with itself.
pub fn normalize_requests<K: Ord + Clone>(requests: &[LockRequest<K>]) -> Vec<LockRequest<K>> {
    if requests.len() <= 1 {
        return requests.to_vec();
    }

    let mut cuts: Vec<&Boundary<K>> = requests
        .iter()
        .flat_map(|r| [r.range.lo(), r.range.hi()])
        .collect();
    cuts.sort();
    cuts.dedup();

    let mut pieces: Vec<LockRequest<K>> = Vec::new();
    for window in cuts.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        let mode = requests
            .iter()
            .filter(|r| r.range.lo() <= lo && hi <= r.range.hi())
            .map(|r| r.mode)
            .max();
        let Some(mode) = mode else {
            continue;
        };

        if let Some(last) = pieces.last_mut() {
            if last.mode == mode && last.range.hi() == lo {
                last.range.set_hi(hi.clone());
                continue;
            }
        }
        if let Some(range) = KeyRange::between(lo.clone(), hi.clone()) {
            pieces.push(LockRequest::new(range, mode));
        }
    }
    pieces
}
