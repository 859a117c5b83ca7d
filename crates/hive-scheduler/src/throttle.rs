//! The per-node coin flip gating action on globally shared applications.

use rand::Rng;

/// Whether this node acts in this iteration.
///
/// Draws uniformly from `0..range` and passes on 0, so with `n` eligible
/// nodes about `n / range` of them act at once. A range of 0 or 1 always
/// passes.
pub fn passes(range: u32) -> bool {
    if range <= 1 {
        return true;
    }
    rand::thread_rng().gen_range(0..range) == 0
}
