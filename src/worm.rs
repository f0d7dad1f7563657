//! Worm bookkeeping: the one open worldline of an off-diagonal configuration.

use nalgebra::SVector;

use crate::path::Bead;

/// State of the open worldline.
///
/// `length` counts imaginary-time links spanned by the worm (beads minus
/// one), so that `length + gap` is always a multiple of the slice count when
/// a worm is present.  `special1`/`special2` are scratch markers that belong
/// to the currently executing move and are `None` at every move boundary.
#[derive(Clone, Debug)]
pub struct Worm {
    pub head: Option<Bead>,
    pub tail: Option<Bead>,
    pub special1: Option<Bead>,
    pub special2: Option<Bead>,
    pub length: usize,
    pub gap: usize,
    pub is_diagonal: bool,
    /// 2λτ times the dimensionless cost threshold.
    cost_norm: f64,
}

impl Worm {
    /// `cost_norm` should be `2·λ·τ·worm_cost_max`.
    pub fn new(cost_norm: f64) -> Self {
        Worm {
            head: None,
            tail: None,
            special1: None,
            special2: None,
            length: 0,
            gap: 0,
            is_diagonal: true,
            cost_norm,
        }
    }

    /// Clear every worm field.  Diagonality is the caller's decision.
    pub fn reset(&mut self) {
        self.head = None;
        self.tail = None;
        self.special1 = None;
        self.special2 = None;
        self.length = 0;
        self.gap = 0;
    }

    /// Free-diffusion pre-filter: a proposed worm whose endpoints are farther
    /// apart than diffusion over `gap` slices would plausibly carry them is
    /// rejected before any action evaluation.
    pub fn too_costly_sep<const D: usize>(&self, sep: &SVector<f64, D>, gap: usize) -> bool {
        if gap == 0 {
            return true;
        }
        sep.norm_squared() > gap as f64 * self.cost_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn cost_filter() {
        let worm = Worm::new(2.0 * 0.5 * 0.1 * 16.0);
        let near = Vector3::new(0.1, 0.0, 0.0);
        let far = Vector3::new(10.0, 0.0, 0.0);
        assert!(!worm.too_costly_sep(&near, 4));
        assert!(worm.too_costly_sep(&far, 4));
        assert!(worm.too_costly_sep(&near, 0));
    }
}
