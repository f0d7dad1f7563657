//! The simulation cell.
//!
//! Positions live in [-L/2, L/2) per dimension.  Periodic dimensions wrap
//! both positions and separations (minimum image); hard-wall dimensions leave
//! coordinates untouched and the moves are responsible for rejecting
//! proposals that leave the cell.

use nalgebra::SVector;

use crate::random::McRng;

#[derive(Clone, Debug)]
pub struct Container<const D: usize> {
    pub side: SVector<f64, D>,
    pub periodic: [bool; D],
    pub volume: f64,
}

impl<const D: usize> Container<D> {
    pub fn new(side: SVector<f64, D>, periodic: [bool; D]) -> Self {
        assert!(side.iter().all(|&s| s > 0.0), "cell sides must be positive");
        let volume = side.iter().product();
        Container {
            side,
            periodic,
            volume,
        }
    }

    /// A cubic cell of side `l`, periodic or hard-walled in every dimension.
    pub fn cube(l: f64, periodic: bool) -> Self {
        Container::new(SVector::repeat(l), [periodic; D])
    }

    /// Minimum-image wrap of a separation vector.
    pub fn put_in_bc(&self, sep: &mut SVector<f64, D>) {
        for i in 0..D {
            if self.periodic[i] {
                sep[i] -= self.side[i] * (sep[i] / self.side[i]).round();
            }
        }
    }

    /// Wrap a position into the cell along periodic dimensions.
    pub fn put_inside(&self, pos: &mut SVector<f64, D>) {
        for i in 0..D {
            if self.periodic[i] {
                pos[i] -= self.side[i] * ((pos[i] / self.side[i]) + 0.5).floor();
            }
        }
    }

    /// Whether a position lies inside the cell in every dimension.
    pub fn inside(&self, pos: &SVector<f64, D>) -> bool {
        (0..D).all(|i| pos[i] >= -0.5 * self.side[i] && pos[i] < 0.5 * self.side[i])
    }

    /// Uniform random position inside the cell.
    pub fn rand_position(&self, rng: &mut McRng) -> SVector<f64, D> {
        SVector::from_fn(|i, _| self.side[i] * (rng.rand() - 0.5))
    }

    /// Random displacement of `origin` bounded by ±delta/2 per coordinate,
    /// wrapped back into the cell.
    pub fn rand_update(
        &self,
        rng: &mut McRng,
        origin: &SVector<f64, D>,
        delta: f64,
    ) -> SVector<f64, D> {
        let mut pos = SVector::from_fn(|i, _| origin[i] + delta * (rng.rand() - 0.5));
        self.put_inside(&mut pos);
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn minimum_image() {
        let cell = Container::<3>::cube(10.0, true);
        let mut sep = Vector3::new(6.0, -7.0, 0.5);
        cell.put_in_bc(&mut sep);
        assert_relative_eq!(sep[0], -4.0, epsilon = 1e-12);
        assert_relative_eq!(sep[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(sep[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn hard_walls_do_not_wrap() {
        let cell = Container::<1>::cube(10.0, false);
        let mut pos = SVector::<f64, 1>::new(6.2);
        cell.put_inside(&mut pos);
        assert_relative_eq!(pos[0], 6.2, epsilon = 1e-12);
        assert!(!cell.inside(&pos));
    }

    #[test]
    fn rand_position_inside() {
        let cell = Container::<3>::cube(4.0, true);
        let mut rng = McRng::seed_from(3);
        for _ in 0..1000 {
            let p = cell.rand_position(&mut rng);
            assert!(cell.inside(&p));
        }
    }

    #[test]
    fn put_inside_is_idempotent() {
        let cell = Container::<2>::cube(3.0, true);
        let mut rng = McRng::seed_from(9);
        for _ in 0..1000 {
            let mut p = SVector::<f64, 2>::new(
                10.0 * (rng.rand() - 0.5),
                10.0 * (rng.rand() - 0.5),
            );
            cell.put_inside(&mut p);
            let q = p;
            cell.put_inside(&mut p);
            assert_eq!(p, q);
            assert!(cell.inside(&p));
        }
    }
}
