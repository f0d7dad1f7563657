//! External and pair potentials.
//!
//! The move engine only ever sees these through the action, so the trait
//! surface is a single evaluation method plus a display name.

use nalgebra::SVector;

/// One-body potential evaluated at an absolute position.
pub trait ExternalPotential<const D: usize> {
    fn v(&self, r: &SVector<f64, D>) -> f64;

    fn name(&self) -> &'static str;
}

/// Two-body potential evaluated on a minimum-image separation.
pub trait InteractionPotential<const D: usize> {
    fn v(&self, sep: &SVector<f64, D>) -> f64;

    fn name(&self) -> &'static str;
}

impl<const D: usize> ExternalPotential<D> for Box<dyn ExternalPotential<D>> {
    fn v(&self, r: &SVector<f64, D>) -> f64 {
        (**self).v(r)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<const D: usize> InteractionPotential<D> for Box<dyn InteractionPotential<D>> {
    fn v(&self, sep: &SVector<f64, D>) -> f64 {
        (**self).v(sep)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// The free case, usable as either potential.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroPotential;

impl<const D: usize> ExternalPotential<D> for ZeroPotential {
    fn v(&self, _r: &SVector<f64, D>) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str {
        "free"
    }
}

impl<const D: usize> InteractionPotential<D> for ZeroPotential {
    fn v(&self, _sep: &SVector<f64, D>) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str {
        "free"
    }
}

/// Isotropic harmonic well: V(r) = (1/2) k |r|².
#[derive(Clone, Copy, Debug)]
pub struct HarmonicPotential {
    pub spring: f64,
}

impl<const D: usize> ExternalPotential<D> for HarmonicPotential {
    fn v(&self, r: &SVector<f64, D>) -> f64 {
        0.5 * self.spring * r.norm_squared()
    }

    fn name(&self) -> &'static str {
        "harmonic"
    }
}

/// Radial double well: V(r) = a (|r|² - b²)².
///
/// Minima on the sphere |r| = b, barrier height a·b⁴ at the origin.
#[derive(Clone, Copy, Debug)]
pub struct DoubleWellPotential {
    pub a: f64,
    pub b: f64,
}

impl<const D: usize> ExternalPotential<D> for DoubleWellPotential {
    fn v(&self, r: &SVector<f64, D>) -> f64 {
        let diff = r.norm_squared() - self.b * self.b;
        self.a * diff * diff
    }

    fn name(&self) -> &'static str {
        "double well"
    }
}

/// Soft repulsive pair potential: V(s) = A exp(-|s|²/2w²).
#[derive(Clone, Copy, Debug)]
pub struct GaussianRepulsion {
    pub amplitude: f64,
    pub width: f64,
}

impl<const D: usize> InteractionPotential<D> for GaussianRepulsion {
    fn v(&self, sep: &SVector<f64, D>) -> f64 {
        self.amplitude * (-0.5 * sep.norm_squared() / (self.width * self.width)).exp()
    }

    fn name(&self) -> &'static str {
        "gaussian repulsion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn harmonic_value() {
        let v = HarmonicPotential { spring: 2.0 };
        let r = Vector3::new(1.0, 2.0, 2.0);
        assert_relative_eq!(ExternalPotential::<3>::v(&v, &r), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn double_well_minima() {
        let v = DoubleWellPotential { a: 1.5, b: 2.0 };
        let at_min = SVector::<f64, 1>::new(2.0);
        let at_origin = SVector::<f64, 1>::new(0.0);
        assert_relative_eq!(ExternalPotential::<1>::v(&v, &at_min), 0.0, epsilon = 1e-12);
        assert_relative_eq!(ExternalPotential::<1>::v(&v, &at_origin), 24.0, epsilon = 1e-12);
    }

    #[test]
    fn gaussian_repulsion_decays() {
        let v = GaussianRepulsion {
            amplitude: 3.0,
            width: 1.0,
        };
        let near = Vector3::new(0.0, 0.0, 0.0);
        let far = Vector3::new(5.0, 0.0, 0.0);
        assert_relative_eq!(InteractionPotential::<3>::v(&v, &near), 3.0, epsilon = 1e-12);
        assert!(InteractionPotential::<3>::v(&v, &far) < 1e-4);
    }
}
