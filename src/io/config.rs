//! YAML run configuration.

use std::collections::HashMap;
use std::path::Path as FsPath;

use nalgebra::SVector;
use serde::{Deserialize, Serialize};

use crate::constants::SimConstants;
use crate::container::Container;
use crate::potential::{
    DoubleWellPotential, ExternalPotential, GaussianRepulsion, HarmonicPotential,
    InteractionPotential, ZeroPotential,
};

use super::IoError;

/// External potential selection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExternalKind {
    Free,
    Harmonic { spring: f64 },
    DoubleWell { a: f64, b: f64 },
}

/// Interaction potential selection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionKind {
    Free,
    Gaussian { amplitude: f64, width: f64 },
}

fn default_external() -> ExternalKind {
    ExternalKind::Free
}

fn default_interaction() -> InteractionKind {
    InteractionKind::Free
}

fn default_worm_constant() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    0xD1CE
}

fn default_sweeps() -> u64 {
    10_000
}

fn default_equilibrate() -> u64 {
    1_000
}

/// The run parameter schema read from YAML.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimParams {
    pub temperature: f64,
    pub chemical_potential: f64,
    /// λ = ħ²/2m in simulation units.
    pub lambda: f64,
    pub num_slices: usize,
    /// Cell side per dimension; the length fixes the dimensionality.
    pub side: Vec<f64>,
    pub periodic: Vec<bool>,
    pub num_particles: usize,
    /// Center-of-mass displacement scale Δ.
    pub com_delta: f64,
    #[serde(default = "default_worm_constant")]
    pub worm_constant: f64,
    pub mbar: usize,
    pub bisection_levels: usize,
    /// Grid cell target for the neighbor lookup; defaults to a quarter of
    /// the smallest cell side.
    #[serde(default)]
    pub lookup_cell: Option<f64>,
    #[serde(default = "default_external")]
    pub external: ExternalKind,
    #[serde(default = "default_interaction")]
    pub interaction: InteractionKind,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_sweeps")]
    pub sweeps: u64,
    #[serde(default = "default_equilibrate")]
    pub equilibrate: u64,
    /// Per-move attempt-probability overrides.
    #[serde(default)]
    pub attempt_probs: HashMap<String, f64>,
}

impl SimParams {
    pub fn dimension(&self) -> usize {
        self.side.len()
    }

    /// Build the constants table, with attempt-probability overrides applied.
    pub fn constants(&self) -> SimConstants {
        let volume: f64 = self.side.iter().product();
        let mut constants = SimConstants::new(
            self.temperature,
            self.chemical_potential,
            self.lambda,
            self.com_delta,
            self.worm_constant,
            self.mbar,
            self.bisection_levels,
            self.num_slices,
            volume,
        );
        constants.set_attempt_probs(&self.attempt_probs);
        constants
    }

    /// Build the simulation cell, checking the dimension at runtime against
    /// the compile-time `D`.
    pub fn container<const D: usize>(&self) -> Result<Container<D>, IoError> {
        if self.side.len() != D || self.periodic.len() != D {
            return Err(IoError::Dimension {
                expected: D,
                found: self.side.len(),
            });
        }
        let side = SVector::from_fn(|i, _| self.side[i]);
        let mut periodic = [true; D];
        periodic.copy_from_slice(&self.periodic);
        Ok(Container::new(side, periodic))
    }

    pub fn external_potential<const D: usize>(&self) -> Box<dyn ExternalPotential<D>> {
        match self.external {
            ExternalKind::Free => Box::new(ZeroPotential),
            ExternalKind::Harmonic { spring } => Box::new(HarmonicPotential { spring }),
            ExternalKind::DoubleWell { a, b } => Box::new(DoubleWellPotential { a, b }),
        }
    }

    pub fn interaction_potential<const D: usize>(&self) -> Box<dyn InteractionPotential<D>> {
        match self.interaction {
            InteractionKind::Free => Box::new(ZeroPotential),
            InteractionKind::Gaussian { amplitude, width } => {
                Box::new(GaussianRepulsion { amplitude, width })
            }
        }
    }

    pub fn lookup_cell_side(&self) -> f64 {
        self.lookup_cell.unwrap_or_else(|| {
            0.25 * self.side.iter().cloned().fold(f64::INFINITY, f64::min)
        })
    }
}

/// Read run parameters from a YAML file.
pub fn read_params(filename: &FsPath) -> Result<SimParams, IoError> {
    let file = std::fs::File::open(filename)?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_yaml::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = "\
temperature: 0.5
chemical_potential: -1.0
lambda: 0.5
num_slices: 32
side: [8.0, 8.0, 8.0]
periodic: [true, true, true]
num_particles: 16
com_delta: 1.5
mbar: 8
bisection_levels: 3
external:
  kind: harmonic
  spring: 1.0
interaction:
  kind: gaussian
  amplitude: 2.0
  width: 0.5
attempt_probs:
  open: 0.12
  close: 0.12
";

    #[test]
    fn parses_full_schema() {
        let params: SimParams = serde_yaml::from_str(EXAMPLE).unwrap();
        assert_eq!(params.dimension(), 3);
        assert_eq!(params.external, ExternalKind::Harmonic { spring: 1.0 });
        let constants = params.constants();
        assert_eq!(constants.num_slices, 32);
        assert!((constants.attempt_prob("open") - 0.12).abs() < 1e-12);
        let cell: Container<3> = params.container().unwrap();
        assert!((cell.volume - 512.0).abs() < 1e-9);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let params: SimParams = serde_yaml::from_str(EXAMPLE).unwrap();
        assert!(params.container::<2>().is_err());
    }
}
