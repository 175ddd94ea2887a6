use serde::{Deserialize, Serialize};

/// Initial gaussian wavepacket of one particle, in physical units.
///
/// The packet is `exp(-(x - center)^2 / (2 width^2) + i momentum x)` per axis.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WavePacket {
    pub center: Vec<f64>,
    pub width: Vec<f64>,
    pub momentum: Vec<f64>,
}

/// Static potentials that can be selected from a parameter file.
///
/// Positions are physical coordinates. For two-particle runs the potential
/// is a function of the relative coordinate, so `center` is an offset in
/// relative space and defaults to the origin.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum PotentialParameters {
    /// V = 0 everywhere
    Free,

    /// V = omega^2 |x - center|^2 / 2
    Harmonic {
        omega: f64,
        center: Option<Vec<f64>>,
    },

    /// A wall of `height` normal to the x axis covering [position, position + thickness)
    Barrier {
        position: f64,
        thickness: f64,
        height: f64,
    },

    /// V = -charge / sqrt(|x - center|^2 + softening^2)
    SoftCoulomb {
        charge: f64,
        softening: f64,
        center: Option<Vec<f64>>,
    },
}

impl Default for PotentialParameters {
    fn default() -> Self {
        PotentialParameters::Free
    }
}

/// Absorbing border configuration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct DampingParameters {
    /// Number of border layers on each face
    pub width: usize,
    /// Attenuation rate at the outermost layer
    pub factor: f64,
}
