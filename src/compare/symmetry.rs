use std::ops::RangeInclusive;

use crate::compare::Classifier;
use crate::model::{Lattice, Record, MAX_SPACEGROUP};
use crate::types::{Result, StrudexError};

/// The seven crystal systems, lowest symmetry first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CrystalSystem {
    /// Spacegroups 1–2.
    Triclinic,
    /// Spacegroups 3–15.
    Monoclinic,
    /// Spacegroups 16–74.
    Orthorhombic,
    /// Spacegroups 75–142.
    Tetragonal,
    /// Spacegroups 143–167.
    Trigonal,
    /// Spacegroups 168–194.
    Hexagonal,
    /// Spacegroups 195–230.
    Cubic,
}

impl CrystalSystem {
    const ALL: [CrystalSystem; 7] = [
        CrystalSystem::Triclinic,
        CrystalSystem::Monoclinic,
        CrystalSystem::Orthorhombic,
        CrystalSystem::Tetragonal,
        CrystalSystem::Trigonal,
        CrystalSystem::Hexagonal,
        CrystalSystem::Cubic,
    ];

    /// Spacegroup numbers belonging to this system.
    pub fn spacegroups(self) -> RangeInclusive<u16> {
        match self {
            CrystalSystem::Triclinic => 1..=2,
            CrystalSystem::Monoclinic => 3..=15,
            CrystalSystem::Orthorhombic => 16..=74,
            CrystalSystem::Tetragonal => 75..=142,
            CrystalSystem::Trigonal => 143..=167,
            CrystalSystem::Hexagonal => 168..=194,
            CrystalSystem::Cubic => 195..=MAX_SPACEGROUP,
        }
    }

    /// System of a spacegroup number, `None` for 0 or out of range.
    pub fn of_spacegroup(number: u16) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|system| system.spacegroups().contains(&number))
    }
}

/// Lattice-metric analyzer.
///
/// Keeps the stored spacegroup when the cell metric satisfies its crystal
/// system, otherwise reports the first spacegroup of the most symmetric system
/// the metric allows. Disordered structures classify as 0 (unknown).
#[derive(Clone, Copy, Debug)]
pub struct MetricClassifier {
    /// Relative tolerance when comparing cell lengths.
    pub length_tol: f64,
    /// Absolute tolerance on angles, in degrees.
    pub angle_tol: f64,
}

impl Default for MetricClassifier {
    fn default() -> Self {
        Self {
            length_tol: 1e-3,
            angle_tol: 0.1,
        }
    }
}

impl MetricClassifier {
    /// Whether `lattice` has the metric required by `system`.
    pub fn satisfies(&self, lattice: &Lattice, system: CrystalSystem) -> bool {
        let eq = |x: f64, y: f64| (x / y - 1.0).abs() <= self.length_tol;
        let right = |deg: f64| (deg - 90.0).abs() <= self.angle_tol;
        let hex = |deg: f64| (deg - 120.0).abs() <= self.angle_tol;
        let Lattice {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        } = *lattice;
        match system {
            CrystalSystem::Triclinic => true,
            CrystalSystem::Monoclinic => {
                [right(alpha), right(beta), right(gamma)]
                    .iter()
                    .filter(|ok| **ok)
                    .count()
                    >= 2
            }
            CrystalSystem::Orthorhombic => right(alpha) && right(beta) && right(gamma),
            CrystalSystem::Tetragonal => {
                right(alpha) && right(beta) && right(gamma) && eq(a, b)
            }
            CrystalSystem::Trigonal => {
                let hexagonal_setting = right(alpha) && right(beta) && hex(gamma) && eq(a, b);
                let rhombohedral_setting = eq(a, b)
                    && eq(b, c)
                    && (alpha - beta).abs() <= self.angle_tol
                    && (beta - gamma).abs() <= self.angle_tol;
                hexagonal_setting || rhombohedral_setting
            }
            CrystalSystem::Hexagonal => right(alpha) && right(beta) && hex(gamma) && eq(a, b),
            CrystalSystem::Cubic => {
                right(alpha) && right(beta) && right(gamma) && eq(a, b) && eq(b, c)
            }
        }
    }

    /// Most symmetric crystal system the metric allows.
    pub fn detect(&self, lattice: &Lattice) -> CrystalSystem {
        CrystalSystem::ALL
            .into_iter()
            .rev()
            .find(|system| self.satisfies(lattice, *system))
            .unwrap_or(CrystalSystem::Triclinic)
    }
}

impl Classifier for MetricClassifier {
    fn classify(&self, record: &Record) -> Result<u16> {
        record
            .structure
            .validate()
            .map_err(|err| StrudexError::Comparator(err.to_string()))?;
        if !record.structure.is_ordered() {
            return Ok(0);
        }
        let lattice = &record.structure.lattice;
        if let Some(system) = CrystalSystem::of_spacegroup(record.spacegroup) {
            if self.satisfies(lattice, system) {
                return Ok(record.spacegroup);
            }
        }
        Ok(*self.detect(lattice).spacegroups().start())
    }
}
