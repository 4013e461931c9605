use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::types::{Result, StrudexError};

const OCCUPANCY_EPS: f64 = 1e-6;
const AMOUNT_EPS: f64 = 1e-4;
/// Smallest squared-volume factor still treated as a cell.
const VOLUME_EPS: f64 = 1e-9;

/// Conventional cell parameters. Lengths in Å, angles in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// Length of the first cell vector.
    pub a: f64,
    /// Length of the second cell vector.
    pub b: f64,
    /// Length of the third cell vector.
    pub c: f64,
    /// Angle between `b` and `c`.
    pub alpha: f64,
    /// Angle between `a` and `c`.
    pub beta: f64,
    /// Angle between `a` and `b`.
    pub gamma: f64,
}

impl Lattice {
    /// Builds a cubic cell with edge `a`.
    pub fn cubic(a: f64) -> Self {
        Self {
            a,
            b: a,
            c: a,
            alpha: 90.0,
            beta: 90.0,
            gamma: 90.0,
        }
    }

    /// Lengths as `[a, b, c]`.
    pub fn lengths(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    /// Angles as `[alpha, beta, gamma]`.
    pub fn angles(&self) -> [f64; 3] {
        [self.alpha, self.beta, self.gamma]
    }

    /// Cell volume, or `None` when the parameters do not describe a cell.
    pub fn volume(&self) -> Option<f64> {
        let [ca, cb, cg] = self.angles().map(|deg| deg.to_radians().cos());
        let term = 1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg;
        if term <= VOLUME_EPS {
            return None;
        }
        Some(self.a * self.b * self.c * term.sqrt())
    }

    fn validate(&self) -> Result<()> {
        if self.lengths().iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(StrudexError::Invalid(format!(
                "lattice lengths must be positive, got {:?}",
                self.lengths()
            )));
        }
        if self
            .angles()
            .iter()
            .any(|deg| !deg.is_finite() || *deg <= 0.0 || *deg >= 180.0)
        {
            return Err(StrudexError::Invalid(format!(
                "lattice angles must lie in (0, 180), got {:?}",
                self.angles()
            )));
        }
        if self.volume().is_none() {
            return Err(StrudexError::Invalid("lattice angles are degenerate".into()));
        }
        Ok(())
    }
}

/// One atomic site in fractional coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Element symbol.
    pub species: String,
    /// Fractional coordinates.
    pub frac: [f64; 3],
    /// Site occupancy in `(0, 1]`; values below 1 mark a disordered site.
    #[serde(default = "full_occupancy")]
    pub occupancy: f64,
}

fn full_occupancy() -> f64 {
    1.0
}

impl Site {
    /// Fully occupied site.
    pub fn new(species: impl Into<String>, frac: [f64; 3]) -> Self {
        Self {
            species: species.into(),
            frac,
            occupancy: 1.0,
        }
    }
}

/// Structural payload of a record: a periodic cell and its sites.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    /// Cell parameters.
    pub lattice: Lattice,
    /// Atomic sites.
    pub sites: Vec<Site>,
}

impl Structure {
    /// Creates a structure from a lattice and its sites.
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    /// Checks the payload is usable for grouping.
    pub fn validate(&self) -> Result<()> {
        self.lattice.validate()?;
        if self.sites.is_empty() {
            return Err(StrudexError::Invalid("structure has no sites".into()));
        }
        for site in &self.sites {
            if site.species.trim().is_empty() {
                return Err(StrudexError::Invalid("site with empty species".into()));
            }
            if !(site.occupancy > 0.0 && site.occupancy <= 1.0 + OCCUPANCY_EPS) {
                return Err(StrudexError::Invalid(format!(
                    "occupancy {} of {} outside (0, 1]",
                    site.occupancy, site.species
                )));
            }
            if site.frac.iter().any(|x| !x.is_finite()) {
                return Err(StrudexError::Invalid(format!(
                    "non-finite coordinate on {}",
                    site.species
                )));
            }
        }
        Ok(())
    }

    /// True when every site is fully occupied.
    pub fn is_ordered(&self) -> bool {
        self.sites
            .iter()
            .all(|site| (site.occupancy - 1.0).abs() <= OCCUPANCY_EPS)
    }

    /// Occupancy-weighted amount per element.
    pub fn composition(&self) -> BTreeMap<String, f64> {
        let mut amounts = BTreeMap::new();
        for site in &self.sites {
            *amounts.entry(site.species.clone()).or_insert(0.0) += site.occupancy;
        }
        amounts
    }

    /// Reduced formula with elements in alphabetical order, e.g. `O2Si`.
    ///
    /// Integral amounts are divided by their GCD. Fractional amounts (from
    /// partial occupancies) are normalized so the smallest amount is 1.
    pub fn reduced_formula(&self) -> String {
        let amounts = self.composition();
        let integral: Option<Vec<u64>> = amounts
            .values()
            .map(|amount| {
                let rounded = amount.round();
                ((amount - rounded).abs() < AMOUNT_EPS && rounded >= 1.0).then_some(rounded as u64)
            })
            .collect();

        let mut formula = String::new();
        match integral {
            Some(counts) => {
                let divisor = counts.iter().copied().fold(0, gcd).max(1);
                for (element, count) in amounts.keys().zip(counts) {
                    push_term(&mut formula, element, (count / divisor) as f64);
                }
            }
            None => {
                let min = amounts.values().copied().fold(f64::INFINITY, f64::min);
                for (element, amount) in &amounts {
                    push_term(&mut formula, element, amount / min);
                }
            }
        }
        formula
    }

    /// Number of sites.
    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }
}

fn push_term(formula: &mut String, element: &str, amount: f64) {
    formula.push_str(element);
    if (amount - 1.0).abs() < AMOUNT_EPS {
        return;
    }
    if (amount - amount.round()).abs() < AMOUNT_EPS {
        let _ = write!(formula, "{}", amount.round() as u64);
    } else {
        let rendered = format!("{amount:.3}");
        formula.push_str(rendered.trim_end_matches('0').trim_end_matches('.'));
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
