use crate::compare::Comparator;
use crate::model::{Lattice, Record, Structure};
use crate::types::{Result, StrudexError};

/// Tolerances used by [`StructureMatcher`].
#[derive(Clone, Copy, Debug)]
pub struct MatcherOptions {
    /// Allowed fractional mismatch of each cell length.
    pub ltol: f64,
    /// Allowed mismatch of each cell angle, in degrees.
    pub angle_tol: f64,
    /// Allowed site displacement, as a fraction of `(V / n)^(1/3)`.
    pub stol: f64,
    /// Rescale the second cell to the first cell's volume before comparing.
    pub scale_volume: bool,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            ltol: 0.2,
            angle_tol: 5.0,
            stol: 0.3,
            scale_volume: true,
        }
    }
}

/// Tolerance-based structural equivalence.
///
/// Two structures match when their reduced formulas and site counts agree,
/// their cells agree within `ltol`/`angle_tol`, and some origin shift maps
/// every site onto a site of the same species within `stol`.
#[derive(Clone, Debug, Default)]
pub struct StructureMatcher {
    opts: MatcherOptions,
}

type Matrix = [[f64; 3]; 3];

impl StructureMatcher {
    /// Matcher with the given tolerances.
    pub fn new(opts: MatcherOptions) -> Self {
        Self { opts }
    }

    /// Configured tolerances.
    pub fn options(&self) -> &MatcherOptions {
        &self.opts
    }

    /// Compares two payloads directly.
    pub fn fit(&self, a: &Structure, b: &Structure) -> Result<bool> {
        a.validate()
            .and_then(|_| b.validate())
            .map_err(|err| StrudexError::Comparator(err.to_string()))?;
        if a.num_sites() != b.num_sites() || a.reduced_formula() != b.reduced_formula() {
            return Ok(false);
        }

        let vol_a = volume(&a.lattice)?;
        let mut lattice_b = b.lattice;
        if self.opts.scale_volume {
            let factor = (vol_a / volume(&b.lattice)?).cbrt();
            lattice_b.a *= factor;
            lattice_b.b *= factor;
            lattice_b.c *= factor;
        }
        if !self.lattices_close(&a.lattice, &lattice_b) {
            return Ok(false);
        }

        let matrix = lattice_matrix(&a.lattice);
        let threshold = self.opts.stol * (vol_a / a.num_sites() as f64).cbrt();
        let anchor_species = rarest_species(a);
        let Some(anchor) = a.sites.iter().find(|s| s.species == anchor_species) else {
            return Ok(false);
        };
        for candidate in b.sites.iter().filter(|s| s.species == anchor_species) {
            let shift = sub(anchor.frac, candidate.frac);
            if sites_align(a, b, shift, &matrix, threshold) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn lattices_close(&self, a: &Lattice, b: &Lattice) -> bool {
        let lengths_ok = a
            .lengths()
            .iter()
            .zip(b.lengths())
            .all(|(la, lb)| (la / lb - 1.0).abs() <= self.opts.ltol);
        let angles_ok = a
            .angles()
            .iter()
            .zip(b.angles())
            .all(|(x, y)| (x - y).abs() <= self.opts.angle_tol);
        lengths_ok && angles_ok
    }
}

impl Comparator for StructureMatcher {
    fn matches(&self, a: &Record, b: &Record) -> Result<bool> {
        self.fit(&a.structure, &b.structure)
    }
}

fn volume(lattice: &Lattice) -> Result<f64> {
    lattice
        .volume()
        .ok_or_else(|| StrudexError::Comparator("degenerate lattice".into()))
}

fn rarest_species(structure: &Structure) -> String {
    let composition = structure.composition();
    composition
        .iter()
        .min_by(|x, y| x.1.total_cmp(y.1))
        .map(|(species, _)| species.clone())
        .unwrap_or_default()
}

fn sites_align(
    a: &Structure,
    b: &Structure,
    shift: [f64; 3],
    matrix: &Matrix,
    threshold: f64,
) -> bool {
    let mut used = vec![false; b.sites.len()];
    for site in &a.sites {
        let mut best: Option<(usize, f64)> = None;
        for (idx, other) in b.sites.iter().enumerate() {
            if used[idx] || other.species != site.species {
                continue;
            }
            let shifted = add(other.frac, shift);
            let dist = periodic_distance(site.frac, shifted, matrix);
            if dist <= threshold && best.map_or(true, |(_, d)| dist < d) {
                best = Some((idx, dist));
            }
        }
        match best {
            Some((idx, _)) => used[idx] = true,
            None => return false,
        }
    }
    true
}

fn periodic_distance(x: [f64; 3], y: [f64; 3], matrix: &Matrix) -> f64 {
    let mut diff = sub(x, y);
    for component in &mut diff {
        *component -= component.round();
    }
    let mut cart = [0.0; 3];
    for (row, component) in matrix.iter().zip(diff) {
        for axis in 0..3 {
            cart[axis] += component * row[axis];
        }
    }
    cart.iter().map(|c| c * c).sum::<f64>().sqrt()
}

/// Rows are the cell vectors in Cartesian coordinates.
fn lattice_matrix(lattice: &Lattice) -> Matrix {
    let [ca, cb, cg] = lattice.angles().map(|deg| deg.to_radians().cos());
    let sg = lattice.gamma.to_radians().sin();
    let cx = cb;
    let cy = (ca - cb * cg) / sg;
    let cz = (1.0 - cx * cx - cy * cy).max(0.0).sqrt();
    [
        [lattice.a, 0.0, 0.0],
        [lattice.b * cg, lattice.b * sg, 0.0],
        [lattice.c * cx, lattice.c * cy, lattice.c * cz],
    ]
}

fn add(x: [f64; 3], y: [f64; 3]) -> [f64; 3] {
    [x[0] + y[0], x[1] + y[1], x[2] + y[2]]
}

fn sub(x: [f64; 3], y: [f64; 3]) -> [f64; 3] {
    [x[0] - y[0], x[1] - y[1], x[2] - y[2]]
}
