#![allow(dead_code)]

use std::sync::Arc;

use strudex::compare::{Comparator, FnComparator};
use strudex::model::{Lattice, Record, RecordSpec, Site, Structure};
use strudex::registry::{GroupRegistry, RegistryOptions};
use strudex::store::MemoryStore;

/// Two-site silicon cell with edge `a`.
pub fn silicon(a: f64) -> RecordSpec {
    RecordSpec::new(
        Structure::new(
            Lattice::cubic(a),
            vec![
                Site::new("Si", [0.0, 0.0, 0.0]),
                Site::new("Si", [0.25, 0.25, 0.25]),
            ],
        ),
        227,
    )
}

/// Rocksalt NaCl cell with edge `a`.
pub fn rocksalt(a: f64) -> RecordSpec {
    RecordSpec::new(
        Structure::new(
            Lattice::cubic(a),
            vec![
                Site::new("Na", [0.0, 0.0, 0.0]),
                Site::new("Na", [0.0, 0.5, 0.5]),
                Site::new("Na", [0.5, 0.0, 0.5]),
                Site::new("Na", [0.5, 0.5, 0.0]),
                Site::new("Cl", [0.5, 0.5, 0.5]),
                Site::new("Cl", [0.5, 0.0, 0.0]),
                Site::new("Cl", [0.0, 0.5, 0.0]),
                Site::new("Cl", [0.0, 0.0, 0.5]),
            ],
        ),
        225,
    )
}

/// Deterministic comparator: records match when their first cell edges are
/// within `tol` of each other.
pub fn edge_comparator(tol: f64) -> Arc<dyn Comparator> {
    Arc::new(FnComparator::new(move |a: &Record, b: &Record| {
        Ok((a.structure.lattice.a - b.structure.lattice.a).abs() < tol)
    }))
}

pub fn memory_registry(comparator: Arc<dyn Comparator>) -> (Arc<MemoryStore>, GroupRegistry) {
    let store = Arc::new(MemoryStore::new());
    let registry = GroupRegistry::open(store.clone(), comparator, RegistryOptions::default())
        .expect("open registry");
    (store, registry)
}
