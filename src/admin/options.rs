use crate::compare::MatcherOptions;
use crate::registry::RegistryOptions;

/// Common options used when opening a store for administrative commands.
#[derive(Clone, Debug, Default)]
pub struct AdminOpenOptions {
    /// Whether to start an empty store if the file doesn't exist.
    pub create_if_missing: bool,
    /// Registry lock configuration.
    pub registry: RegistryOptions,
    /// Tolerances of the structure comparator.
    pub matcher: MatcherOptions,
}
