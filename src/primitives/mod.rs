//! Low-level primitives shared by the registry and the checker framework.

/// Lease-based mutual exclusion with bounded retries.
///
/// Serializes registry mutations and checker aggregate updates.
pub mod concurrency;
