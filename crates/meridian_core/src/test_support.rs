//! Shared fixtures for unit tests.

use crate::lock::{Lease, Tickable};

/// Object whose tick does nothing.
#[derive(Debug, Default)]
pub(crate) struct Inert;

impl Tickable for Inert {
    fn tick(_this: &mut Lease<'_, Self>, _time: u64) {}
}
