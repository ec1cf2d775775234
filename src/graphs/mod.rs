//! Industry workflow implementations and the default registry.
//!
//! Each submodule exports `create_graph()` and `descriptor()`; plugins
//! register the pair at startup. Step bodies here stand in for the
//! business-record backend — they mint document ids and compute the same
//! derived values the reference deployment does, without external calls.

pub mod education;
pub mod hospital;
pub mod hotel;
pub mod manufacturing;
pub mod retail;

use std::sync::Arc;

use crate::registry::Registry;

/// Registry pre-populated with the five built-in industry workflows.
#[must_use]
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(hotel::descriptor(), Arc::new(hotel::create_graph));
    registry.register(hospital::descriptor(), Arc::new(hospital::create_graph));
    registry.register(
        manufacturing::descriptor(),
        Arc::new(manufacturing::create_graph),
    );
    registry.register(retail::descriptor(), Arc::new(retail::create_graph));
    registry.register(education::descriptor(), Arc::new(education::create_graph));
    registry
}
