use std::sync::Arc;

use indexmap::IndexMap;

use crate::{Capability, Component, ComponentId, Error, Requirement};

/// `requirer` depends on `provider` to satisfy `requirement` through `capability`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wire {
    pub requirer: ComponentId,
    pub requirement: Requirement,
    pub provider: ComponentId,
    pub capability: Capability,
}

#[derive(Clone, Debug)]
pub struct WiredComponent {
    pub component: Arc<Component>,
    pub wires: Vec<Wire>,
}

/// Solver output: every resolved component with its outgoing wires.
///
/// Iteration follows insertion order, i.e. the order the solver presented components in.
#[derive(Clone, Debug, Default)]
pub struct Wiring {
    entries: IndexMap<ComponentId, WiredComponent>,
}

impl Wiring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a wiring from per-component wire lists, checking every wire endpoint is present.
    pub fn from_parts<I>(parts: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (Arc<Component>, Vec<Wire>)>,
    {
        let mut wiring = Wiring::new();
        let mut pending = Vec::new();
        for (component, wires) in parts {
            wiring.insert(component);
            pending.extend(wires);
        }
        for wire in pending {
            wiring.add_wire(wire)?;
        }
        Ok(wiring)
    }

    /// Adds a component with no wires. Re-inserting an existing component is a no-op.
    pub fn insert(&mut self, component: Arc<Component>) {
        self.entries
            .entry(component.id().clone())
            .or_insert_with(|| WiredComponent {
                component,
                wires: Vec::new(),
            });
    }

    /// Appends `wire` to its requirer's wire list.
    ///
    /// # Errors
    ///
    /// Both endpoints must already be part of the wiring.
    pub fn add_wire(&mut self, wire: Wire) -> Result<(), Error> {
        if !self.entries.contains_key(&wire.provider) {
            return Err(Error::UnknownWireEndpoint {
                id: wire.provider.to_string(),
            });
        }
        let Some(entry) = self.entries.get_mut(&wire.requirer) else {
            return Err(Error::UnknownWireEndpoint {
                id: wire.requirer.to_string(),
            });
        };
        entry.wires.push(wire);
        Ok(())
    }

    pub fn get(&self, id: &ComponentId) -> Option<&WiredComponent> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ComponentId, &WiredComponent)> {
        self.entries.iter()
    }

    pub fn components(&self) -> impl Iterator<Item = &Arc<Component>> {
        self.entries.values().map(|entry| &entry.component)
    }

    pub fn wires(&self) -> impl Iterator<Item = &Wire> {
        self.entries.values().flat_map(|entry| entry.wires.iter())
    }
}
