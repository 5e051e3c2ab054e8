// Action/Probe Registry - immutable catalog built once at startup

use crate::domain::{ActionSpec, Catalog, DomainError, ProbeSpec};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Probe bound to the action it runs
#[derive(Debug, Clone)]
pub struct ResolvedProbe {
    pub spec: ProbeSpec,
    pub action: Arc<ActionSpec>,
}

/// Name -> spec lookup. Read-only after `build`, shared as `Arc<Registry>`.
#[derive(Debug, Default)]
pub struct Registry {
    actions: HashMap<String, Arc<ActionSpec>>,
    probes: Vec<ResolvedProbe>,
    probe_index: HashMap<String, usize>,
}

impl Registry {
    /// Validate and freeze the decoded catalog.
    ///
    /// # Errors
    /// AppError::Config on duplicate names, empty command vectors,
    /// malformed descriptors or probes referencing unknown actions.
    pub fn build(catalog: Catalog) -> Result<Self> {
        let mut actions = HashMap::with_capacity(catalog.actions.len());
        for spec in catalog.actions {
            spec.validate()?;
            if actions.contains_key(&spec.name) {
                return Err(DomainError::DuplicateName {
                    kind: "action",
                    name: spec.name,
                }
                .into());
            }
            actions.insert(spec.name.clone(), Arc::new(spec));
        }

        let mut probes = Vec::with_capacity(catalog.probes.len());
        let mut probe_index = HashMap::with_capacity(catalog.probes.len());
        for spec in catalog.probes {
            let spec = spec.normalize()?;
            let action = actions
                .get(&spec.action)
                .cloned()
                .ok_or_else(|| DomainError::UnknownAction {
                    probe: spec.name.clone(),
                    action: spec.action.clone(),
                })?;
            if probe_index.contains_key(&spec.name) {
                return Err(DomainError::DuplicateName {
                    kind: "probe",
                    name: spec.name,
                }
                .into());
            }
            probe_index.insert(spec.name.clone(), probes.len());
            probes.push(ResolvedProbe { spec, action });
        }

        info!(
            actions = actions.len(),
            probes = probes.len(),
            "Registry built"
        );

        Ok(Self {
            actions,
            probes,
            probe_index,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<ActionSpec>> {
        self.actions.get(name)
    }

    pub fn probe(&self, name: &str) -> Option<&ResolvedProbe> {
        self.probe_index.get(name).map(|&i| &self.probes[i])
    }

    /// All actions, sorted by name
    pub fn actions(&self) -> Vec<Arc<ActionSpec>> {
        let mut all: Vec<_> = self.actions.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Probes in catalog order
    pub fn probes(&self) -> &[ResolvedProbe] {
        &self.probes
    }
}
