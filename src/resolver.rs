//! DAG resolver — orders one domain's cartridges into concurrency levels.
//!
//! Adjacency is kept as a map keyed by cartridge id, never pointer-based
//! graph nodes. A Kahn-style sort peels zero-in-degree cartridges into
//! successive levels; anything left over lies on a cycle, and the error
//! carries a concrete cycle path rather than a bare "cycle detected".

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::error::ResolveError;
use crate::loader::LoadedCartridge;

/// Validate one domain's loaded cartridges before sorting.
///
/// Checks, in order: duplicate ids, domain-affinity scope, dependency
/// existence. Output-slot collisions are logged as warnings, not raised —
/// ambiguous intent is tolerated, never silently merged.
pub fn validate(domain: &str, cartridges: &[LoadedCartridge]) -> Result<(), ResolveError> {
    let mut ids = HashSet::new();
    for cartridge in cartridges {
        if !ids.insert(cartridge.id().to_string()) {
            return Err(ResolveError::DuplicateId {
                domain: domain.to_string(),
                id: cartridge.id().to_string(),
            });
        }
    }

    for cartridge in cartridges {
        if !cartridge.manifest.runs_in(domain) {
            return Err(ResolveError::Scope {
                domain: domain.to_string(),
                cartridge: cartridge.id().to_string(),
                reason: format!(
                    "domain_affinity [{}] does not include {domain}",
                    cartridge.manifest.domain_affinity.join(", ")
                ),
            });
        }
        for dep in &cartridge.manifest.depends_on {
            if !ids.contains(dep) {
                return Err(ResolveError::Dependency {
                    domain: domain.to_string(),
                    cartridge: cartridge.id().to_string(),
                    missing: dep.clone(),
                });
            }
        }
    }

    // Output-slot collisions: warn only.
    let mut slot_owners: HashMap<&str, &str> = HashMap::new();
    for cartridge in cartridges {
        for slot in &cartridge.manifest.output_slots {
            if let Some(first) = slot_owners.get(slot.as_str()) {
                warn!(
                    domain = %domain,
                    slot = %slot,
                    first = %first,
                    second = %cartridge.id(),
                    "Output slot declared by multiple cartridges"
                );
            } else {
                slot_owners.insert(slot.as_str(), cartridge.id());
            }
        }
    }

    Ok(())
}

/// Resolve cartridges into ordered concurrency levels.
///
/// Every cartridge's dependencies land in a strictly earlier level; members
/// of one level have no dependency edges between them. Runs `validate`
/// first.
pub fn resolve(
    domain: &str,
    cartridges: Vec<LoadedCartridge>,
) -> Result<Vec<Vec<LoadedCartridge>>, ResolveError> {
    validate(domain, &cartridges)?;

    let mut remaining: HashMap<String, LoadedCartridge> = cartridges
        .into_iter()
        .map(|c| (c.id().to_string(), c))
        .collect();

    // dependents[y] = ids that depend on y; in_degree[x] = unmet deps of x.
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    for (id, cartridge) in &remaining {
        in_degree.insert(id.clone(), cartridge.manifest.depends_on.len());
        for dep in &cartridge.manifest.depends_on {
            dependents.entry(dep.clone()).or_default().push(id.clone());
        }
    }

    let mut levels = Vec::new();
    loop {
        let mut ready: Vec<String> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| id.clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        ready.sort();

        let mut level = Vec::with_capacity(ready.len());
        for id in ready {
            in_degree.remove(&id);
            for dependent in dependents.remove(&id).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                }
            }
            level.push(remaining.remove(&id).expect("peeled id was loaded"));
        }
        levels.push(level);
    }

    if !remaining.is_empty() {
        let path = find_cycle(&remaining);
        return Err(ResolveError::Cycle {
            domain: domain.to_string(),
            path,
        });
    }

    Ok(levels)
}

/// Extract a concrete cycle path from the leftover subgraph.
///
/// Every leftover node has at least one unmet dependency that is itself
/// leftover, so walking dependency edges must eventually revisit a node.
fn find_cycle(remaining: &HashMap<String, LoadedCartridge>) -> Vec<String> {
    let start = remaining
        .keys()
        .min()
        .cloned()
        .expect("find_cycle called with leftover nodes");

    let mut path = vec![start.clone()];
    let mut seen: HashMap<String, usize> = HashMap::new();
    seen.insert(start.clone(), 0);

    let mut current = start;
    loop {
        let next = remaining[&current]
            .manifest
            .depends_on
            .iter()
            .find(|dep| remaining.contains_key(*dep))
            .cloned()
            .expect("leftover node must have a leftover dependency");

        if let Some(&first) = seen.get(&next) {
            // Drop the lead-in before the cycle entry point and close it.
            let mut cycle: Vec<String> = path[first..].to_vec();
            cycle.push(next);
            return cycle;
        }

        seen.insert(next.clone(), path.len());
        path.push(next.clone());
        current = next;
    }
}
