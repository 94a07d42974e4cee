use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::catalog::SchemaCatalog;
use crate::error::{Error, Result};
use crate::object::{Direction, ObjectId, SchemaObject};

/// Orders a requested subset of the catalog so that dependencies come before
/// their dependents.
///
/// Only requested objects become nodes. A dependency outside the request is
/// assumed to exist already, but ordering constraints that pass *through* it
/// (A needs X needs B, with A and B requested) are still honoured. Ties are
/// broken by request order, so identical input always yields identical output.
pub struct DependencyResolver<'a> {
    catalog: &'a SchemaCatalog,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a SchemaCatalog) -> Self {
        Self { catalog }
    }

    pub fn resolve(
        &self,
        requested: &[ObjectId],
        direction: Direction,
    ) -> Result<Vec<&'a SchemaObject>> {
        let mut order = self.apply_order(requested)?;
        if direction == Direction::Revert {
            order.reverse();
        }
        debug!(
            direction = %direction,
            order = ?order.iter().map(|o| o.id().to_string()).collect::<Vec<_>>(),
            "resolved load order"
        );
        Ok(order)
    }

    fn apply_order(&self, requested: &[ObjectId]) -> Result<Vec<&'a SchemaObject>> {
        let mut nodes: Vec<&'a SchemaObject> = Vec::new();
        let mut seen = HashSet::new();
        for id in requested {
            let object = self
                .catalog
                .get(id)
                .ok_or_else(|| Error::UnknownObject(id.to_string()))?;
            if seen.insert(id.clone()) {
                nodes.push(object);
            }
        }

        let mut predecessors: HashMap<ObjectId, HashSet<ObjectId>> = HashMap::new();
        for node in &nodes {
            predecessors.insert(node.id(), self.requested_predecessors(node, &seen)?);
        }

        let mut placed: HashSet<ObjectId> = HashSet::new();
        let mut order = Vec::with_capacity(nodes.len());

        while order.len() < nodes.len() {
            let next = nodes.iter().find(|node| {
                let id = node.id();
                !placed.contains(&id) && predecessors[&id].iter().all(|p| placed.contains(p))
            });

            match next {
                Some(node) => {
                    placed.insert(node.id());
                    order.push(*node);
                }
                None => {
                    let remaining: Vec<ObjectId> = nodes
                        .iter()
                        .map(|node| node.id())
                        .filter(|id| !placed.contains(id))
                        .collect();
                    return Err(Error::Cycle(cycle_members(&remaining, &predecessors)));
                }
            }
        }

        Ok(order)
    }

    /// Requested objects reachable from `node` along declared dependencies,
    /// walking through (but not stopping at) unrequested catalog entries.
    fn requested_predecessors(
        &self,
        node: &SchemaObject,
        requested: &HashSet<ObjectId>,
    ) -> Result<HashSet<ObjectId>> {
        let mut found = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<&SchemaObject> = vec![node];

        while let Some(current) = stack.pop() {
            for dep in &current.depends_on {
                let dependency = self.catalog.get(dep).ok_or_else(|| Error::UnknownDependency {
                    object: current.id(),
                    dependency: dep.clone(),
                })?;

                if requested.contains(dep) {
                    found.insert(dep.clone());
                } else if visited.insert(dep.clone()) {
                    stack.push(dependency);
                }
            }
        }

        Ok(found)
    }
}

/// Of the objects left unplaced, keep those that actually sit on a cycle
/// rather than merely waiting behind one.
fn cycle_members(
    remaining: &[ObjectId],
    predecessors: &HashMap<ObjectId, HashSet<ObjectId>>,
) -> Vec<ObjectId> {
    let pending: HashSet<&ObjectId> = remaining.iter().collect();

    let reaches_itself = |start: &ObjectId| {
        let mut visited = HashSet::new();
        let mut stack: Vec<&ObjectId> = predecessors[start].iter().collect();
        while let Some(current) = stack.pop() {
            if current == start {
                return true;
            }
            if pending.contains(current) && visited.insert(current) {
                stack.extend(predecessors[current].iter());
            }
        }
        false
    };

    let members: Vec<ObjectId> = remaining
        .iter()
        .filter(|id| reaches_itself(id))
        .cloned()
        .collect();

    if members.is_empty() {
        remaining.to_vec()
    } else {
        members
    }
}
