use std::collections::{HashMap, HashSet};
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::{EdgeId, GraphStore, PortId, VertexId};
use crate::actor::{Actor, InputState};
use crate::error::DataflowError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct GraphId(pub Uuid);

impl GraphId {
    pub fn new() -> Self {
        GraphId(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connection expressed with vertex ids and local port indices.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    pub source: VertexId,
    pub source_port: usize,
    pub target: VertexId,
    pub target_port: usize,
}

/// A graph store whose vertices carry actors.
///
/// Actors are stored as `Option` so the evaluator can move one out while its
/// `eval()` runs and still hand the rest of the graph to it.
pub struct Dataflow {
    id: GraphId,
    store: GraphStore,
    actors: HashMap<VertexId, Option<Box<dyn Actor>>>,
    pseudo: HashSet<VertexId>,
}

impl Default for Dataflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataflow {
    pub fn new() -> Self {
        Self {
            id: GraphId::new(),
            store: GraphStore::new(),
            actors: HashMap::new(),
            pseudo: HashSet::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Add a vertex for `actor` with one port per declared input and output.
    pub fn add_actor(
        &mut self,
        actor: Box<dyn Actor>,
        id: Option<VertexId>,
    ) -> Result<VertexId, DataflowError> {
        let vid = self.store.add_vertex(id)?;
        for local in 0..actor.nb_inputs() {
            let fan_in = actor
                .state()
                .input_desc()
                .get(local)
                .map(|desc| desc.fan_in)
                .unwrap_or_default();
            self.store.add_in_port_with(vid, local, fan_in)?;
        }
        for local in 0..actor.nb_outputs() {
            self.store.add_out_port(vid, local)?;
        }
        self.actors.insert(vid, Some(actor));
        Ok(vid)
    }

    /// Mark a vertex as a boundary vertex, skipped when collecting sinks.
    pub fn mark_pseudo(&mut self, vid: VertexId) {
        self.pseudo.insert(vid);
    }

    pub fn is_pseudo(&self, vid: VertexId) -> bool {
        self.pseudo.contains(&vid)
    }

    /// Remove a vertex, its edges and its actor. Inputs that lose their
    /// producer go back to the unconnected state.
    pub fn remove_vertex(&mut self, vid: VertexId) -> Result<Option<Box<dyn Actor>>, DataflowError> {
        let mut orphaned = Vec::new();
        for eid in self.store.out_edges(vid)? {
            let target_port = self.store.target_port(eid)?;
            let target = self.store.vertex(target_port)?;
            if target != vid {
                orphaned.push((target, self.store.local_id(target_port)?));
            }
        }
        self.store.remove_vertex(vid)?;
        self.pseudo.remove(&vid);
        for (target, port) in orphaned {
            self.refresh_input_state(target, port)?;
        }
        Ok(self.actors.remove(&vid).flatten())
    }

    pub fn connect(
        &mut self,
        source: VertexId,
        source_port: usize,
        target: VertexId,
        target_port: usize,
    ) -> Result<EdgeId, DataflowError> {
        let src = self.store.out_port(source, source_port)?;
        let tgt = self.store.in_port(target, target_port)?;
        let eid = self.store.connect(src, tgt)?;
        self.actor_mut(target)?
            .set_input_state(target_port, InputState::Connected);
        Ok(eid)
    }

    pub fn disconnect(
        &mut self,
        source: VertexId,
        source_port: usize,
        target: VertexId,
        target_port: usize,
    ) -> Result<EdgeId, DataflowError> {
        let src = self.store.out_port(source, source_port)?;
        let tgt = self.store.in_port(target, target_port)?;
        let eid = self.store.disconnect(src, tgt)?;
        self.refresh_input_state(target, target_port)?;
        Ok(eid)
    }

    /// Recompute the connection marker of one input from its edges.
    /// A collecting input stays connected while any producer remains.
    fn refresh_input_state(&mut self, vid: VertexId, port: usize) -> Result<(), DataflowError> {
        let pid = self.store.in_port(vid, port)?;
        let state = if self.store.connected_ports(pid)?.is_empty() {
            InputState::Unconnected
        } else {
            InputState::Connected
        };
        if let Ok(actor) = self.actor_mut(vid) {
            actor.set_input_state(port, state);
        }
        Ok(())
    }

    /// Recompute the connection markers of every input of `vid`.
    pub fn refresh_input_states(&mut self, vid: VertexId) -> Result<(), DataflowError> {
        let nb_ports = self.store.in_ports(vid)?.len();
        for port in 0..nb_ports {
            self.refresh_input_state(vid, port)?;
        }
        Ok(())
    }

    pub fn connection(&self, eid: EdgeId) -> Result<Connection, DataflowError> {
        let source_port = self.store.source_port(eid)?;
        let target_port = self.store.target_port(eid)?;
        Ok(Connection {
            source: self.store.vertex(source_port)?,
            source_port: self.store.local_id(source_port)?,
            target: self.store.vertex(target_port)?,
            target_port: self.store.local_id(target_port)?,
        })
    }

    pub fn has_vertex(&self, vid: VertexId) -> bool {
        self.store.has_vertex(vid)
    }

    pub fn vertices(&self) -> &[VertexId] {
        self.store.vertices()
    }

    pub fn actor(&self, vid: VertexId) -> Result<&dyn Actor, DataflowError> {
        match self.actors.get(&vid) {
            Some(Some(actor)) => Ok(actor.as_ref()),
            Some(None) => Err(DataflowError::VertexBusy(vid)),
            None => Err(DataflowError::UnknownVertex(vid)),
        }
    }

    pub fn actor_mut(&mut self, vid: VertexId) -> Result<&mut dyn Actor, DataflowError> {
        match self.actors.get_mut(&vid) {
            Some(Some(actor)) => Ok(actor.as_mut()),
            Some(None) => Err(DataflowError::VertexBusy(vid)),
            None => Err(DataflowError::UnknownVertex(vid)),
        }
    }

    /// Move the actor of `vid` out of the graph for the duration of its `eval()`.
    pub(crate) fn take_actor(&mut self, vid: VertexId) -> Result<Box<dyn Actor>, DataflowError> {
        match self.actors.get_mut(&vid) {
            Some(slot) => slot.take().ok_or(DataflowError::VertexBusy(vid)),
            None => Err(DataflowError::UnknownVertex(vid)),
        }
    }

    pub(crate) fn restore_actor(&mut self, vid: VertexId, actor: Box<dyn Actor>) {
        self.actors.insert(vid, Some(actor));
    }

    /// Producers feeding the input port `pid`, as `(output port, vertex)`.
    ///
    /// Sorted by the producer's horizontal position, ties broken by port
    /// creation order.
    pub fn parent_ports(&self, pid: PortId) -> Result<Vec<(PortId, VertexId)>, DataflowError> {
        let mut parents = Vec::new();
        for npid in self.store.connected_ports(pid)? {
            let nvid = self.store.vertex(npid)?;
            let x = self
                .actor(nvid)
                .map(|actor| actor.state().internal_data.position_x())
                .unwrap_or(OrderedFloat(0.0));
            parents.push((x, npid, nvid));
        }
        parents.sort_by_key(|(x, npid, _)| (*x, *npid));
        Ok(parents
            .into_iter()
            .map(|(_, npid, nvid)| (npid, nvid))
            .collect())
    }

    /// Sinks of the graph (no outgoing edge), boundary vertices excluded,
    /// in insertion order.
    pub fn roots(&self) -> Result<Vec<VertexId>, DataflowError> {
        let mut roots = Vec::new();
        for &vid in self.store.vertices() {
            if !self.is_pseudo(vid) && self.store.nb_out_edges(vid)? == 0 {
                roots.push(vid);
            }
        }
        Ok(roots)
    }

    /// Vertex ids sorted by descending `priority` metadata; ties keep the
    /// given order.
    pub fn sort_by_priority(&self, vids: &mut [VertexId]) {
        vids.sort_by_key(|vid| {
            std::cmp::Reverse(
                self.actor(*vid)
                    .map(|actor| actor.state().internal_data.priority())
                    .unwrap_or(OrderedFloat(0.0)),
            )
        });
    }
}
