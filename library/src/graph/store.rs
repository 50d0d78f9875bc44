//! Directed multi-port graph: vertices own typed ports, edges go from an
//! output port to an input port.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DataflowError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct VertexId(pub u64);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PortId(pub u64);

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
    In,
    Out,
}

/// How many edges an input port accepts.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FanIn {
    #[default]
    Single,
    /// Collects every producer into a list.
    Multiple,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: PortId,
    pub target: PortId,
}

#[derive(Clone, Debug)]
struct PortEntry {
    vertex: VertexId,
    local: usize,
    direction: PortDirection,
    fan_in: FanIn,
    edges: Vec<EdgeId>,
}

#[derive(Clone, Debug, Default)]
struct VertexEntry {
    in_ports: Vec<PortId>,
    out_ports: Vec<PortId>,
}

#[derive(Clone, Debug, Default)]
pub struct GraphStore {
    order: Vec<VertexId>,
    vertices: HashMap<VertexId, VertexEntry>,
    ports: HashMap<PortId, PortEntry>,
    edges: BTreeMap<EdgeId, Edge>,
    next_vertex: u64,
    next_port: u64,
    next_edge: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vertex. A fresh id is generated when `id` is `None`.
    pub fn add_vertex(&mut self, id: Option<VertexId>) -> Result<VertexId, DataflowError> {
        let vid = match id {
            Some(vid) if self.vertices.contains_key(&vid) => {
                return Err(DataflowError::DuplicateId(vid));
            }
            Some(vid) => vid,
            None => {
                while self.vertices.contains_key(&VertexId(self.next_vertex)) {
                    self.next_vertex = self
                        .next_vertex
                        .checked_add(1)
                        .ok_or_else(|| DataflowError::invalid("vertex ids exhausted"))?;
                }
                VertexId(self.next_vertex)
            }
        };
        self.next_vertex = self.next_vertex.max(vid.0.saturating_add(1));
        self.vertices.insert(vid, VertexEntry::default());
        self.order.push(vid);
        Ok(vid)
    }

    /// Remove a vertex with its ports and every incident edge.
    pub fn remove_vertex(&mut self, vid: VertexId) -> Result<(), DataflowError> {
        let entry = self
            .vertices
            .remove(&vid)
            .ok_or(DataflowError::UnknownVertex(vid))?;
        for pid in entry.in_ports.iter().chain(entry.out_ports.iter()) {
            if let Some(port) = self.ports.remove(pid) {
                for eid in port.edges {
                    self.detach_edge(eid);
                }
            }
        }
        self.order.retain(|v| *v != vid);
        Ok(())
    }

    pub fn add_in_port(&mut self, vid: VertexId, local: usize) -> Result<PortId, DataflowError> {
        self.add_port(vid, local, PortDirection::In, FanIn::Single)
    }

    /// Register an input port that accepts several incoming edges.
    pub fn add_in_port_with(
        &mut self,
        vid: VertexId,
        local: usize,
        fan_in: FanIn,
    ) -> Result<PortId, DataflowError> {
        self.add_port(vid, local, PortDirection::In, fan_in)
    }

    pub fn add_out_port(&mut self, vid: VertexId, local: usize) -> Result<PortId, DataflowError> {
        self.add_port(vid, local, PortDirection::Out, FanIn::Single)
    }

    fn add_port(
        &mut self,
        vid: VertexId,
        local: usize,
        direction: PortDirection,
        fan_in: FanIn,
    ) -> Result<PortId, DataflowError> {
        if self.find_port(vid, local, direction).is_some() {
            return Err(DataflowError::invalid(format!(
                "vertex {} already has a {:?} port {}",
                vid, direction, local
            )));
        }
        let pid = PortId(self.next_port);
        let ports = &self.ports;
        let entry = self
            .vertices
            .get_mut(&vid)
            .ok_or(DataflowError::UnknownVertex(vid))?;
        let list = match direction {
            PortDirection::In => &mut entry.in_ports,
            PortDirection::Out => &mut entry.out_ports,
        };
        let at = list
            .iter()
            .position(|p| ports.get(p).is_some_and(|port| port.local > local))
            .unwrap_or(list.len());
        list.insert(at, pid);
        self.next_port += 1;
        self.ports.insert(
            pid,
            PortEntry {
                vertex: vid,
                local,
                direction,
                fan_in,
                edges: Vec::new(),
            },
        );
        Ok(pid)
    }

    fn find_port(&self, vid: VertexId, local: usize, direction: PortDirection) -> Option<PortId> {
        let entry = self.vertices.get(&vid)?;
        let list = match direction {
            PortDirection::In => &entry.in_ports,
            PortDirection::Out => &entry.out_ports,
        };
        list.iter()
            .copied()
            .find(|p| self.ports.get(p).is_some_and(|port| port.local == local))
    }

    pub fn in_port(&self, vid: VertexId, local: usize) -> Result<PortId, DataflowError> {
        self.find_port(vid, local, PortDirection::In).ok_or_else(|| {
            DataflowError::unknown_port(format!("vertex {} has no input port {}", vid, local))
        })
    }

    pub fn out_port(&self, vid: VertexId, local: usize) -> Result<PortId, DataflowError> {
        self.find_port(vid, local, PortDirection::Out).ok_or_else(|| {
            DataflowError::unknown_port(format!("vertex {} has no output port {}", vid, local))
        })
    }

    fn port(&self, pid: PortId) -> Result<&PortEntry, DataflowError> {
        self.ports
            .get(&pid)
            .ok_or_else(|| DataflowError::unknown_port(pid.to_string()))
    }

    /// Connect an output port to an input port.
    ///
    /// An input port accepts at most one incoming edge unless it was
    /// registered with [`FanIn::Multiple`].
    pub fn connect(&mut self, source: PortId, target: PortId) -> Result<EdgeId, DataflowError> {
        let src = self.port(source)?;
        let tgt = self.port(target)?;
        if src.direction != PortDirection::Out {
            return Err(DataflowError::InvalidEdge(format!(
                "{} is not an output port",
                source
            )));
        }
        if tgt.direction != PortDirection::In {
            return Err(DataflowError::InvalidEdge(format!(
                "{} is not an input port",
                target
            )));
        }
        if tgt.fan_in == FanIn::Single && !tgt.edges.is_empty() {
            return Err(DataflowError::InvalidEdge(format!(
                "input port {} of vertex {} is already connected",
                tgt.local, tgt.vertex
            )));
        }

        let eid = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(
            eid,
            Edge {
                id: eid,
                source,
                target,
            },
        );
        for pid in [source, target] {
            if let Some(port) = self.ports.get_mut(&pid) {
                port.edges.push(eid);
            }
        }
        Ok(eid)
    }

    /// Remove the edge going from `source` to `target`.
    pub fn disconnect(&mut self, source: PortId, target: PortId) -> Result<EdgeId, DataflowError> {
        let eid = self
            .port(source)?
            .edges
            .iter()
            .copied()
            .find(|eid| self.edges.get(eid).is_some_and(|e| e.target == target))
            .ok_or_else(|| DataflowError::EdgeNotFound(format!("{} -> {}", source, target)))?;
        self.detach_edge(eid);
        Ok(eid)
    }

    pub fn remove_edge(&mut self, eid: EdgeId) -> Result<(), DataflowError> {
        if !self.edges.contains_key(&eid) {
            return Err(DataflowError::EdgeNotFound(eid.to_string()));
        }
        self.detach_edge(eid);
        Ok(())
    }

    fn detach_edge(&mut self, eid: EdgeId) {
        if let Some(edge) = self.edges.remove(&eid) {
            for pid in [edge.source, edge.target] {
                if let Some(port) = self.ports.get_mut(&pid) {
                    port.edges.retain(|e| *e != eid);
                }
            }
        }
    }

    /// Ports linked to `pid`: the sources of an input port, or every target
    /// of an output port, in edge creation order.
    pub fn connected_ports(&self, pid: PortId) -> Result<Vec<PortId>, DataflowError> {
        let port = self.port(pid)?;
        Ok(port
            .edges
            .iter()
            .filter_map(|eid| self.edges.get(eid))
            .map(|e| if e.source == pid { e.target } else { e.source })
            .collect())
    }

    pub fn connected_edges(&self, pid: PortId) -> Result<Vec<EdgeId>, DataflowError> {
        Ok(self.port(pid)?.edges.clone())
    }

    pub fn edge(&self, eid: EdgeId) -> Option<&Edge> {
        self.edges.get(&eid)
    }

    pub fn source(&self, eid: EdgeId) -> Result<VertexId, DataflowError> {
        self.vertex(self.source_port(eid)?)
    }

    pub fn target(&self, eid: EdgeId) -> Result<VertexId, DataflowError> {
        self.vertex(self.target_port(eid)?)
    }

    pub fn source_port(&self, eid: EdgeId) -> Result<PortId, DataflowError> {
        self.edges
            .get(&eid)
            .map(|e| e.source)
            .ok_or_else(|| DataflowError::EdgeNotFound(eid.to_string()))
    }

    pub fn target_port(&self, eid: EdgeId) -> Result<PortId, DataflowError> {
        self.edges
            .get(&eid)
            .map(|e| e.target)
            .ok_or_else(|| DataflowError::EdgeNotFound(eid.to_string()))
    }

    /// Vertex owning `pid`.
    pub fn vertex(&self, pid: PortId) -> Result<VertexId, DataflowError> {
        Ok(self.port(pid)?.vertex)
    }

    /// Index of `pid` among the ports of its vertex.
    pub fn local_id(&self, pid: PortId) -> Result<usize, DataflowError> {
        Ok(self.port(pid)?.local)
    }

    pub fn port_direction(&self, pid: PortId) -> Result<PortDirection, DataflowError> {
        Ok(self.port(pid)?.direction)
    }

    fn entry(&self, vid: VertexId) -> Result<&VertexEntry, DataflowError> {
        self.vertices
            .get(&vid)
            .ok_or(DataflowError::UnknownVertex(vid))
    }

    pub fn in_ports(&self, vid: VertexId) -> Result<&[PortId], DataflowError> {
        Ok(&self.entry(vid)?.in_ports)
    }

    pub fn out_ports(&self, vid: VertexId) -> Result<&[PortId], DataflowError> {
        Ok(&self.entry(vid)?.out_ports)
    }

    pub fn in_edges(&self, vid: VertexId) -> Result<Vec<EdgeId>, DataflowError> {
        self.port_edges(&self.entry(vid)?.in_ports)
    }

    pub fn out_edges(&self, vid: VertexId) -> Result<Vec<EdgeId>, DataflowError> {
        self.port_edges(&self.entry(vid)?.out_ports)
    }

    fn port_edges(&self, pids: &[PortId]) -> Result<Vec<EdgeId>, DataflowError> {
        let mut edges = Vec::new();
        for pid in pids {
            edges.extend_from_slice(&self.port(*pid)?.edges);
        }
        Ok(edges)
    }

    pub fn nb_in_edges(&self, vid: VertexId) -> Result<usize, DataflowError> {
        Ok(self.in_edges(vid)?.len())
    }

    pub fn nb_out_edges(&self, vid: VertexId) -> Result<usize, DataflowError> {
        Ok(self.out_edges(vid)?.len())
    }

    pub fn has_vertex(&self, vid: VertexId) -> bool {
        self.vertices.contains_key(&vid)
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> &[VertexId] {
        &self.order
    }

    /// Edges in creation order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn nb_vertices(&self) -> usize {
        self.order.len()
    }

    pub fn nb_edges(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vertices() -> (GraphStore, VertexId, VertexId) {
        let mut store = GraphStore::new();
        let a = store.add_vertex(None).unwrap();
        let b = store.add_vertex(None).unwrap();
        store.add_out_port(a, 0).unwrap();
        store.add_in_port(b, 0).unwrap();
        store.add_in_port(b, 1).unwrap();
        (store, a, b)
    }

    #[test]
    fn test_duplicate_vertex_id() {
        let mut store = GraphStore::new();
        store.add_vertex(Some(VertexId(7))).unwrap();
        let err = store.add_vertex(Some(VertexId(7))).unwrap_err();
        assert!(matches!(err, DataflowError::DuplicateId(VertexId(7))));
        // Auto ids never collide with explicit ones.
        assert_eq!(store.add_vertex(None).unwrap(), VertexId(8));
    }

    #[test]
    fn test_largest_vertex_id() {
        let mut store = GraphStore::new();
        store.add_vertex(Some(VertexId(u64::MAX))).unwrap();
        assert!(store.has_vertex(VertexId(u64::MAX)));
        let err = store.add_vertex(None).unwrap_err();
        assert!(matches!(err, DataflowError::InvalidArgument(_)));
        assert_eq!(store.nb_vertices(), 1);
    }

    #[test]
    fn test_fan_in_is_limited_to_one() {
        let (mut store, a, b) = two_vertices();
        let c = store.add_vertex(None).unwrap();
        let c_out = store.add_out_port(c, 0).unwrap();
        let a_out = store.out_port(a, 0).unwrap();
        let b_in = store.in_port(b, 0).unwrap();

        store.connect(a_out, b_in).unwrap();
        let err = store.connect(c_out, b_in).unwrap_err();
        assert!(matches!(err, DataflowError::InvalidEdge(_)));
        assert_eq!(store.connected_ports(b_in).unwrap(), vec![a_out]);
    }

    #[test]
    fn test_fan_out() {
        let (mut store, a, b) = two_vertices();
        let a_out = store.out_port(a, 0).unwrap();
        let b0 = store.in_port(b, 0).unwrap();
        let b1 = store.in_port(b, 1).unwrap();
        store.connect(a_out, b0).unwrap();
        store.connect(a_out, b1).unwrap();
        assert_eq!(store.connected_ports(a_out).unwrap(), vec![b0, b1]);
        assert_eq!(store.nb_out_edges(a).unwrap(), 2);
        assert_eq!(store.nb_in_edges(b).unwrap(), 2);
    }

    #[test]
    fn test_multiple_fan_in_port() {
        let (mut store, a, b) = two_vertices();
        let c = store.add_vertex(None).unwrap();
        let c_out = store.add_out_port(c, 0).unwrap();
        let a_out = store.out_port(a, 0).unwrap();
        let many = store.add_in_port_with(b, 2, FanIn::Multiple).unwrap();

        store.connect(a_out, many).unwrap();
        store.connect(c_out, many).unwrap();
        assert_eq!(store.connected_ports(many).unwrap(), vec![a_out, c_out]);
    }

    #[test]
    fn test_direction_is_checked() {
        let (mut store, a, b) = two_vertices();
        let a_out = store.out_port(a, 0).unwrap();
        let b_in = store.in_port(b, 0).unwrap();
        assert!(matches!(
            store.connect(b_in, a_out),
            Err(DataflowError::InvalidEdge(_))
        ));
        assert!(matches!(
            store.connect(a_out, PortId(999)),
            Err(DataflowError::UnknownPort(_))
        ));
    }

    #[test]
    fn test_disconnect_missing_edge() {
        let (mut store, a, b) = two_vertices();
        let a_out = store.out_port(a, 0).unwrap();
        let b_in = store.in_port(b, 0).unwrap();
        assert!(matches!(
            store.disconnect(a_out, b_in),
            Err(DataflowError::EdgeNotFound(_))
        ));
        store.connect(a_out, b_in).unwrap();
        store.disconnect(a_out, b_in).unwrap();
        assert_eq!(store.nb_edges(), 0);
    }

    #[test]
    fn test_remove_vertex_cascades() {
        let (mut store, a, b) = two_vertices();
        let a_out = store.out_port(a, 0).unwrap();
        let b_in = store.in_port(b, 0).unwrap();
        store.connect(a_out, b_in).unwrap();

        store.remove_vertex(b).unwrap();
        assert_eq!(store.nb_edges(), 0);
        assert!(store.connected_ports(a_out).unwrap().is_empty());
        assert_eq!(store.vertices(), &[a]);
        assert!(store.in_port(b, 0).is_err());
    }

    #[test]
    fn test_ports_ordered_by_local_index() {
        let mut store = GraphStore::new();
        let v = store.add_vertex(None).unwrap();
        let p2 = store.add_in_port(v, 2).unwrap();
        let p0 = store.add_in_port(v, 0).unwrap();
        let p1 = store.add_in_port(v, 1).unwrap();
        assert_eq!(store.in_ports(v).unwrap(), &[p0, p1, p2]);
        assert_eq!(store.local_id(p2).unwrap(), 2);
    }
}
