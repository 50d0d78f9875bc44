//! Boundary computation and export of a composite (or a selection of it) to
//! a factory.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use super::factory::{CompositeNodeFactory, ElementSpec, Endpoint, LinkSpec};
use super::node::CompositeNode;
use crate::actor::{Actor, InputState};
use crate::error::DataflowError;
use crate::graph::{Connection, EdgeId, VertexId};
use crate::model::PortDescriptor;
use crate::registry::NodeFactory;

/// Ports a selection exposes once grouped, with the links tying them to the
/// boundary of the future composite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IoBoundary {
    pub inputs: Vec<PortDescriptor>,
    pub outputs: Vec<PortDescriptor>,
    pub links: Vec<LinkSpec>,
}

impl CompositeNode {
    /// Sorted selection without the boundary vertices. `None` selects every
    /// node.
    fn selection(&self, selection: Option<&[VertexId]>) -> Vec<VertexId> {
        let mut vids: Vec<VertexId> = match selection {
            Some(vids) => vids.to_vec(),
            None => self.graph().vertices().to_vec(),
        };
        vids.retain(|vid| !self.graph().is_pseudo(*vid));
        vids.sort();
        vids.dedup();
        vids
    }

    /// Ports of the selection that are free or linked to the outside.
    fn boundary_ports(
        &self,
        selection: &[VertexId],
        inputs: bool,
    ) -> Result<(Vec<PortDescriptor>, Vec<LinkSpec>), DataflowError> {
        let store = self.graph().store();
        let mut descs: Vec<PortDescriptor> = Vec::new();
        let mut links = Vec::new();

        for &vid in selection {
            let actor = self.graph().actor(vid)?;
            let caption = format!("({})", actor.state().caption());
            let ports = if inputs {
                store.in_ports(vid)?
            } else {
                store.out_ports(vid)?
            };

            for &pid in ports {
                let edges = store.connected_edges(pid)?;
                let mut external = false;
                for &eid in &edges {
                    let other = if inputs {
                        store.source(eid)?
                    } else {
                        store.target(eid)?
                    };
                    external |= !selection.contains(&other);
                }
                if !edges.is_empty() && !external {
                    continue;
                }

                let local = store.local_id(pid)?;
                let declared = if inputs {
                    actor.state().input_desc().get(local)
                } else {
                    actor.state().output_desc().get(local)
                };
                let mut desc = declared
                    .cloned()
                    .unwrap_or_else(|| PortDescriptor::any(&local.to_string()));

                let base = desc.name.clone();
                let mut name = format!("{}{}", base, caption);
                let mut count = 0;
                while descs.iter().any(|d| d.name == name) {
                    count += 1;
                    name = format!("{}{}{}", base, count, caption);
                }
                desc.name = name;

                if inputs {
                    let current = actor.get_input(local)?;
                    if current.is_truthy() && !current.is_deferred() {
                        desc.default = current;
                    }
                    links.push(LinkSpec {
                        source: Endpoint::In,
                        source_port: descs.len(),
                        target: Endpoint::Vertex(vid),
                        target_port: local,
                    });
                } else {
                    links.push(LinkSpec {
                        source: Endpoint::Vertex(vid),
                        source_port: local,
                        target: Endpoint::Out,
                        target_port: descs.len(),
                    });
                }
                descs.push(desc);
            }
        }
        Ok((descs, links))
    }

    /// Inputs and outputs a composite made of `selection` would expose.
    pub fn compute_io(&self, selection: Option<&[VertexId]>) -> Result<IoBoundary, DataflowError> {
        let selection = self.selection(selection);
        let (inputs, mut links) = self.boundary_ports(&selection, true)?;
        let (outputs, out_links) = self.boundary_ports(&selection, false)?;
        links.extend(out_links);
        Ok(IoBoundary {
            inputs,
            outputs,
            links,
        })
    }

    /// Connections that would tie a composite made of `selection`, placed
    /// at `new_vid`, to the rest of this graph.
    pub fn compute_external_io(
        &self,
        selection: &[VertexId],
        new_vid: VertexId,
    ) -> Result<Vec<Connection>, DataflowError> {
        let selection = self.selection(Some(selection));
        let (_, in_links) = self.boundary_ports(&selection, true)?;
        let (_, out_links) = self.boundary_ports(&selection, false)?;

        let mut connections = Vec::new();
        let incoming = self.external_edges(&selection, true)?;
        for link in in_links {
            if let Endpoint::Vertex(vid) = link.target {
                for eid in incoming.get(&(vid, link.target_port)).into_iter().flatten() {
                    let outside = self.graph().connection(*eid)?;
                    connections.push(Connection {
                        source: outside.source,
                        source_port: outside.source_port,
                        target: new_vid,
                        target_port: link.source_port,
                    });
                }
            }
        }

        let outgoing = self.external_edges(&selection, false)?;
        for link in out_links {
            if let Endpoint::Vertex(vid) = link.source {
                for eid in outgoing.get(&(vid, link.source_port)).into_iter().flatten() {
                    let outside = self.graph().connection(*eid)?;
                    connections.push(Connection {
                        source: new_vid,
                        source_port: link.target_port,
                        target: outside.target,
                        target_port: outside.target_port,
                    });
                }
            }
        }
        Ok(connections)
    }

    /// Edges crossing the selection boundary, keyed by (vertex, local port).
    fn external_edges(
        &self,
        selection: &[VertexId],
        inputs: bool,
    ) -> Result<HashMap<(VertexId, usize), Vec<EdgeId>>, DataflowError> {
        let store = self.graph().store();
        let mut crossing: HashMap<(VertexId, usize), Vec<EdgeId>> = HashMap::new();
        for &vid in selection {
            let ports = if inputs {
                store.in_ports(vid)?
            } else {
                store.out_ports(vid)?
            };
            for &pid in ports {
                for eid in store.connected_edges(pid)? {
                    let other = if inputs {
                        store.source(eid)?
                    } else {
                        store.target(eid)?
                    };
                    if !selection.contains(&other) {
                        crossing
                            .entry((vid, store.local_id(pid)?))
                            .or_default()
                            .push(eid);
                    }
                }
            }
        }
        Ok(crossing)
    }

    /// Export this composite, or the nodes in `selection`, as a factory.
    ///
    /// With `auto_io` the boundary is computed from the selection, otherwise
    /// the composite's own inputs and outputs are kept. Every exported node
    /// must come from a factory.
    pub fn to_factory(
        &mut self,
        selection: Option<&[VertexId]>,
        auto_io: bool,
        package: &str,
        name: &str,
    ) -> Result<CompositeNodeFactory, DataflowError> {
        let (inputs, outputs, boundary_links) = if auto_io {
            let io = self.compute_io(selection)?;
            (io.inputs, io.outputs, io.links)
        } else {
            (
                self.state().input_desc().to_vec(),
                self.state().output_desc().to_vec(),
                Vec::new(),
            )
        };

        let mut listed: Vec<VertexId> = match selection {
            Some(vids) => vids.to_vec(),
            None => self.graph().vertices().to_vec(),
        };
        if auto_io {
            listed.retain(|vid| !self.graph().is_pseudo(*vid));
        }

        let mut factory = CompositeNodeFactory::new(package, name)
            .with_inputs(inputs)
            .with_outputs(outputs);

        for edge in self.graph().store().edges() {
            let link = self.graph().connection(edge.id)?;
            if !listed.contains(&link.source) || !listed.contains(&link.target) {
                continue;
            }
            let source = if link.source == self.id_in() {
                Endpoint::In
            } else {
                Endpoint::Vertex(link.source)
            };
            let target = if link.target == self.id_out() {
                Endpoint::Out
            } else {
                Endpoint::Vertex(link.target)
            };
            factory.connections.push(LinkSpec {
                source,
                source_port: link.source_port,
                target,
                target_port: link.target_port,
            });
        }
        factory.connections.extend(boundary_links);

        for &vid in &listed {
            let actor = self.graph().actor(vid)?;
            let state = actor.state();
            if vid == self.id_in() {
                factory.input_data = state.internal_data.clone();
                continue;
            }
            if vid == self.id_out() {
                factory.output_data = state.internal_data.clone();
                continue;
            }
            let factory_id = state.factory.clone().ok_or(DataflowError::NoFactory(vid))?;

            let mut values = BTreeMap::new();
            for port in 0..actor.nb_inputs() {
                if state.input_state(port) == Some(InputState::Connected) {
                    continue;
                }
                let value = actor.get_input(port)?;
                if !value.is_deferred() {
                    values.insert(port, value);
                }
            }
            factory.elements.push(ElementSpec {
                id: vid,
                factory: factory_id,
                data: state.internal_data.clone(),
                values,
            });
        }

        debug!(
            "Exported {} element(s) and {} link(s) to {}",
            factory.elements.len(),
            factory.connections.len(),
            factory.id()
        );
        self.graph_modified = false;
        if selection.is_none() {
            self.state_mut().factory = Some(factory.id());
        }
        Ok(factory)
    }
}
