//! Arena-backed shader node graph.
//!
//! Nodes and links live in slot vectors addressed by `NodeId` / `LinkId`.
//! Removing an element frees its slot without compacting, and the removed
//! value can be put back into the very same slot, so handles held by an edit
//! journal stay valid across undo. Links never replace each other: an input
//! may carry several incoming links and callers unlink explicitly.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub node: NodeId,
    pub socket: String,
}

impl OutputRef {
    pub fn new(node: NodeId, socket: impl Into<String>) -> Self {
        Self {
            node,
            socket: socket.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRef {
    pub node: NodeId,
    pub socket: String,
}

impl InputRef {
    pub fn new(node: NodeId, socket: impl Into<String>) -> Self {
        Self {
            node,
            socket: socket.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: OutputRef,
    pub to: InputRef,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("{0} does not exist")]
    UnknownNode(NodeId),
    #[error("{0} does not exist")]
    UnknownLink(LinkId),
    #[error("{node} has no input socket '{socket}'")]
    UnknownInput { node: NodeId, socket: String },
    #[error("{node} has no output socket '{socket}'")]
    UnknownOutput { node: NodeId, socket: String },
    #[error("slot for {0} is already occupied")]
    NodeSlotOccupied(NodeId),
    #[error("slot for {0} is already occupied")]
    LinkSlotOccupied(LinkId),
}

/// Everything needed to put a removed node back where it was.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub id: NodeId,
    pub node: Node,
    pub links: Vec<(LinkId, Link)>,
    pub was_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeGraph {
    #[serde(default)]
    nodes: Vec<Option<Node>>,
    #[serde(default)]
    links: Vec<Option<Link>>,
    #[serde(default)]
    active: Option<NodeId>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|node| (NodeId(index as u32), node)))
    }

    pub fn find_node(&self, mut predicate: impl FnMut(&Node) -> bool) -> Option<NodeId> {
        self.nodes()
            .find(|(_, node)| predicate(node))
            .map(|(id, _)| id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn links(&self) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|link| (LinkId(index as u32), link)))
    }

    pub fn link_count(&self) -> usize {
        self.links.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn link_by_id(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Links feeding `input`, in creation order.
    pub fn links_to(&self, input: &InputRef) -> Vec<(LinkId, &Link)> {
        self.links().filter(|(_, link)| &link.to == input).collect()
    }

    pub fn upstream(&self, input: &InputRef) -> Vec<OutputRef> {
        self.links_to(input)
            .into_iter()
            .map(|(_, link)| link.from.clone())
            .collect()
    }

    pub fn is_linked(&self, input: &InputRef) -> bool {
        self.links().any(|(_, link)| &link.to == input)
    }

    pub fn link(&mut self, from: OutputRef, to: InputRef) -> Result<LinkId, GraphError> {
        self.check_output(&from)?;
        self.check_input(&to)?;
        let id = LinkId(self.links.len() as u32);
        self.links.push(Some(Link { from, to }));
        Ok(id)
    }

    pub fn unlink(&mut self, id: LinkId) -> Result<Link, GraphError> {
        self.links
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(GraphError::UnknownLink(id))
    }

    /// Puts a previously removed link back into its original slot.
    pub fn restore_link(&mut self, id: LinkId, link: Link) -> Result<(), GraphError> {
        self.check_output(&link.from)?;
        self.check_input(&link.to)?;
        let index = id.0 as usize;
        if index >= self.links.len() {
            self.links.resize(index + 1, None);
        }
        let slot = &mut self.links[index];
        if slot.is_some() {
            return Err(GraphError::LinkSlotOccupied(id));
        }
        *slot = Some(link);
        Ok(())
    }

    /// Removes a node together with every link touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<RemovedNode, GraphError> {
        let node = self
            .nodes
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(GraphError::UnknownNode(id))?;

        let mut links = Vec::new();
        for (index, slot) in self.links.iter_mut().enumerate() {
            let touches = slot
                .as_ref()
                .map(|link| link.from.node == id || link.to.node == id)
                .unwrap_or(false);
            if touches {
                if let Some(link) = slot.take() {
                    links.push((LinkId(index as u32), link));
                }
            }
        }

        let was_active = self.active == Some(id);
        if was_active {
            self.active = None;
        }

        Ok(RemovedNode {
            id,
            node,
            links,
            was_active,
        })
    }

    pub fn restore_node(&mut self, removed: RemovedNode) -> Result<(), GraphError> {
        let index = removed.id.0 as usize;
        if index >= self.nodes.len() {
            self.nodes.resize(index + 1, None);
        }
        if self.nodes[index].is_some() {
            return Err(GraphError::NodeSlotOccupied(removed.id));
        }
        self.nodes[index] = Some(removed.node);
        for (link_id, link) in removed.links {
            self.restore_link(link_id, link)?;
        }
        if removed.was_active {
            self.active = Some(removed.id);
        }
        Ok(())
    }

    pub fn active(&self) -> Option<NodeId> {
        self.active.filter(|id| self.contains(*id))
    }

    /// Returns the previously active node.
    pub fn set_active(&mut self, id: Option<NodeId>) -> Result<Option<NodeId>, GraphError> {
        if let Some(id) = id {
            if !self.contains(id) {
                return Err(GraphError::UnknownNode(id));
            }
        }
        Ok(std::mem::replace(&mut self.active, id))
    }

    /// Returns the previous selection flag.
    pub fn set_select(&mut self, id: NodeId, select: bool) -> Result<bool, GraphError> {
        let node = self.node_mut(id).ok_or(GraphError::UnknownNode(id))?;
        Ok(std::mem::replace(&mut node.select, select))
    }

    fn check_output(&self, output: &OutputRef) -> Result<(), GraphError> {
        let node = self
            .node(output.node)
            .ok_or(GraphError::UnknownNode(output.node))?;
        if node.output(&output.socket).is_none() {
            return Err(GraphError::UnknownOutput {
                node: output.node,
                socket: output.socket.clone(),
            });
        }
        Ok(())
    }

    fn check_input(&self, input: &InputRef) -> Result<(), GraphError> {
        let node = self
            .node(input.node)
            .ok_or(GraphError::UnknownNode(input.node))?;
        if node.input(&input.socket).is_none() {
            return Err(GraphError::UnknownInput {
                node: input.node,
                socket: input.socket.clone(),
            });
        }
        Ok(())
    }
}
