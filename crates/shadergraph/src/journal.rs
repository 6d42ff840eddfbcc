//! Reversible edit scripts over a `NodeGraph`.
//!
//! Every mutation made through an `EditJournal` is recorded together with
//! the data needed to invert it. `rollback` replays the inverses in reverse
//! order; it never stops on the first failure, so one stale handle cannot
//! prevent the rest of the graph from being restored.
use tracing::{debug, warn};

use crate::graph::{GraphError, InputRef, Link, LinkId, NodeGraph, NodeId, OutputRef, RemovedNode};
use crate::node::Node;

#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    AddNode(NodeId),
    RemoveNode(RemovedNode),
    AddLink(LinkId),
    RemoveLink { id: LinkId, link: Link },
    SetActive { previous: Option<NodeId> },
    SetSelect { node: NodeId, previous: bool },
}

#[derive(Debug, Default)]
pub struct EditJournal {
    ops: Vec<EditOp>,
}

impl EditJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn add_node(&mut self, graph: &mut NodeGraph, node: Node) -> NodeId {
        let id = graph.add_node(node);
        self.ops.push(EditOp::AddNode(id));
        id
    }

    pub fn remove_node(&mut self, graph: &mut NodeGraph, id: NodeId) -> Result<(), GraphError> {
        let removed = graph.remove_node(id)?;
        self.ops.push(EditOp::RemoveNode(removed));
        Ok(())
    }

    pub fn link(
        &mut self,
        graph: &mut NodeGraph,
        from: OutputRef,
        to: InputRef,
    ) -> Result<LinkId, GraphError> {
        let id = graph.link(from, to)?;
        self.ops.push(EditOp::AddLink(id));
        Ok(id)
    }

    pub fn unlink(&mut self, graph: &mut NodeGraph, id: LinkId) -> Result<Link, GraphError> {
        let link = graph.unlink(id)?;
        self.ops.push(EditOp::RemoveLink {
            id,
            link: link.clone(),
        });
        Ok(link)
    }

    /// Disconnects every link into `input`, returning the former sources in
    /// link order.
    pub fn unlink_input(
        &mut self,
        graph: &mut NodeGraph,
        input: &InputRef,
    ) -> Result<Vec<OutputRef>, GraphError> {
        let ids: Vec<LinkId> = graph.links_to(input).into_iter().map(|(id, _)| id).collect();
        let mut sources = Vec::with_capacity(ids.len());
        for id in ids {
            sources.push(self.unlink(graph, id)?.from);
        }
        Ok(sources)
    }

    pub fn set_active(
        &mut self,
        graph: &mut NodeGraph,
        id: Option<NodeId>,
    ) -> Result<(), GraphError> {
        let previous = graph.set_active(id)?;
        self.ops.push(EditOp::SetActive { previous });
        Ok(())
    }

    pub fn set_select(
        &mut self,
        graph: &mut NodeGraph,
        node: NodeId,
        select: bool,
    ) -> Result<(), GraphError> {
        let previous = graph.set_select(node, select)?;
        self.ops.push(EditOp::SetSelect { node, previous });
        Ok(())
    }

    /// Keeps every recorded edit; the journal forgets how to undo them.
    pub fn commit(&mut self) {
        self.ops.clear();
    }

    /// Undoes all recorded edits, newest first. Failures are collected and
    /// returned rather than aborting the rollback.
    pub fn rollback(&mut self, graph: &mut NodeGraph) -> Vec<GraphError> {
        let mut failures = Vec::new();
        let count = self.ops.len();
        while let Some(op) = self.ops.pop() {
            if let Err(err) = invert(graph, op) {
                warn!(error = %err, "failed to undo graph edit");
                failures.push(err);
            }
        }
        debug!(ops = count, failures = failures.len(), "rolled back graph edits");
        failures
    }
}

fn invert(graph: &mut NodeGraph, op: EditOp) -> Result<(), GraphError> {
    match op {
        EditOp::AddNode(id) => graph.remove_node(id).map(|_| ()),
        EditOp::RemoveNode(removed) => graph.restore_node(removed),
        EditOp::AddLink(id) => match graph.unlink(id) {
            // The link may already be gone together with a removed endpoint.
            Ok(_) | Err(GraphError::UnknownLink(_)) => Ok(()),
            Err(err) => Err(err),
        },
        EditOp::RemoveLink { id, link } => graph.restore_link(id, link),
        EditOp::SetActive { previous } => {
            let previous = previous.filter(|id| graph.contains(*id));
            graph.set_active(previous).map(|_| ())
        }
        EditOp::SetSelect { node, previous } => graph.set_select(node, previous).map(|_| ()),
    }
}
