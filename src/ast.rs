use crate::error::Span;
use crate::expression::Condition;

/// Index of a node inside its [`NodeTree`].
///
/// Ids are only meaningful for the tree that produced them; they identify
/// branches in coverage records.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Literal text, emitted verbatim.
    Text(String),
    /// A value bound through a placeholder.
    Bind { name: String, paren: bool },
    /// A value rendered straight into the statement.
    Embedded { name: String, quoted: bool },
    /// Children transformed in order.
    Container(Vec<NodeId>),
    /// `IF` / `ELIF`... / `ELSE`; the first branch whose expression holds wins.
    Conditional {
        branches: Vec<Branch>,
        otherwise: Option<Otherwise>,
    },
    /// `BEGIN`: children are kept only if they resolved at least one parameter
    /// or entered a branch.
    Begin(Vec<NodeId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub expression: Condition,
    /// A [`Node::Container`].
    pub body: NodeId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Otherwise {
    /// A [`Node::Container`].
    pub body: NodeId,
    pub span: Span,
}

/// An immutable arena of [`Node`]s. Children are stored before their parents;
/// the root is a [`Node::Container`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
}

impl NodeTree {
    pub const fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node with its id, in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Depth-first, source-order walk from the root.
    pub(crate) fn walk<'t, F: FnMut(NodeId, &'t Node)>(&'t self, id: NodeId, visit: &mut F) {
        let Some(node) = self.get(id) else {
            return;
        };
        visit(id, node);
        match node {
            Node::Container(children) | Node::Begin(children) => {
                for child in children {
                    self.walk(*child, visit);
                }
            }
            Node::Conditional {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    self.walk(branch.body, visit);
                }
                if let Some(otherwise) = otherwise {
                    self.walk(otherwise.body, visit);
                }
            }
            Node::Text(_) | Node::Bind { .. } | Node::Embedded { .. } => {}
        }
    }
}
