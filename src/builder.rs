use crate::{
    ast::{Branch, Node, NodeId, NodeTree, Otherwise},
    error::{Span, SqlateError, SqlateResult, StructuralError, StructuralErrorKind},
    expression::Condition,
    scanner::{Token, TokenKind},
};

/// Deepest nesting of `IF` and `BEGIN` directives a template may use.
pub const MAX_NESTING_DEPTH: usize = 64;

/// The `IF` chain a branch body belongs to.
#[derive(Debug, Default)]
struct Chain {
    branches: Vec<Branch>,
    otherwise: Option<Otherwise>,
}

#[derive(Debug)]
enum Frame {
    Root(Vec<NodeId>),
    Begin {
        span: Span,
        children: Vec<NodeId>,
    },
    Branch {
        chain: Chain,
        /// `None` for the `ELSE` body.
        condition: Option<String>,
        span: Span,
        children: Vec<NodeId>,
    },
}

impl Frame {
    fn children(&mut self) -> &mut Vec<NodeId> {
        match self {
            Self::Root(children)
            | Self::Begin { children, .. }
            | Self::Branch { children, .. } => children,
        }
    }
}

struct TreeBuilder {
    nodes: Vec<Node>,
    stack: Vec<Frame>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            stack: vec![Frame::Root(Vec::new())],
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn append(&mut self, node: Node) {
        let id = self.alloc(node);
        if let Some(top) = self.stack.last_mut() {
            top.children().push(id);
        }
    }

    fn error(span: Span, kind: StructuralErrorKind) -> SqlateError {
        SqlateError::Structural(StructuralError { span, kind })
    }

    /// Opens a new frame, refusing to nest past [`MAX_NESTING_DEPTH`].
    fn open(&mut self, frame: Frame, span: Span) -> SqlateResult<()> {
        // The root frame does not count.
        if self.stack.len() > MAX_NESTING_DEPTH {
            return Err(Self::error(span, StructuralErrorKind::TooDeep {
                limit: MAX_NESTING_DEPTH,
            }));
        }
        self.stack.push(frame);
        Ok(())
    }

    /// Pops the innermost branch body and folds it into its chain.
    ///
    /// `directive` is the token that closed the body; it is rejected unless
    /// the top of the stack is a branch that still accepts alternates.
    fn pop_branch(&mut self, directive: &str, span: Span) -> SqlateResult<Chain> {
        let is_end = directive == "END";
        match self.stack.last() {
            Some(Frame::Branch {
                condition: None, ..
            }) if !is_end => {
                return Err(Self::error(span, StructuralErrorKind::AlternateAfterElse {
                    directive: directive.to_owned(),
                }));
            }
            Some(Frame::Branch { .. }) => {}
            Some(Frame::Root(_)) | None if is_end => {
                return Err(Self::error(span, StructuralErrorKind::UnmatchedEnd));
            }
            Some(Frame::Root(_) | Frame::Begin { .. }) | None => {
                return Err(Self::error(span, StructuralErrorKind::AlternateWithoutIf {
                    directive: directive.to_owned(),
                }));
            }
        }

        let Some(Frame::Branch {
            mut chain,
            condition,
            span: branch_span,
            children,
        }) = self.stack.pop()
        else {
            return Err(Self::error(span, StructuralErrorKind::UnmatchedEnd));
        };

        let body = self.alloc(Node::Container(children));
        match condition {
            Some(expression) => chain.branches.push(Branch {
                expression: Condition::new(expression),
                body,
                span: branch_span,
            }),
            None => {
                chain.otherwise = Some(Otherwise {
                    body,
                    span: branch_span,
                });
            }
        }
        Ok(chain)
    }

    fn push(&mut self, token: Token) -> SqlateResult<()> {
        let span = token.span;
        match token.kind {
            TokenKind::Text(text) => self.append(Node::Text(text)),
            TokenKind::Bind { name, paren } => self.append(Node::Bind { name, paren }),
            TokenKind::Embedded { name, quoted } => self.append(Node::Embedded { name, quoted }),
            TokenKind::If(expression) => self.open(
                Frame::Branch {
                    chain: Chain::default(),
                    condition: Some(expression),
                    span,
                    children: Vec::new(),
                },
                span,
            )?,
            TokenKind::ElseIf(expression) => {
                let chain = self.pop_branch("ELIF", span)?;
                self.stack.push(Frame::Branch {
                    chain,
                    condition: Some(expression),
                    span,
                    children: Vec::new(),
                });
            }
            TokenKind::Else => {
                let chain = self.pop_branch("ELSE", span)?;
                self.stack.push(Frame::Branch {
                    chain,
                    condition: None,
                    span,
                    children: Vec::new(),
                });
            }
            TokenKind::EndIf => {
                if matches!(self.stack.last(), Some(Frame::Begin { .. })) {
                    return Err(Self::error(span, StructuralErrorKind::UnmatchedEnd));
                }
                let chain = self.pop_branch("END", span)?;
                self.append(Node::Conditional {
                    branches: chain.branches,
                    otherwise: chain.otherwise,
                });
            }
            TokenKind::Begin => self.open(
                Frame::Begin {
                    span,
                    children: Vec::new(),
                },
                span,
            )?,
            TokenKind::EndBegin => {
                if !matches!(self.stack.last(), Some(Frame::Begin { .. })) {
                    return Err(Self::error(span, StructuralErrorKind::UnmatchedEnd));
                }
                if let Some(Frame::Begin { children, .. }) = self.stack.pop() {
                    self.append(Node::Begin(children));
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> SqlateResult<NodeTree> {
        match self.stack.pop() {
            Some(Frame::Root(children)) => {
                let root = self.alloc(Node::Container(children));
                Ok(NodeTree {
                    nodes: self.nodes,
                    root,
                })
            }
            Some(Frame::Branch { chain, span, .. }) => {
                // Report the IF that opened the chain, not the last ELIF/ELSE.
                let span = chain.branches.first().map_or(span, |branch| branch.span);
                Err(Self::error(span, StructuralErrorKind::Unterminated {
                    directive: "IF".to_owned(),
                }))
            }
            Some(Frame::Begin { span, .. }) => {
                Err(Self::error(span, StructuralErrorKind::Unterminated {
                    directive: "BEGIN".to_owned(),
                }))
            }
            None => Err(Self::error(Span::default(), StructuralErrorKind::UnmatchedEnd)),
        }
    }
}

/// Assembles a [`NodeTree`] from a token stream, validating directive nesting.
pub fn build<I>(tokens: I) -> SqlateResult<NodeTree>
where
    I: IntoIterator<Item = SqlateResult<Token>>,
{
    let mut builder = TreeBuilder::new();
    for token in tokens {
        builder.push(token?)?;
    }
    builder.finish()
}
