use std::sync::Arc;

use crate::ast::{Branch, Node, NodeId, NodeTree, Otherwise};
use crate::context::TransformContext;
use crate::coverage::BranchState;
use crate::SqlateResult;
use crate::error::SqlateError;
use crate::expression::{Condition, ExpressionEvaluator};
use crate::interface::Value;
use crate::mapper::{ValueMapper, map_bind, map_literal};

/// Where an `IF` chain ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainOutcome {
    Unresolved,
    Then,
    /// 1-based position among the `ELIF`s.
    ElseIf(usize),
    Else,
    NoneTaken,
}

/// Walks a [`NodeTree`] into a [`TransformContext`].
pub(crate) struct Walker<'t> {
    pub(crate) tree: &'t NodeTree,
    pub(crate) evaluator: &'t dyn ExpressionEvaluator,
    pub(crate) mappers: &'t [Arc<dyn ValueMapper>],
}

impl Walker<'_> {
    pub(crate) fn transform(&self, id: NodeId, ctx: &mut TransformContext<'_>) -> SqlateResult<()> {
        if !ctx.is_enabled() {
            return Ok(());
        }
        let Some(node) = self.tree.get(id) else {
            return Ok(());
        };

        match node {
            Node::Text(text) => ctx.push_text(text),
            Node::Bind { name, paren } => self.bind(name, *paren, ctx)?,
            Node::Embedded { name, quoted } => {
                if let Some(value) = ctx.resolve(name)? {
                    let literal = map_literal(self.mappers, value, *quoted);
                    ctx.push_text(&literal);
                }
            }
            Node::Container(children) => {
                for child in children {
                    self.transform(*child, ctx)?;
                }
            }
            Node::Conditional {
                branches,
                otherwise,
            } => self.conditional(branches, otherwise.as_ref(), ctx)?,
            Node::Begin(children) => {
                let mut scratch = ctx.scratch();
                for child in children {
                    self.transform(*child, &mut scratch)?;
                }
                ctx.absorb(scratch)?;
            }
        }
        Ok(())
    }

    fn bind(&self, name: &str, paren: bool, ctx: &mut TransformContext<'_>) -> SqlateResult<()> {
        let Some(value) = ctx.resolve(name)? else {
            return Ok(());
        };
        let value = map_bind(self.mappers, value);

        let Value::List(items) = value.as_ref() else {
            if paren {
                ctx.push_text("(");
            }
            ctx.push_bind(name, value.into_owned());
            if paren {
                ctx.push_text(")");
            }
            return Ok(());
        };

        if paren {
            ctx.push_text("(");
        }
        if items.is_empty() {
            ctx.push_text("NULL");
        }
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                ctx.push_text(", ");
            }
            let item = map_bind(self.mappers, item);
            ctx.push_bind(name, item.into_owned());
        }
        if paren {
            ctx.push_text(")");
        }
        Ok(())
    }

    fn conditional(
        &self,
        branches: &[Branch],
        otherwise: Option<&Otherwise>,
        ctx: &mut TransformContext<'_>,
    ) -> SqlateResult<()> {
        let mut outcome = ChainOutcome::Unresolved;
        for (position, branch) in branches.iter().enumerate() {
            if self.condition(&branch.expression, ctx)? {
                ctx.record_branch(branch.body, BranchState::Passed);
                outcome = if position == 0 {
                    ChainOutcome::Then
                } else {
                    ChainOutcome::ElseIf(position)
                };
                break;
            }
            ctx.record_branch(branch.body, BranchState::Failed);
        }
        if outcome == ChainOutcome::Unresolved {
            outcome = if otherwise.is_some() {
                ChainOutcome::Else
            } else {
                ChainOutcome::NoneTaken
            };
        }
        tracing::trace!(?outcome, "conditional resolved");

        let body = match outcome {
            ChainOutcome::Then => branches.first().map(|branch| branch.body),
            ChainOutcome::ElseIf(position) => branches.get(position).map(|branch| branch.body),
            ChainOutcome::Else => otherwise.map(|otherwise| otherwise.body),
            ChainOutcome::NoneTaken | ChainOutcome::Unresolved => None,
        };
        if let (ChainOutcome::Else, Some(body)) = (outcome, body) {
            ctx.record_branch(body, BranchState::Passed);
        }

        if let Some(body) = body {
            ctx.mark_live();
            ctx.enter(true);
            let result = self.transform(body, ctx);
            ctx.leave();
            result?;
        }
        Ok(())
    }

    fn condition(&self, condition: &Condition, ctx: &TransformContext<'_>) -> SqlateResult<bool> {
        let value = self.evaluator.evaluate_condition(condition, ctx.lookup())?;
        let expression = condition.as_str();
        let Value::Bool(result) = value else {
            return Err(SqlateError::EvaluationType {
                expression: expression.to_owned(),
                found: value.type_name().to_owned(),
            });
        };

        if tracing::enabled!(tracing::Level::DEBUG) && !matches!(expression.trim(), "true" | "false")
        {
            let parameters = self
                .evaluator
                .identifiers(expression)
                .iter()
                .map(|name| match ctx.lookup().get_path(name) {
                    Ok(Some(value)) => format!("{name}={value:?}"),
                    Ok(None) => format!("{name}=<absent>"),
                    Err(message) => format!("{name}=<{message}>"),
                })
                .collect::<Vec<_>>()
                .join(", ");
            tracing::debug!(
                expression,
                result,
                parameters = %parameters,
                "evaluated condition"
            );
        }

        Ok(result)
    }
}
