use crate::ast::NodeId;
use crate::cleanup::clean_clauses;
use crate::config::PlaceholderStyle;
use crate::coverage::{BranchState, Coverage};
use crate::SqlateResult;
use crate::error::SqlateError;
use crate::interface::{Value, VariableLookup};

static NULL: Value = Value::Null;

/// A piece of the statement under construction. Placeholders are numbered
/// only once the whole statement is known.
#[derive(Debug, Clone, PartialEq)]
enum Fragment {
    Text(String),
    Placeholder,
}

/// One entry of the bind list, in placeholder order.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BindParameter {
    pub name: String,
    pub value: Value,
}

impl BindParameter {
    pub fn new<N: Into<String>>(name: N, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The result of transforming a template: statement text plus the values for
/// its placeholders, ready to hand to a driver.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedSql {
    pub sql: String,
    pub binds: Vec<BindParameter>,
    /// Present when the engine tracks coverage.
    pub coverage: Option<Coverage>,
}

impl TransformedSql {
    /// The bound values alone, in placeholder order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.binds.iter().map(|bind| &bind.value)
    }
}

/// Mutable state for a single transform.
///
/// Created per invocation and consumed by [`TransformContext::finish`]; the
/// tree being walked never sees it.
pub(crate) struct TransformContext<'a> {
    lookup: &'a dyn VariableLookup,
    fragments: Vec<Fragment>,
    binds: Vec<BindParameter>,
    enabled: Vec<bool>,
    coverage: Option<Coverage>,
    /// Inside a `BEGIN` block: absent names are recorded instead of failing.
    optional: bool,
    /// Whether any reached variable resolved to a present value, or a branch
    /// was entered.
    resolved: bool,
    absent: Vec<String>,
}

impl<'a> TransformContext<'a> {
    pub(crate) fn new(lookup: &'a dyn VariableLookup, track_coverage: bool) -> Self {
        Self {
            lookup,
            fragments: Vec::new(),
            binds: Vec::new(),
            enabled: vec![true],
            coverage: track_coverage.then(Coverage::new),
            optional: false,
            resolved: false,
            absent: Vec::new(),
        }
    }

    pub(crate) fn lookup(&self) -> &'a dyn VariableLookup {
        self.lookup
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.last().copied().unwrap_or(false)
    }

    pub(crate) fn enter(&mut self, enabled: bool) {
        let enabled = enabled && self.is_enabled();
        self.enabled.push(enabled);
    }

    pub(crate) fn leave(&mut self) {
        if self.enabled.len() > 1 {
            self.enabled.pop();
        }
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        if !self.is_enabled() || text.is_empty() {
            return;
        }
        if let Some(Fragment::Text(last)) = self.fragments.last_mut() {
            last.push_str(text);
        } else {
            self.fragments.push(Fragment::Text(text.to_owned()));
        }
    }

    pub(crate) fn push_bind(&mut self, name: &str, value: Value) {
        if !self.is_enabled() {
            return;
        }
        self.fragments.push(Fragment::Placeholder);
        self.binds.push(BindParameter::new(name, value));
    }

    pub(crate) fn record_branch(&mut self, branch: NodeId, state: BranchState) {
        if let Some(coverage) = &mut self.coverage {
            coverage.record(branch, state);
        }
    }

    /// Keeps the enclosing `BEGIN` block, if any, from being discarded.
    pub(crate) fn mark_live(&mut self) {
        self.resolved = true;
    }

    /// Looks up a bind or embedded variable.
    ///
    /// A name with a null entry resolves to null. An absent name is an error,
    /// except inside a `BEGIN` block where it yields `None` and is settled
    /// when the block ends.
    pub(crate) fn resolve(&mut self, name: &str) -> SqlateResult<Option<&'a Value>> {
        let lookup = self.lookup;
        let value = if name.contains('.') {
            lookup
                .get_path(name)
                .map_err(|message| SqlateError::evaluation(name, message))?
        } else if lookup.has_value(name) {
            Some(lookup.get_value(name).unwrap_or(&NULL))
        } else {
            None
        };

        match value {
            Some(value) => {
                self.resolved = true;
                Ok(Some(value))
            }
            None if self.optional => {
                if !self.absent.iter().any(|absent| absent == name) {
                    self.absent.push(name.to_owned());
                }
                Ok(None)
            }
            None => Err(SqlateError::missing(name)),
        }
    }

    /// A fresh context for the body of a `BEGIN` block. Coverage moves into the
    /// scratch context and comes back through [`Self::absorb`].
    pub(crate) fn scratch(&mut self) -> Self {
        Self {
            lookup: self.lookup,
            fragments: Vec::new(),
            binds: Vec::new(),
            enabled: vec![self.is_enabled()],
            coverage: self.coverage.take(),
            optional: true,
            resolved: false,
            absent: Vec::new(),
        }
    }

    /// Settles a finished `BEGIN` block: commit it if something resolved or a
    /// branch was entered, drop it otherwise.
    pub(crate) fn absorb(&mut self, scratch: Self) -> SqlateResult<()> {
        let Self {
            fragments,
            binds,
            coverage,
            resolved,
            absent,
            ..
        } = scratch;
        self.coverage = coverage;

        if !resolved {
            tracing::trace!(
                fragments = fragments.len(),
                binds = binds.len(),
                "discarding optional block"
            );
            return Ok(());
        }
        if let Some(name) = absent.into_iter().next() {
            return Err(SqlateError::missing(name));
        }

        self.resolved = true;
        for fragment in fragments {
            match fragment {
                Fragment::Text(text) => self.push_text(&text),
                Fragment::Placeholder => self.fragments.push(Fragment::Placeholder),
            }
        }
        self.binds.extend(binds);
        Ok(())
    }

    pub(crate) fn finish(self, style: PlaceholderStyle, clause_cleanup: bool) -> TransformedSql {
        let mut sql = String::new();
        let mut index = 0_usize;
        for fragment in self.fragments {
            match fragment {
                Fragment::Text(text) => sql.push_str(&text),
                Fragment::Placeholder => {
                    sql.push_str(&style.placeholder(index));
                    index = index.saturating_add(1);
                }
            }
        }

        if clause_cleanup {
            sql = clean_clauses(&sql).into_owned();
        }

        TransformedSql {
            sql,
            binds: self.binds,
            coverage: self.coverage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::Context;

    #[test]
    #[ntest::timeout(100)]
    fn test_adjacent_text_is_merged() {
        let context = Context::new();
        let mut ctx = TransformContext::new(&context, false);
        ctx.push_text("SELECT ");
        ctx.push_text("1");
        assert_eq!(ctx.fragments, vec![Fragment::Text("SELECT 1".to_string())]);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_disabled_context_emits_nothing() {
        let context = Context::new();
        let mut ctx = TransformContext::new(&context, false);
        ctx.enter(false);
        ctx.push_text("hidden");
        ctx.push_bind("a", Value::Int(1));
        ctx.enter(true);
        ctx.push_text("still hidden");
        ctx.leave();
        ctx.leave();
        ctx.push_text("shown");

        let out = ctx.finish(PlaceholderStyle::Question, false);
        assert_eq!(out.sql, "shown");
        assert!(out.binds.is_empty());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_numbered_placeholders() {
        let context = Context::new();
        let mut ctx = TransformContext::new(&context, false);
        ctx.push_text("a = ");
        ctx.push_bind("a", Value::Int(1));
        ctx.push_text(" AND b = ");
        ctx.push_bind("b", Value::Int(2));

        let out = ctx.finish(PlaceholderStyle::Numbered, false);
        assert_eq!(out.sql, "a = $1 AND b = $2");
        assert_eq!(out.binds[1], BindParameter::new("b", Value::Int(2)));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_null_entry_is_present() {
        let mut context = Context::new();
        context.insert("a", Value::Null);
        let mut ctx = TransformContext::new(&context, false);
        assert_eq!(ctx.resolve("a").unwrap(), Some(&Value::Null));
        assert!(matches!(
            ctx.resolve("b"),
            Err(SqlateError::MissingParameter { ref name }) if name == "b"
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_scratch_discard_and_commit() {
        let mut context = Context::new();
        context.insert("a", 1);
        let mut ctx = TransformContext::new(&context, false);

        let mut scratch = ctx.scratch();
        scratch.push_text("WHERE b = ");
        assert_eq!(scratch.resolve("b").unwrap(), None);
        ctx.absorb(scratch).unwrap();
        assert!(ctx.fragments.is_empty());

        let mut scratch = ctx.scratch();
        scratch.push_text("WHERE a = ");
        let value = scratch.resolve("a").unwrap().cloned().unwrap();
        scratch.push_bind("a", value);
        ctx.absorb(scratch).unwrap();

        let out = ctx.finish(PlaceholderStyle::Question, false);
        assert_eq!(out.sql, "WHERE a = ?");
        assert_eq!(out.binds.len(), 1);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_partial_block_reports_first_absent_name() {
        let mut context = Context::new();
        context.insert("a", 1);
        let mut ctx = TransformContext::new(&context, false);

        let mut scratch = ctx.scratch();
        assert_eq!(scratch.resolve("x").unwrap(), None);
        assert!(scratch.resolve("a").unwrap().is_some());
        assert_eq!(scratch.resolve("y").unwrap(), None);
        assert!(matches!(
            ctx.absorb(scratch),
            Err(SqlateError::MissingParameter { ref name }) if name == "x"
        ));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_live_block_without_variables_is_kept() {
        let context = Context::new();
        let mut ctx = TransformContext::new(&context, false);

        let mut scratch = ctx.scratch();
        scratch.push_text("WHERE active = 1");
        scratch.mark_live();
        ctx.absorb(scratch).unwrap();

        let out = ctx.finish(PlaceholderStyle::Question, false);
        assert_eq!(out.sql, "WHERE active = 1");
        assert!(out.binds.is_empty());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_coverage_survives_scratch() {
        let context = Context::new();
        let mut ctx = TransformContext::new(&context, true);
        let mut scratch = ctx.scratch();
        scratch.record_branch(NodeId(3), BranchState::Passed);
        ctx.absorb(scratch).unwrap();

        let out = ctx.finish(PlaceholderStyle::Question, false);
        assert!(out.coverage.unwrap().passed(NodeId(3)));
    }
}
