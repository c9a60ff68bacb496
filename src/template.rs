use crate::ast::{Node, NodeTree};
use crate::builder::build;
use crate::coverage::{BranchInfo, BranchKind, Coverage, CoverageReport};
use crate::SqlateResult;
use crate::interface::VariableLookup;
use crate::scanner::Scanner;

/// A parsed SQL template.
///
/// Parsing happens once; the resulting tree is immutable, so a `Template` can
/// be shared between threads (e.g. behind an `Arc`) and transformed any number
/// of times with different parameters.
///
/// # Example
///
/// ```rust
/// use sqlate::{Context, SqlateEngine, Template};
///
/// let template = Template::new("SELECT * FROM t WHERE id = /*id*/1").unwrap();
/// assert_eq!(template.parameters(), vec!["id"]);
///
/// let mut context = Context::new();
/// context.insert("id", 7);
///
/// let out = SqlateEngine::new().transform(&template, &context).unwrap();
/// assert_eq!(out.sql, "SELECT * FROM t WHERE id = ?");
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: Option<String>,
    source: String,
    #[cfg_attr(feature = "serde", serde(skip))]
    tree: NodeTree,
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct TemplateHelper {
            #[serde(default)]
            name: Option<String>,
            source: String,
        }

        let helper = TemplateHelper::deserialize(deserializer)?;
        let mut template = Self::new(helper.source)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse template: {e}")))?;
        template.name = helper.name;
        Ok(template)
    }
}

impl Template {
    /// Parses `source` into a template.
    ///
    /// # Errors
    ///
    /// * `SqlateError::Parse` for malformed directives, unterminated comments
    ///   or string literals.
    /// * `SqlateError::Structural` for directives that are not properly nested.
    pub fn new<S: Into<String>>(source: S) -> SqlateResult<Self> {
        let source = source.into();
        let tree = build(Scanner::new(&source))?;
        tracing::trace!(nodes = tree.len(), "parsed template");
        Ok(Self {
            name: None,
            source,
            tree,
        })
    }

    /// Parses `source` into a template carrying a name, which coverage
    /// collection uses as its key.
    ///
    /// # Errors
    ///
    /// Same as [`Template::new`].
    pub fn named<N: Into<String>, S: Into<String>>(name: N, source: S) -> SqlateResult<Self> {
        let mut template = Self::new(source)?;
        template.name = Some(name.into());
        Ok(template)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub const fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Every bind and embedded variable name, in source order, without
    /// duplicates. Names in every branch are listed, taken or not.
    ///
    /// # Example
    ///
    /// ```
    /// use sqlate::Template;
    ///
    /// let template =
    ///     Template::new("SELECT /*$cols*/id FROM t /*IF id != null*/WHERE id = :id/*END*/").unwrap();
    /// assert_eq!(template.parameters(), vec!["cols", "id"]);
    /// ```
    pub fn parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        self.tree.walk(self.tree.root(), &mut |_, node| {
            if let Node::Bind { name, .. } | Node::Embedded { name, .. } = node {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
        });
        names
    }

    /// The parameters a lookup cannot resolve.
    ///
    /// Only a hint: a parameter inside an untaken branch or a `BEGIN` block
    /// does not need to be present for a transform to succeed.
    pub fn missing_parameters(&self, lookup: &dyn VariableLookup) -> Vec<&str> {
        self.parameters()
            .into_iter()
            .filter(|name| {
                if name.contains('.') {
                    !matches!(lookup.get_path(name), Ok(Some(_)))
                } else {
                    !lookup.has_value(name)
                }
            })
            .collect()
    }

    /// Every branch of every conditional, ordered by position in the source.
    pub fn branches(&self) -> Vec<BranchInfo> {
        let mut branches = Vec::new();
        self.tree.walk(self.tree.root(), &mut |_, node| {
            let Node::Conditional {
                branches: chain,
                otherwise,
            } = node
            else {
                return;
            };
            for (position, branch) in chain.iter().enumerate() {
                branches.push(BranchInfo {
                    id: branch.body,
                    kind: if position == 0 {
                        BranchKind::If
                    } else {
                        BranchKind::ElseIf
                    },
                    expression: Some(branch.expression.to_string()),
                    span: branch.span,
                });
            }
            if let Some(otherwise) = otherwise {
                branches.push(BranchInfo {
                    id: otherwise.body,
                    kind: BranchKind::Else,
                    expression: None,
                    span: otherwise.span,
                });
            }
        });
        branches.sort_by_key(|branch| branch.span);
        branches
    }

    /// Pairs [`Template::branches`] with the outcomes recorded in `coverage`.
    pub fn coverage_report(&self, coverage: &Coverage) -> CoverageReport {
        CoverageReport::new(self.branches(), coverage)
    }
}

impl std::str::FromStr for Template {
    type Err = crate::error::SqlateError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::new(source)
    }
}
