use std::sync::Arc;

use crate::config::EngineConfig;
use crate::context::{TransformContext, TransformedSql};
use crate::coverage::CoverageHandler;
use crate::SqlateResult;
use crate::expression::{DefaultEvaluator, ExpressionEvaluator};
use crate::interface::VariableLookup;
use crate::mapper::ValueMapper;
use crate::template::Template;
use crate::walker::Walker;

/// `SqlateEngine` turns parsed [`Template`]s into SQL text plus an ordered
/// bind list.
///
/// The engine holds only configuration and strategies (expression evaluator,
/// value mappers, coverage handler). It is `Send + Sync` and every transform
/// gets its own state, so one engine can serve many threads at once.
///
/// # Examples
///
/// ```
/// use sqlate::{Context, SqlateEngine, Value};
///
/// let engine = SqlateEngine::new();
///
/// let mut context = Context::new();
/// context.insert("id", 5);
///
/// let out = engine
///     .render(
///         "SELECT * FROM t WHERE 1=1 /*IF id != null*/AND id = /*id*/1/*END*/",
///         &context,
///     )
///     .unwrap();
/// assert_eq!(out.sql, "SELECT * FROM t WHERE 1=1 AND id = ?");
/// assert_eq!(out.binds[0].value, Value::Int(5));
/// ```
#[derive(Clone)]
pub struct SqlateEngine {
    config: EngineConfig,
    evaluator: Arc<dyn ExpressionEvaluator>,
    mappers: Vec<Arc<dyn ValueMapper>>,
    coverage_handler: Option<Arc<dyn CoverageHandler>>,
}

impl std::fmt::Debug for SqlateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlateEngine")
            .field("config", &self.config)
            .field("mappers", &self.mappers.len())
            .field("coverage_handler", &self.coverage_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl SqlateEngine {
    /// Creates an engine with the default configuration and the
    /// [`DefaultEvaluator`].
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            evaluator: Arc::new(DefaultEvaluator::new()),
            mappers: Vec::new(),
            coverage_handler: None,
        }
    }

    /// Replaces the evaluator used for branch conditions.
    #[must_use]
    pub fn with_evaluator<E: ExpressionEvaluator + 'static>(mut self, evaluator: E) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Appends a value mapper. Mappers are consulted in the order they were
    /// added; the first one to return a value wins.
    pub fn add_mapper<M: ValueMapper + 'static>(&mut self, mapper: M) -> &mut Self {
        self.mappers.push(Arc::new(mapper));
        self
    }

    /// Installs a handler that receives the branch coverage of every
    /// successful transform. Coverage is tracked whenever a handler is set.
    #[must_use]
    pub fn with_coverage_handler(mut self, handler: Arc<dyn CoverageHandler>) -> Self {
        self.coverage_handler = Some(handler);
        self
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parses a template. Equivalent to [`Template::new`].
    ///
    /// # Errors
    ///
    /// Returns `SqlateError::Parse` or `SqlateError::Structural` when the
    /// template is malformed.
    pub fn parse<S: Into<String>>(&self, source: S) -> SqlateResult<Template> {
        Template::new(source)
    }

    /// Transforms a parsed template against `lookup`.
    ///
    /// The template is never modified, so it stays usable after a failed
    /// transform.
    ///
    /// # Errors
    ///
    /// * `SqlateError::MissingParameter` if a bind or embedded variable is
    ///   absent from `lookup`.
    /// * `SqlateError::EvaluationType` if a branch condition is not a boolean.
    /// * `SqlateError::Evaluation` if a branch condition cannot be evaluated.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlate::{Context, SqlateEngine, SqlateError};
    ///
    /// let engine = SqlateEngine::new();
    /// let template = engine.parse("SELECT * FROM t WHERE id = :id").unwrap();
    ///
    /// let err = engine.transform(&template, &Context::new()).unwrap_err();
    /// assert!(matches!(err, SqlateError::MissingParameter { .. }));
    /// ```
    pub fn transform(
        &self,
        template: &Template,
        lookup: &dyn VariableLookup,
    ) -> SqlateResult<TransformedSql> {
        let track_coverage = self.config.coverage || self.coverage_handler.is_some();
        let mut ctx = TransformContext::new(lookup, track_coverage);

        let walker = Walker {
            tree: template.tree(),
            evaluator: self.evaluator.as_ref(),
            mappers: &self.mappers,
        };
        walker.transform(template.tree().root(), &mut ctx)?;

        let out = ctx.finish(self.config.placeholder, self.config.clause_cleanup);
        tracing::trace!(
            template = template.name().unwrap_or_default(),
            binds = out.binds.len(),
            "transformed template"
        );

        if let (Some(handler), Some(coverage)) = (&self.coverage_handler, &out.coverage) {
            handler.handle(template, coverage);
        }
        Ok(out)
    }

    /// Parses and transforms in one step.
    ///
    /// # Errors
    ///
    /// Any error from [`SqlateEngine::parse`] or [`SqlateEngine::transform`].
    pub fn render<S: Into<String>>(
        &self,
        source: S,
        lookup: &dyn VariableLookup,
    ) -> SqlateResult<TransformedSql> {
        let template = self.parse(source)?;
        self.transform(&template, lookup)
    }
}

impl Default for SqlateEngine {
    fn default() -> Self {
        Self::new()
    }
}
