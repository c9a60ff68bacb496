/// How placeholders for bound values are written into the statement.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum PlaceholderStyle {
    /// `?`, as used by JDBC-style drivers, MySQL and SQLite.
    #[default]
    Question,
    /// `$1`, `$2`, ... as used by PostgreSQL.
    Numbered,
}

impl PlaceholderStyle {
    /// The placeholder for the bind value at `index` (0-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Question => "?".to_owned(),
            Self::Numbered => format!("${}", index.saturating_add(1)),
        }
    }
}

/// Settings shared by every transform an engine performs.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EngineConfig {
    pub placeholder: PlaceholderStyle,
    /// Record which conditional branches each transform takes.
    pub coverage: bool,
    /// Tidy clauses left dangling by untaken branches, e.g. `WHERE AND`.
    pub clause_cleanup: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_placeholder(mut self, placeholder: PlaceholderStyle) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub const fn with_coverage(mut self, coverage: bool) -> Self {
        self.coverage = coverage;
        self
    }

    pub const fn with_clause_cleanup(mut self, clause_cleanup: bool) -> Self {
        self.clause_cleanup = clause_cleanup;
        self
    }
}
