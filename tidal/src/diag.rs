use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagState {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for DiagState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        })
    }
}

/// A diagnostic record reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    state: DiagState,
    sqlstate: String,
    native_code: i32,
    message: String,
    description: String,
}

impl Diagnostic {
    pub fn new(state: DiagState, sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            state,
            sqlstate: sqlstate.into(),
            native_code: 0,
            message: message.into(),
            description: String::new(),
        }
    }

    pub fn error(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagState::Error, sqlstate, message)
    }

    pub fn warning(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagState::Warning, sqlstate, message)
    }

    pub fn info(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagState::Info, sqlstate, message)
    }

    #[must_use]
    pub fn with_native_code(mut self, code: i32) -> Self {
        self.native_code = code;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn state(&self) -> DiagState {
        self.state
    }

    /// Five-character SQLSTATE code.
    pub fn sqlstate(&self) -> &str {
        &self.sqlstate
    }

    /// Engine-specific error code, 0 if the engine has none.
    pub fn native_code(&self) -> i32 {
        self.native_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.sqlstate, self.message)?;
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        Ok(())
    }
}

/// Queue of diagnostic records attached to a connection or statement.
#[derive(Debug, Default)]
pub struct Diagnostics(VecDeque<Diagnostic>);

impl Diagnostics {
    pub fn avail(&self) -> bool {
        !self.0.is_empty()
    }

    /// Removes and returns the oldest record.
    pub fn fetch(&mut self) -> Option<Diagnostic> {
        self.0.pop_front()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push_back(diagnostic);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

/// An error reported by an engine, with the statement text that caused it.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "{diagnostic}{}",
    .sql.as_ref().map(|sql| format!(" (while executing {sql:?})")).unwrap_or_default()
)]
pub struct EngineError {
    diagnostic: Diagnostic,
    sql: Option<String>,
}

impl EngineError {
    pub fn new(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostic,
            sql: None,
        }
    }

    /// Attaches the statement text unless one is already present.
    #[must_use]
    pub fn with_sql(mut self, sql: &str) -> Self {
        if self.sql.is_none() {
            self.sql = Some(sql.to_owned());
        }
        self
    }

    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    pub fn sqlstate(&self) -> &str {
        self.diagnostic.sqlstate()
    }

    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }
}

impl From<Diagnostic> for EngineError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::new(diagnostic)
    }
}
