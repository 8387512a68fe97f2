use crate::types::SourceSpan;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("{code}: {message}")]
pub struct TagRunError {
    pub code: String,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl TagRunError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(code: impl Into<String>, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: Some(span),
        }
    }

    /// Attaches `span` unless the error already points somewhere more specific.
    pub fn at(mut self, span: &SourceSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span.clone());
        }
        self
    }
}
