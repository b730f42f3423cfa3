//! Observability collaborator receiving pagination failures

use crate::{
    core::error::{Operation, PagerError},
    domain::ConversationId,
};

/// Receives every non-cancelled failure exactly once
pub trait ErrorReporter: Send + Sync {
    fn report(
        &self,
        operation: Operation,
        conversation_id: Option<&ConversationId>,
        error: &PagerError,
    );
}

/// Reports failures as structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(
        &self,
        operation: Operation,
        conversation_id: Option<&ConversationId>,
        error: &PagerError,
    ) {
        tracing::error!(
            operation = %operation,
            conversation_id = conversation_id.map(|id| id.as_str()),
            retryable = error.is_retryable(),
            "{error}"
        );
    }
}
