//! Observable state of a query or mutation.

use crate::error::QueryError;

/// Where a request currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not started, or disabled.
    #[default]
    Idle,
    /// Fetching with no data produced yet.
    Loading,
    /// Fetching in the background while earlier data stays visible.
    Fetching,
    /// The last attempt chain succeeded.
    Success,
    /// The last attempt chain failed terminally.
    Error,
}

/// State of a single query or mutation consumer.
///
/// Owned by its consumer and only written by that consumer's executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    pub data: Option<T>,
    pub error: Option<QueryError>,
    pub phase: Phase,
    pub retry_count: u32,
}

pub type QueryState<T> = RequestState<T>;
pub type MutationState<T> = RequestState<T>;

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            phase: Phase::Idle,
            retry_count: 0,
        }
    }
}

impl<T> RequestState<T> {
    /// State seeded with data that is shown before the first fetch completes.
    pub fn with_initial_data(data: T) -> Self {
        Self {
            data: Some(data),
            phase: Phase::Success,
            ..Self::default()
        }
    }

    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub const fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// `true` only while fetching without any data to show.
    pub const fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading)
    }

    /// `true` while any attempt chain is running.
    pub const fn is_fetching(&self) -> bool {
        matches!(self.phase, Phase::Loading | Phase::Fetching)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.phase, Phase::Success)
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.phase, Phase::Error)
    }

    pub(crate) fn begin(&mut self) {
        self.phase = if self.data.is_some() {
            Phase::Fetching
        } else {
            Phase::Loading
        };
        self.retry_count = 0;
    }

    pub(crate) fn succeed(&mut self, data: Option<T>) {
        self.data = data;
        self.error = None;
        self.phase = Phase::Success;
        self.retry_count = 0;
    }

    pub(crate) fn fail(&mut self, error: QueryError) {
        self.error = Some(error);
        self.phase = Phase::Error;
    }
}
