//! Observable query state.

use crate::clock::EpochMillis;

/// Lifecycle of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// Never fetched.
    #[default]
    Idle,
    /// First fetch in progress, no data yet.
    Loading,
    Success,
    Error,
}

/// Snapshot published to query subscribers.
///
/// `data` survives a failed refetch, so consumers can keep showing the last
/// good value next to the error.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub status: QueryStatus,
    pub data: Option<T>,
    pub error: Option<String>,
    pub updated_at: Option<EpochMillis>,
    /// A fetch is running, including background refetches.
    pub is_fetching: bool,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            is_fetching: false,
        }
    }
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub(crate) fn start_fetch(&mut self) {
        self.is_fetching = true;
        if self.data.is_none() {
            self.status = QueryStatus::Loading;
        }
    }

    pub(crate) fn succeed(&mut self, data: T, at: EpochMillis) {
        self.status = QueryStatus::Success;
        self.data = Some(data);
        self.error = None;
        self.updated_at = Some(at);
        self.is_fetching = false;
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.status = QueryStatus::Error;
        self.error = Some(error);
        self.is_fetching = false;
    }

    /// A cancelled fetch leaves the previous outcome in place.
    pub(crate) fn abandon(&mut self) {
        self.is_fetching = false;
        if self.status == QueryStatus::Loading {
            self.status = QueryStatus::Idle;
        }
    }

    /// The result as a `Result`, for callers that only want the outcome.
    pub fn into_result(self) -> Result<T, String> {
        match (self.data, self.error, self.status) {
            (_, Some(error), QueryStatus::Error) => Err(error),
            (Some(data), _, _) => Ok(data),
            _ => Err("query has not completed".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_only_without_data() {
        let mut state: QueryState<u32> = QueryState::default();
        state.start_fetch();
        assert!(state.is_loading());

        state.succeed(1, 10);
        state.start_fetch();
        assert!(state.is_success());
        assert!(state.is_fetching);
    }

    #[test]
    fn test_failure_keeps_data() {
        let mut state = QueryState::default();
        state.succeed(5u32, 10);
        state.fail("boom".into());
        assert!(state.is_error());
        assert_eq!(state.data, Some(5));
        assert_eq!(state.into_result(), Err("boom".to_string()));
    }

    #[test]
    fn test_abandon_restores_idle() {
        let mut state: QueryState<u32> = QueryState::default();
        state.start_fetch();
        state.abandon();
        assert_eq!(state.status, QueryStatus::Idle);
        assert!(!state.is_fetching);
    }
}
