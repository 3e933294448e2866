//! Testing helpers: an in-memory [`Connection`] returning canned results.

use std::{
    collections::HashMap,
    future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures_util::{future::BoxFuture, stream, FutureExt, StreamExt};

use crate::{
    connection::{Connection, RowStream},
    error::{QueryError, ScrapeError},
    row::Row,
};

#[derive(Debug, Clone)]
enum Step {
    Row(Row),
    Fail(String),
    Sleep(Duration),
    Hang,
}

#[derive(Debug, Default)]
struct CursorStats {
    opened: usize,
    released: usize,
}

type SharedStats = Arc<Mutex<HashMap<String, CursorStats>>>;

/// Decrements the number of open cursors for a query when dropped.
#[derive(Debug)]
struct CursorGuard {
    stats: SharedStats,
    query: String,
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.entry(self.query.clone()).or_default().released += 1;
    }
}

/// Mock [`Connection`] returning canned results for each query.
///
/// Queries are matched by their exact text; an unknown query fails. The mock counts opened
/// and released cursors per query, so that tests can check that a cursor is released exactly once.
/// Clones share these counters.
#[derive(Debug, Clone)]
pub struct MockConnection {
    version: Result<String, String>,
    responses: HashMap<String, Vec<Step>>,
    stats: SharedStats,
}

impl MockConnection {
    /// Creates a mock reporting the specified server version.
    pub fn new(version: &str) -> Self {
        Self {
            version: Ok(version.to_owned()),
            responses: HashMap::new(),
            stats: SharedStats::default(),
        }
    }

    /// Makes the server version query fail with the specified message.
    #[must_use]
    pub fn with_version_error(mut self, message: &str) -> Self {
        self.version = Err(message.to_owned());
        self
    }

    fn with_steps(mut self, query: &str, steps: Vec<Step>) -> Self {
        self.responses.insert(query.to_owned(), steps);
        self
    }

    /// Makes `query` return the specified rows.
    #[must_use]
    pub fn with_rows(self, query: &str, rows: Vec<Row>) -> Self {
        self.with_steps(query, rows.into_iter().map(Step::Row).collect())
    }

    /// Makes `query` fail before returning any rows.
    #[must_use]
    pub fn with_failure(self, query: &str, message: &str) -> Self {
        self.with_steps(query, vec![Step::Fail(message.to_owned())])
    }

    /// Makes `query` return the specified rows and then fail fetching the next one.
    #[must_use]
    pub fn with_failure_after(self, query: &str, rows: Vec<Row>, message: &str) -> Self {
        let steps = rows
            .into_iter()
            .map(Step::Row)
            .chain([Step::Fail(message.to_owned())])
            .collect();
        self.with_steps(query, steps)
    }

    /// Makes `query` return the specified rows after a `delay`.
    #[must_use]
    pub fn with_delay(self, query: &str, delay: Duration, rows: Vec<Row>) -> Self {
        let steps = [Step::Sleep(delay)]
            .into_iter()
            .chain(rows.into_iter().map(Step::Row))
            .collect();
        self.with_steps(query, steps)
    }

    /// Makes `query` never return.
    #[must_use]
    pub fn with_hang(self, query: &str) -> Self {
        self.with_steps(query, vec![Step::Hang])
    }

    /// Returns the number of times `query` was executed.
    pub fn opened_cursors(&self, query: &str) -> usize {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(query).map_or(0, |stats| stats.opened)
    }

    /// Returns the number of times the result cursor for `query` was released.
    pub fn released_cursors(&self, query: &str) -> usize {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(query).map_or(0, |stats| stats.released)
    }

    fn open_cursor(&self, query: &str) -> CursorGuard {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.entry(query.to_owned()).or_default().opened += 1;
        CursorGuard {
            stats: self.stats.clone(),
            query: query.to_owned(),
        }
    }
}

impl Connection for MockConnection {
    fn server_version(&self) -> BoxFuture<'_, Result<String, QueryError>> {
        let version = self.version.clone().map_err(QueryError::new);
        future::ready(version).boxed()
    }

    fn query<'a>(&'a self, sql: &'a str) -> RowStream<'a> {
        let steps = self
            .responses
            .get(sql)
            .cloned()
            .unwrap_or_else(|| vec![Step::Fail(format!("unexpected query: {sql}"))]);
        let guard = self.open_cursor(sql);

        stream::unfold((steps.into_iter(), guard), |(mut steps, guard)| async move {
            loop {
                match steps.next()? {
                    Step::Row(row) => return Some((Ok(row), (steps, guard))),
                    Step::Fail(message) => {
                        let err = ScrapeError::Query(QueryError::new(message));
                        return Some((Err(err), (steps, guard)));
                    }
                    Step::Sleep(delay) => tokio::time::sleep(delay).await,
                    Step::Hang => future::pending::<()>().await,
                }
            }
        })
        .boxed()
    }
}
