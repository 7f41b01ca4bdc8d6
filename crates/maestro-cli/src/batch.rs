//! Subcommand: `maestro batch` -- route many sessions at once.
//!
//! Input is JSON lines, `{"session": "...", "request": "..."}`. Requests
//! are grouped by session; each session gets its own tokio task that owns
//! its conversation context and processes its requests in input order.
//! The selector is shared read-only between tasks. Results are written as
//! JSON lines in the order of the input.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use maestro_kernel::{ExpertSelector, Selection};
use maestro_store::SessionStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::runtime::{App, Session};

/// One input line.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    pub session: String,
    pub request: String,
}

/// One output line.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    /// 1-based input line number.
    pub line: usize,
    pub session: String,
    pub request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn cmd_batch(app: &App, input: &str) -> Result<()> {
    let requests = if input == "-" {
        read_requests(io::stdin().lock())?
    } else {
        let file = std::fs::File::open(input)
            .with_context(|| format!("failed to open batch input {input}"))?;
        read_requests(BufReader::new(file))?
    };
    info!(requests = requests.len(), "batch loaded");

    let results = run_batch(Arc::clone(&app.selector), app.store_handle(), requests).await?;
    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }
    Ok(())
}

/// Parse JSON lines, skipping blank ones. Malformed lines abort the batch.
pub fn read_requests(reader: impl BufRead) -> Result<Vec<(usize, BatchRequest)>> {
    let mut requests = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("failed to read batch line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let request: BatchRequest = serde_json::from_str(&line)
            .with_context(|| format!("batch line {line_no} is not a valid request"))?;
        if request.session.trim().is_empty() {
            bail!("batch line {line_no} has an empty session id");
        }
        requests.push((line_no, request));
    }
    Ok(requests)
}

/// Process every session concurrently and return results in input order.
pub async fn run_batch(
    selector: Arc<ExpertSelector>,
    store: Option<SessionStore>,
    requests: Vec<(usize, BatchRequest)>,
) -> Result<Vec<BatchResult>> {
    let mut by_session: BTreeMap<String, Vec<(usize, String)>> = BTreeMap::new();
    for (line, req) in requests {
        by_session
            .entry(req.session)
            .or_default()
            .push((line, req.request));
    }

    let mut handles = Vec::with_capacity(by_session.len());
    for (session_id, items) in by_session {
        let selector = Arc::clone(&selector);
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            run_session(&selector, store, session_id, items).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.extend(handle.await.context("batch worker panicked")??);
    }
    results.sort_by_key(|r| r.line);
    Ok(results)
}

/// Sequentially route one session's requests.
async fn run_session(
    selector: &ExpertSelector,
    store: Option<SessionStore>,
    session_id: String,
    items: Vec<(usize, String)>,
) -> Result<Vec<BatchResult>> {
    let mut session = Session::open(selector, store, Some(&session_id)).await?;
    debug!(session = %session_id, requests = items.len(), "batch worker started");

    let mut results = Vec::with_capacity(items.len());
    for (line, request) in items {
        let (selection, error) = match session.select(selector, &request).await {
            Ok(selection) => (Some(selection), None),
            Err(err) => (None, Some(format!("{err:#}"))),
        };
        results.push(BatchResult {
            line,
            session: session_id.clone(),
            request,
            selection,
            error,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use maestro_kernel::{RuleTable, SelectorConfig};

    use super::*;

    fn selector() -> Arc<ExpertSelector> {
        Arc::new(
            ExpertSelector::new(RuleTable::builtin().unwrap(), SelectorConfig::default()).unwrap(),
        )
    }

    fn line(no: usize, session: &str, request: &str) -> (usize, BatchRequest) {
        let request = BatchRequest {
            session: session.into(),
            request: request.into(),
        };
        (no, request)
    }

    #[test]
    fn blank_lines_are_skipped_and_numbers_kept() {
        let input = "{\"session\":\"a\",\"request\":\"react\"}\n\n\
                     {\"session\":\"b\",\"request\":\"jest\"}\n";
        let parsed = read_requests(input.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, 1);
        assert_eq!(parsed[1].0, 3);
    }

    #[test]
    fn malformed_line_names_its_number() {
        let input = "{\"session\":\"a\",\"request\":\"react\"}\nnot json\n";
        let err = read_requests(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn sessions_keep_their_own_context() {
        let requests = vec![
            line(1, "a", "React hooks question"),
            line(2, "b", "python service"),
            line(3, "a", ""),
            line(4, "a", "asdkjfh qwoeiru"),
        ];

        let results = run_batch(selector(), None, requests).await.unwrap();
        let lines: Vec<_> = results.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);

        assert_eq!(results[0].selection.as_ref().unwrap().primary, "react-expert");
        assert_eq!(results[1].selection.as_ref().unwrap().primary, "python-expert");
        assert!(results[2].selection.is_none());
        assert!(results[2].error.is_some());
        assert!(results[3].selection.as_ref().unwrap().is_fallback());
    }
}
