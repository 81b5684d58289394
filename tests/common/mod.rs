// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

use fleet_updater::{Error, IssueSnapshot, IssueStore, Result, Revision, WriteOutcome};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// In-memory conditional issue store
///
/// Models the shared remote document with compare-and-swap semantics: every
/// committed write bumps a version counter used as the revision marker.
/// Conflicts can be forced permanently, and remote API errors can be
/// injected into conditional writes, to exercise the retry budget.
pub struct MemoryIssueStore {
    state: Mutex<DocumentState>,
    comments: Mutex<Vec<String>>,
    always_conflict: AtomicBool,
    write_errors: AtomicU32,
}

struct DocumentState {
    body: String,
    version: u64,
}

impl MemoryIssueStore {
    pub fn new(body: &str) -> Self {
        Self {
            state: Mutex::new(DocumentState {
                body: body.to_string(),
                version: 0,
            }),
            comments: Mutex::new(Vec::new()),
            always_conflict: AtomicBool::new(false),
            write_errors: AtomicU32::new(0),
        }
    }

    /// Make every conditional write report a conflict
    pub fn force_conflicts(&self) {
        self.always_conflict.store(true, Ordering::SeqCst);
    }

    /// Fail the next `count` conditional writes with a remote API error
    pub fn fail_next_writes(&self, count: u32) {
        self.write_errors.store(count, Ordering::SeqCst);
    }

    pub fn body(&self) -> String {
        self.state.lock().unwrap().body.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.lock().unwrap().version
    }

    pub fn comments(&self) -> Vec<String> {
        self.comments.lock().unwrap().clone()
    }
}

impl IssueStore for MemoryIssueStore {
    fn fetch(&self) -> Result<IssueSnapshot> {
        let state = self.state.lock().unwrap();
        Ok(IssueSnapshot {
            body: state.body.clone(),
            revision: Revision(state.version.to_string()),
        })
    }

    fn write_if_unchanged(&self, expected: &IssueSnapshot, body: &str) -> Result<WriteOutcome> {
        if self
            .write_errors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
        {
            return Err(Error::Api("HTTP 502 Bad Gateway".to_string()));
        }
        if self.always_conflict.load(Ordering::SeqCst) {
            return Ok(WriteOutcome::Conflict);
        }
        let mut state = self.state.lock().unwrap();
        if state.version.to_string() != expected.revision.0 {
            return Ok(WriteOutcome::Conflict);
        }
        state.body = body.to_string();
        state.version += 1;
        Ok(WriteOutcome::Committed)
    }

    fn post_comment(&self, body: &str) -> Result<()> {
        self.comments.lock().unwrap().push(body.to_string());
        Ok(())
    }
}
