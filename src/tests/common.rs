use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range, Url};

use crate::client::ProverClient;
use crate::error::{Error, Result};
use crate::goal::{GoalConfig, GoalSnapshot};
use crate::proof_file::{ProofFile, ProofFileConfig};
use crate::term::Term;

/// A deterministic in-process prover.
///
/// Verification is textual: any line containing `invalid` fails, and a
/// line using `reduce_eq.` fails unless the text still declares
/// `Ltac reduce_eq`, which simulates a dangling reference after a
/// deletion.
pub struct FakeProver {
    state: RwLock<HashMap<Url, (String, i32)>>,

    /// Every `change` submission in order, with its version. Rollback
    /// tests read this to see the compensating re-submission.
    pub changes: RwLock<Vec<(i32, String)>>,

    /// When set, the next diagnostics wait never answers, once.
    pub hang_once: AtomicBool,

    /// When set, the next `goals_at` never answers, once.
    pub hang_goals_once: AtomicBool,

    /// When set, the next `goals_at` answers with a stale version tag,
    /// once.
    pub stale_once: AtomicBool,

    /// While set, every `locate` call fails with a client error.
    pub fail_locate: AtomicBool,

    /// What `locate` answers, keyed by notation pattern.
    pub located: RwLock<HashMap<String, Term>>,
}

impl FakeProver {
    pub fn new() -> Arc<FakeProver> {
        init_tracing();
        Arc::new(FakeProver {
            state: RwLock::new(HashMap::new()),
            changes: RwLock::new(Vec::new()),
            hang_once: AtomicBool::new(false),
            hang_goals_once: AtomicBool::new(false),
            stale_once: AtomicBool::new(false),
            fail_locate: AtomicBool::new(false),
            located: RwLock::new(HashMap::new()),
        })
    }

    pub async fn change_count(&self) -> usize {
        self.changes.read().await.len()
    }

    pub async fn last_change(&self) -> Option<(i32, String)> {
        self.changes.read().await.last().cloned()
    }

    fn check(text: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let declares_tactic = text.contains("Ltac reduce_eq");
        for (i, line) in text.lines().enumerate() {
            let broken = line.contains("invalid")
                || (line.contains("reduce_eq.") && !line.contains("Ltac") && !declares_tactic);
            if broken {
                let start = line.len() - line.trim_start().len();
                diagnostics.push(Diagnostic {
                    range: Range {
                        start: Position::new(i as u32, start as u32),
                        end: Position::new(i as u32, line.len() as u32),
                    },
                    severity: Some(DiagnosticSeverity::ERROR),
                    message: format!("cannot verify: {}", line.trim()),
                    ..Diagnostic::default()
                });
            }
        }
        diagnostics
    }
}

#[async_trait::async_trait]
impl ProverClient for FakeProver {
    async fn open(&self, uri: Url, text: String) -> Result<i32> {
        self.state.write().await.insert(uri, (text, 1));
        Ok(1)
    }

    async fn change(&self, uri: Url, version: i32, text: String) -> Result<()> {
        self.changes.write().await.push((version, text.clone()));
        self.state.write().await.insert(uri, (text, version));
        Ok(())
    }

    async fn diagnostics_for(&self, uri: Url, _version: i32) -> Result<Vec<Diagnostic>> {
        if self.hang_once.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let state = self.state.read().await;
        let text = state.get(&uri).map(|(text, _)| text.clone()).unwrap_or_default();
        Ok(FakeProver::check(&text))
    }

    async fn goals_at(&self, _uri: Url, version: i32, position: Position) -> Result<GoalSnapshot> {
        if self.hang_goals_once.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let version = if self.stale_once.swap(false, Ordering::SeqCst) {
            version - 1
        } else {
            version
        };
        Ok(GoalSnapshot::new(version, position, GoalConfig::default()))
    }

    async fn locate(&self, pattern: String, _scope: String) -> Result<Option<Term>> {
        if self.fail_locate.load(Ordering::SeqCst) {
            return Err(Error::client("locate is unavailable"));
        }
        Ok(self.located.read().await.get(&pattern).cloned())
    }

    async fn close(&self, _uri: Url) -> Result<()> {
        Ok(())
    }
}

/// A proof file opened on a temp-dir copy of `content`, backed by a
/// `FakeProver`. Keep the fixture alive for as long as the file is used.
pub struct Fixture {
    _temp_dir: TempDir,
    pub path: PathBuf,
    pub prover: Arc<FakeProver>,
}

pub async fn open_fixture(content: &str) -> (Fixture, ProofFile) {
    open_fixture_with_timeout(content, Duration::from_secs(5)).await
}

pub async fn open_fixture_with_timeout(
    content: &str,
    timeout: Duration,
) -> (Fixture, ProofFile) {
    let temp_dir = TempDir::new().unwrap();
    let child = temp_dir.child("test.v");
    child.write_str(content).unwrap();
    let path = child.path().to_path_buf();
    let prover = FakeProver::new();
    let config = ProofFileConfig { timeout };
    let file = ProofFile::open(prover.clone(), &path, config)
        .await
        .expect("open failed");
    (
        Fixture {
            _temp_dir: temp_dir,
            path,
            prover,
        },
        file,
    )
}

pub fn read_disk(fixture: &Fixture) -> String {
    std::fs::read_to_string(&fixture.path).unwrap()
}

// RUST_LOG=coqtide=trace shows the engine's round trips during a test
// run. Repeat calls are fine; only the first one installs anything.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
