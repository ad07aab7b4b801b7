use tower_lsp::lsp_types::{Diagnostic, Position, Url};

use crate::error::Result;
use crate::goal::GoalSnapshot;
use crate::term::Term;

/// The transport-level connection to the external prover.
///
/// The engine owns an `Arc<dyn ProverClient>` and drives it one round trip
/// at a time: a `change` followed by a `diagnostics_for` wait, plus a
/// `goals_at` query per step whose state the change may have moved.
/// Implementations do the wire framing and process management; the engine
/// bounds every wait with its own timeout.
#[async_trait::async_trait]
pub trait ProverClient: Send + Sync {
    /// Opens the document and returns the initial version, normally 1.
    async fn open(&self, uri: Url, text: String) -> Result<i32>;

    /// Replaces the document's content. Diagnostics for the new version
    /// arrive via `diagnostics_for`, not as a direct response.
    async fn change(&self, uri: Url, version: i32, text: String) -> Result<()>;

    /// Waits for the diagnostics the prover published for exactly this
    /// version. Answers for older versions must not be returned.
    async fn diagnostics_for(&self, uri: Url, version: i32) -> Result<Vec<Diagnostic>>;

    /// The goal state at a position. The returned snapshot carries the
    /// version the prover computed it for, which may trail the requested
    /// one; the engine polls until the versions agree.
    async fn goals_at(&self, uri: Url, version: i32, position: Position) -> Result<GoalSnapshot>;

    /// Asks the prover to locate the declaring term of a notation pattern,
    /// for notations that come from imports the local resolver cannot see.
    async fn locate(&self, pattern: String, scope: String) -> Result<Option<Term>>;

    /// Closes the document on the prover side.
    async fn close(&self, uri: Url) -> Result<()>;
}
