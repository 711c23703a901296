//! Extension trait for corpus sources.
//!
//! Every way of acquiring a corpus (archive upload, remote repository)
//! implements [`Connector`]. The [`Session`](crate::session::Session)
//! holds at most one in-flight scan and cancels it when a new one starts.
//!
//! ```text
//! ┌────────────────────────────────┐
//! │          Connector             │
//! │  ┌─────────────┐ ┌───────────┐ │
//! │  │ZipConnector │ │ GitHub    │ │
//! │  │ (archive)   │ │ Connector │ │
//! │  └─────────────┘ └───────────┘ │
//! └──────────────┬─────────────────┘
//!                ▼
//!     Ingestion { corpus, repo, skipped }
//! ```

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Ingestion;

/// A corpus source.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use code_proof::error::Result;
/// use code_proof::models::{FileCorpus, Ingestion};
/// use code_proof::traits::Connector;
/// use tokio_util::sync::CancellationToken;
///
/// pub struct FixedConnector;
///
/// #[async_trait]
/// impl Connector for FixedConnector {
///     fn name(&self) -> &str { "fixed" }
///
///     async fn scan(&self, _cancel: &CancellationToken) -> Result<Ingestion> {
///         Ok(Ingestion {
///             corpus: FileCorpus::from_files(vec![("a.py".into(), "x = 1".into())]),
///             repo: None,
///             skipped: Vec::new(),
///             source_label: "fixed".into(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Instance name (archive file name, `owner/repo`, …).
    fn name(&self) -> &str;

    /// Connector type identifier (`"zip"`, `"github"`, `"custom"`).
    fn connector_type(&self) -> &str {
        "custom"
    }

    /// Source label used in logs: `"{type}:{name}"`.
    fn source_label(&self) -> String {
        format!("{}:{}", self.connector_type(), self.name())
    }

    /// Acquire, filter, and normalize the corpus.
    ///
    /// Per-file failures are reported in [`Ingestion::skipped`]; only
    /// acquisition-level failures return `Err`. Implementations should
    /// return [`Error::Cancelled`](crate::error::Error::Cancelled) promptly
    /// once `cancel` fires.
    async fn scan(&self, cancel: &CancellationToken) -> Result<Ingestion>;
}
