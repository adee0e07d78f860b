//! Client-side sync, lock, and undo engine for collaborative flow documents.
//!
//! A [`Session`] mirrors a server-owned node graph, applies local edits
//! optimistically, reconciles collaborator broadcasts idempotently, and keeps
//! an undo history that only ever records what this session did.
//! [`SessionDriver`] runs a session as a tokio task against channel-based
//! transport.

#![cfg_attr(test, allow(unused_crate_dependencies))]
#![warn(missing_docs)]

pub mod config;
pub mod debounce;
pub mod debug;
pub mod driver;
pub mod error;
pub mod guard;
pub mod history;
pub mod locks;
pub mod mirror;
pub mod schema;
pub mod session;

pub use config::{ConfigError, SessionConfig};
pub use debug::{DebugMark, DebugView};
pub use driver::{DriverExit, SessionCommand, SessionDriver};
pub use error::{EditError, SyncError};
pub use guard::{ChangeOrigin, ScopeGuard, ScopeKind, Suppression};
pub use history::{Action, History};
pub use locks::LockTracker;
pub use mirror::{ChangeRecord, GraphMirror, MirrorChange};
pub use schema::{FlowRenderer, NodeRenderer, SocketSet};
pub use session::{ApplyReport, HistoryEffect, Session, SessionSnapshot};
