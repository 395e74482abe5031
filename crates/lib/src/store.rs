//! Editing an offline boot-configuration store.
//!
//! Every change is a single invocation of the host's boot-configuration
//! editor, addressed to one named object in the store. There is no
//! transaction spanning several invocations; if the tool fails half way
//! through, the store is left as the tool left it. Callers rely on edits
//! being idempotent by value and may re-run a whole sequence instead.

use std::cell::RefCell;
use std::fmt::Display;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use uvmboot_utils::CommandRunExt;

use crate::tool::ToolCommand;

/// The well-known default boot entry.
pub const DEFAULT_ENTRY: &str = "{default}";
/// The well-known boot manager entry.
pub const BOOTMGR_ENTRY: &str = "{bootmgr}";

/// An offline boot-configuration database, identified by its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootStore {
    path: Utf8PathBuf,
}

impl BootStore {
    /// Refer to the store at `path`. Nothing is opened or validated here.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the store.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Display for BootStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.path.fmt(f)
    }
}

/// Applies a single named change to an offline boot store.
pub trait BootStoreEditor {
    /// Apply `args` (e.g. `/set {default} restartonfailure yes`) to `store`.
    /// Implementations never retry.
    fn apply(&self, store: &BootStore, args: &[String]) -> Result<()>;
}

/// The host's boot-configuration editor, invoked as
/// `<editor> /store <path> /offline <args...>`.
#[derive(Debug, Clone)]
pub struct BcdEdit {
    tool: ToolCommand,
}

impl BcdEdit {
    /// Use `tool` as the editor.
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }
}

impl BootStoreEditor for BcdEdit {
    #[context("Editing boot store {store}")]
    fn apply(&self, store: &BootStore, args: &[String]) -> Result<()> {
        self.tool
            .command()
            .args(["/store", store.path().as_str(), "/offline"])
            .args(args)
            .log_debug()
            .run()
    }
}

/// An editor that records edits rather than executing them; used for
/// dry runs.
#[derive(Debug, Default)]
pub struct RecordingEditor {
    edits: RefCell<Vec<Vec<String>>>,
}

impl RecordingEditor {
    /// Consume the recorder, returning every edit in the order applied.
    pub fn into_edits(self) -> Vec<Vec<String>> {
        self.edits.into_inner()
    }
}

impl BootStoreEditor for RecordingEditor {
    fn apply(&self, store: &BootStore, args: &[String]) -> Result<()> {
        tracing::debug!("recording edit of {store}: {args:?}");
        self.edits.borrow_mut().push(args.to_vec());
        Ok(())
    }
}
