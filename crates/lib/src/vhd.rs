//! Configuring a boot store that lives inside a virtual disk.
//!
//! The disk is attached through the host script engine
//! (`Mount-VHD`/`Dismount-VHD`) for the duration of the edits and is
//! always detached afterwards, whether or not editing succeeded.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use uvmboot_utils::{CommandRunExt, ResultExt};

use crate::sequence::{configure_store, BootPlan};
use crate::store::{BootStore, BootStoreEditor};
use crate::tool::ToolCommand;

/// A virtual disk attached to the host. Dismounted on [`MountedVhd::dismount`]
/// or, on a best-effort basis, on drop.
#[derive(Debug)]
pub struct MountedVhd<'a> {
    script_host: &'a ToolCommand,
    path: Option<Utf8PathBuf>,
}

impl<'a> MountedVhd<'a> {
    /// Attach the disk at `path`.
    #[context("Mounting VHD {path}")]
    pub fn mount(script_host: &'a ToolCommand, path: &Utf8Path) -> Result<Self> {
        script_host
            .command()
            .args(["Mount-VHD", path.as_str()])
            .log_debug()
            .run()?;
        tracing::debug!("Mounted {path}");
        Ok(Self {
            script_host,
            path: Some(path.to_owned()),
        })
    }

    // Shared backend for our `dismount` and `drop` implementations.
    fn impl_dismount(&mut self) -> Result<()> {
        let Some(path) = self.path.take() else {
            tracing::trace!("VHD already dismounted");
            return Ok(());
        };
        self.script_host
            .command()
            .args(["Dismount-VHD", path.as_str()])
            .log_debug()
            .run()
            .with_context(|| format!("Dismounting VHD {path}"))
    }

    /// Consume this disk, detaching it.
    pub fn dismount(mut self) -> Result<()> {
        self.impl_dismount()
    }
}

impl Drop for MountedVhd<'_> {
    fn drop(&mut self) {
        // Best effort to detach if we're dropped without invoking `dismount`
        let _ = self.impl_dismount();
    }
}

/// Attach `vhd`, apply `plan` to `store` (which is expected to live on
/// the attached disk), then detach. A dismount failure is logged and
/// never replaces the result of the edits.
pub fn configure_mounted_vhd<E>(
    script_host: &ToolCommand,
    vhd: &Utf8Path,
    editor: &E,
    store: &BootStore,
    plan: &BootPlan,
) -> Result<()>
where
    E: BootStoreEditor + ?Sized,
{
    let disk = MountedVhd::mount(script_host, vhd)?;
    let r = configure_store(editor, store, plan);
    disk.dismount().log_err("Best-effort VHD dismount");
    r
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::device::DeviceDescriptor;
    use crate::sequence::BootScenario;
    use crate::store::RecordingEditor;

    /// A script host that appends "<cmdlet> <path>" to `log`, failing
    /// the cmdlets named in `fail`.
    fn logging_host(log: &Utf8Path, fail: &[&str]) -> ToolCommand {
        let mut script = String::new();
        for f in fail {
            script.push_str(&format!(r#"[ "$0" = "{f}" ] && exit 1; "#));
        }
        script.push_str(&format!(r#"echo "$0 $1" >> '{log}'"#));
        ToolCommand::new("sh").args(["-c".to_string(), script])
    }

    fn read_log(log: &Utf8Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(ToOwned::to_owned)
            .collect()
    }

    fn plan() -> BootPlan {
        BootPlan {
            scenario: BootScenario::CompositeImage {
                device: DeviceDescriptor::vmbus_cimfs(uuid::Uuid::nil(), uuid::Uuid::nil()),
                root_directory: r"\".into(),
            },
            debug: None,
        }
    }

    struct Failing(RefCell<usize>);

    impl BootStoreEditor for Failing {
        fn apply(&self, _store: &BootStore, _args: &[String]) -> Result<()> {
            *self.0.borrow_mut() += 1;
            anyhow::bail!("editor exploded")
        }
    }

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let td = tempfile::tempdir().unwrap();
        let log = Utf8Path::from_path(td.path()).unwrap().join("log");
        (td, log)
    }

    #[test]
    fn bracket_success() {
        let (_td, log) = scratch();
        let host = logging_host(&log, &[]);
        let editor = RecordingEditor::default();
        configure_mounted_vhd(
            &host,
            Utf8Path::new("/images/uvm.vhdx"),
            &editor,
            &BootStore::new("/mnt/EFI/Microsoft/Boot/BCD"),
            &plan(),
        )
        .unwrap();
        assert_eq!(editor.into_edits().len(), 7);
        assert_eq!(
            read_log(&log),
            ["Mount-VHD /images/uvm.vhdx", "Dismount-VHD /images/uvm.vhdx"]
        );
    }

    #[test]
    fn dismount_after_failed_edit() {
        let (_td, log) = scratch();
        let host = logging_host(&log, &[]);
        let editor = Failing(RefCell::new(0));
        let e = configure_mounted_vhd(
            &host,
            Utf8Path::new("/images/uvm.vhdx"),
            &editor,
            &BootStore::new("/mnt/BCD"),
            &plan(),
        )
        .unwrap_err();
        assert!(format!("{e:#}").ends_with("editor exploded"));
        assert_eq!(*editor.0.borrow(), 1);
        assert_eq!(
            read_log(&log),
            ["Mount-VHD /images/uvm.vhdx", "Dismount-VHD /images/uvm.vhdx"]
        );
    }

    #[test]
    fn dismount_failure_does_not_override() {
        let (_td, log) = scratch();
        let host = logging_host(&log, &["Dismount-VHD"]);
        let editor = RecordingEditor::default();
        configure_mounted_vhd(
            &host,
            Utf8Path::new("/images/uvm.vhdx"),
            &editor,
            &BootStore::new("/mnt/BCD"),
            &plan(),
        )
        .unwrap();
        assert_eq!(read_log(&log), ["Mount-VHD /images/uvm.vhdx"]);
    }

    #[test]
    fn mount_failure_skips_edits() {
        let (_td, log) = scratch();
        let host = logging_host(&log, &["Mount-VHD"]);
        let editor = RecordingEditor::default();
        let e = configure_mounted_vhd(
            &host,
            Utf8Path::new("/images/uvm.vhdx"),
            &editor,
            &BootStore::new("/mnt/BCD"),
            &plan(),
        )
        .unwrap_err();
        assert!(format!("{e:#}").starts_with("Mounting VHD /images/uvm.vhdx"));
        assert!(editor.into_edits().is_empty());
        assert!(read_log(&log).is_empty());
    }

    #[test]
    fn drop_dismounts() {
        let (_td, log) = scratch();
        let host = logging_host(&log, &[]);
        {
            let _disk = MountedVhd::mount(&host, Utf8Path::new("/d.vhd")).unwrap();
            assert_eq!(read_log(&log), ["Mount-VHD /d.vhd"]);
        }
        assert_eq!(read_log(&log), ["Mount-VHD /d.vhd", "Dismount-VHD /d.vhd"]);
    }
}
