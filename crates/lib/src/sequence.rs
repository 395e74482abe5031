//! The ordered set of boot-store edits that makes a utility VM boot
//! its guest from a composite image exposed over the virtual bus.
//!
//! A [`BootPlan`] is turned into a list of [`BootEdit`]s which are then
//! applied strictly in order. Later edits reference objects created by
//! earlier ones, so nothing here may be reordered or parallelized. The
//! first failing edit aborts the sequence; earlier edits are not rolled
//! back.

use anyhow::{Context, Result};
use fn_error_context::context;
use serde::Deserialize;

use crate::device::{ArcDevice, DeviceDescriptor};
use crate::store::{BootStore, BootStoreEditor, BOOTMGR_ENTRY, DEFAULT_ENTRY};

/// Loader binary inside the utility VM image.
pub const UTILITY_VM_LOADER_PATH: &str = r"\UtilityVM\Files\Windows\System32\winload.efi";
/// System root inside the utility VM image.
pub const UTILITY_VM_SYSTEM_ROOT: &str = r"\UtilityVM\Files\Windows";
/// Description given to the device-options object.
pub(crate) const CIMFS_OPTIONS_DESCRIPTION: &str = "CimFS Device Options";

/// Where the guest boots from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootScenario {
    /// Boot from a composite image reachable through a virtual-bus device.
    CompositeImage {
        /// Bound to both the device and OS device of the default entry.
        device: DeviceDescriptor,
        /// Root directory of the composite filesystem.
        root_directory: String,
    },
    /// Boot directly from a GPT partition.
    ArcPartition(ArcDevice),
}

/// Serial kernel-debugging settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DebugSettings {
    /// Serial port number.
    pub port: u32,
    /// Serial baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    115200
}

/// Everything needed to configure one boot store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPlan {
    /// The boot device scenario.
    pub scenario: BootScenario,
    /// If set, also enable boot and kernel debugging.
    pub debug: Option<DebugSettings>,
}

/// A single edit: a short name for logs and the editor arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEdit {
    /// What this edit does.
    pub step: &'static str,
    /// Arguments passed to the editor.
    pub args: Vec<String>,
}

impl BootEdit {
    fn new<I, S>(step: &'static str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            step,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn set(step: &'static str, object: &str, element: &str, value: impl Into<String>) -> Self {
        Self::new(
            step,
            [
                "/set".to_string(),
                object.to_string(),
                element.to_string(),
                value.into(),
            ],
        )
    }
}

impl BootPlan {
    /// The edits for this plan, in the order they must be applied.
    pub fn edits(&self) -> Vec<BootEdit> {
        let mut edits = vec![BootEdit::set(
            "restart-on-failure",
            DEFAULT_ENTRY,
            "restartonfailure",
            "yes",
        )];
        match &self.scenario {
            BootScenario::CompositeImage {
                device,
                root_directory,
            } => {
                let device_value = device.to_string();
                let options = device.options_object();
                edits.extend([
                    BootEdit::set("device", DEFAULT_ENTRY, "device", device_value.as_str()),
                    BootEdit::set("os-device", DEFAULT_ENTRY, "osdevice", device_value),
                    BootEdit::new(
                        "device-options",
                        [
                            "/create",
                            options.as_str(),
                            "/d",
                            CIMFS_OPTIONS_DESCRIPTION,
                            "/device",
                        ],
                    ),
                    BootEdit::set(
                        "root-directory",
                        &options,
                        "cimfsrootdirectory",
                        root_directory.as_str(),
                    ),
                    BootEdit::set("loader-path", DEFAULT_ENTRY, "path", UTILITY_VM_LOADER_PATH),
                    BootEdit::set(
                        "system-root",
                        DEFAULT_ENTRY,
                        "systemroot",
                        UTILITY_VM_SYSTEM_ROOT,
                    ),
                ]);
            }
            BootScenario::ArcPartition(arc) => {
                edits.push(BootEdit::set(
                    "arc-device",
                    DEFAULT_ENTRY,
                    "arcdevice",
                    arc.to_string(),
                ));
            }
        }
        if let Some(debug) = &self.debug {
            edits.extend(debug_edits(debug));
        }
        edits
    }
}

/// Test signing, boot debugging on the default and boot manager
/// entries, the serial debug transport, and kernel debugging.
fn debug_edits(debug: &DebugSettings) -> Vec<BootEdit> {
    vec![
        BootEdit::set("test-signing", DEFAULT_ENTRY, "testsigning", "on"),
        BootEdit::set("boot-debug", DEFAULT_ENTRY, "bootdebug", "on"),
        BootEdit::set("bootmgr-debug", BOOTMGR_ENTRY, "bootdebug", "on"),
        BootEdit::new(
            "debug-settings",
            [
                "/dbgsettings".to_string(),
                "serial".to_string(),
                format!("debugport:{}", debug.port),
                format!("baudrate:{}", debug.baud_rate),
            ],
        ),
        BootEdit::set("kernel-debug", DEFAULT_ENTRY, "debug", "on"),
    ]
}

/// Apply every edit of `plan` to `store`, in order, stopping at the
/// first failure.
#[context("Configuring boot store {store}")]
pub fn configure_store<E>(editor: &E, store: &BootStore, plan: &BootPlan) -> Result<()>
where
    E: BootStoreEditor + ?Sized,
{
    let edits = plan.edits();
    let n = edits.len();
    for (i, edit) in edits.iter().enumerate() {
        tracing::debug!("Boot edit {}/{n}: {}", i + 1, edit.step);
        editor
            .apply(store, &edit.args)
            .with_context(|| format!("Applying {}", edit.step))?;
    }
    tracing::info!("Applied {n} boot edits to {store}");
    Ok(())
}
