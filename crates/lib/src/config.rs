//! # uvmboot configuration
//!
//! The boot scenario and the host tools used to apply it are described
//! in a TOML file. No device identifiers are built in; the device and
//! device-options GUIDs always come from here.

use anyhow::{Context, Result};
use camino::Utf8Path;
use fn_error_context::context;
use serde::Deserialize;
use uuid::Uuid;

use crate::device::{ArcDevice, DeviceDescriptor};
use crate::sequence::{BootPlan, BootScenario, DebugSettings};
use crate::tool::ToolCommand;

/// Host tools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Tools {
    /// The boot-configuration editor.
    #[serde(default = "default_bcdedit")]
    pub bcdedit: ToolCommand,
    /// The script host providing `Mount-VHD`/`Dismount-VHD`.
    #[serde(default = "default_script_host")]
    pub script_host: ToolCommand,
    /// The layer API front end.
    #[serde(default = "default_layer_tool")]
    pub layer_tool: ToolCommand,
}

fn default_bcdedit() -> ToolCommand {
    ToolCommand::new("bcdedit.exe")
}

fn default_script_host() -> ToolCommand {
    ToolCommand::new("powershell.exe")
}

fn default_layer_tool() -> ToolCommand {
    ToolCommand::new("wclayer.exe")
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            bcdedit: default_bcdedit(),
            script_host: default_script_host(),
            layer_tool: default_layer_tool(),
        }
    }
}

/// The `[boot.composite]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CompositeConfig {
    /// Class identifier of the virtual-bus device.
    pub class_id: Uuid,
    /// Identifier of the device-options object.
    pub options_id: Uuid,
    /// Root directory of the composite filesystem.
    pub root_directory: String,
}

/// The `[boot]` table; exactly one scenario must be given.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BootConfig {
    /// Boot from a composite image.
    pub composite: Option<CompositeConfig>,
    /// Boot from a GPT partition.
    pub arc: Option<ArcDevice>,
}

/// The full configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Host tools.
    #[serde(default)]
    pub tools: Tools,
    /// The boot scenario.
    #[serde(default)]
    pub boot: BootConfig,
    /// Optional debug instrumentation.
    pub debug: Option<DebugSettings>,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).context("Parsing configuration")
    }

    /// Load the configuration at `path`.
    #[context("Loading configuration {path}")]
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::parse(&s)
    }

    /// Build the boot plan described by this configuration.
    pub fn plan(&self) -> Result<BootPlan> {
        let scenario = match (&self.boot.composite, &self.boot.arc) {
            (Some(c), None) => BootScenario::CompositeImage {
                device: DeviceDescriptor::vmbus_cimfs(c.class_id, c.options_id),
                root_directory: c.root_directory.clone(),
            },
            (None, Some(arc)) => BootScenario::ArcPartition(*arc),
            (Some(_), Some(_)) => {
                anyhow::bail!("Only one of [boot.composite] and [boot.arc] may be given")
            }
            (None, None) => anyhow::bail!("Missing [boot.composite] or [boot.arc]"),
        };
        Ok(BootPlan {
            scenario,
            debug: self.debug,
        })
    }
}
