//! # uvmboot command line
//!
//! Command line tool to configure utility VM boot stores and prepare
//! layers for mounting.

use std::ffi::OsString;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use uvmboot_utils::CommandRunExt;

use crate::config::Config;
use crate::layer::{self, LayerTool};
use crate::mountspec::MountSpec;
use crate::sequence::configure_store;
use crate::store::{BcdEdit, BootStore, RecordingEditor};
use crate::vhd::configure_mounted_vhd;

/// Options shared by the store-configuration commands.
#[derive(Debug, Parser, PartialEq, Eq)]
pub(crate) struct ConfigureOpts {
    /// Path to the TOML configuration.
    #[clap(long)]
    pub(crate) config: Utf8PathBuf,

    /// Path to the boot-configuration store.
    pub(crate) store: Utf8PathBuf,
}

/// Perform configuration of a boot store.
#[derive(Debug, Parser, PartialEq, Eq)]
pub(crate) struct ConfigureStoreOpts {
    #[clap(flatten)]
    pub(crate) common: ConfigureOpts,

    /// Print the edits instead of applying them.
    #[clap(long)]
    pub(crate) dry_run: bool,
}

/// Perform configuration of a boot store held on a virtual disk.
#[derive(Debug, Parser, PartialEq, Eq)]
pub(crate) struct ConfigureVhdOpts {
    #[clap(flatten)]
    pub(crate) common: ConfigureOpts,

    /// The virtual disk to attach while editing.
    #[clap(long)]
    pub(crate) vhd: Utf8PathBuf,
}

/// Options for preparing a layer.
#[derive(Debug, Parser, PartialEq, Eq)]
pub(crate) struct PrepareLayerOpts {
    /// Path to the TOML configuration.
    #[clap(long)]
    pub(crate) config: Option<Utf8PathBuf>,

    /// The layer directory.
    #[clap(long)]
    pub(crate) source: Option<String>,

    /// Mount options, e.g. `mountedCim=<volume>`.
    #[clap(long = "option", short = 'o')]
    pub(crate) options: Vec<String>,

    /// Where the layer will be mounted.
    #[clap(long)]
    pub(crate) target: Option<String>,
}

/// Options for releasing a layer.
#[derive(Debug, Parser, PartialEq, Eq)]
pub(crate) struct ReleaseLayerOpts {
    /// Path to the TOML configuration.
    #[clap(long)]
    pub(crate) config: Option<Utf8PathBuf>,

    /// The layer directory.
    #[clap(long)]
    pub(crate) source: String,
}

/// Options for volume mount points.
#[derive(Debug, Parser, PartialEq, Eq)]
pub(crate) enum VolumeOpts {
    /// Mount a volume (`\\?\Volume{GUID}\`) at a directory.
    Mount {
        /// The directory to mount at.
        target: String,
        /// The volume GUID path.
        volume: String,
    },
    /// Remove a volume mount point.
    Unmount {
        /// The mount point.
        target: String,
    },
}

/// Configure utility VM boot stores and layers.
#[derive(Debug, Parser, PartialEq, Eq)]
#[clap(name = "uvmboot", version)]
pub(crate) enum Opt {
    /// Apply the configured boot sequence to an offline boot store.
    ConfigureStore(ConfigureStoreOpts),
    /// Attach a virtual disk, apply the boot sequence to a store on it,
    /// and detach it again.
    ConfigureVhd(ConfigureVhdOpts),
    /// Activate and prepare a layer for mounting.
    PrepareLayer(PrepareLayerOpts),
    /// Deactivate a previously prepared layer.
    ReleaseLayer(ReleaseLayerOpts),
    /// Manage volume mount points (Windows hosts only).
    #[clap(subcommand)]
    Volume(VolumeOpts),
}

fn load_optional(path: Option<&camino::Utf8Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load(p),
        None => Config::parse(""),
    }
}

#[cfg(windows)]
fn run_volume(opts: VolumeOpts) -> Result<()> {
    use crate::volume::{delete_volume_mount_point, set_volume_mount_point, Win32VolumeMounts};
    let host = Win32VolumeMounts;
    match opts {
        VolumeOpts::Mount { target, volume } => {
            set_volume_mount_point(&host, &target, &volume)?;
        }
        VolumeOpts::Unmount { target } => delete_volume_mount_point(&host, &target)?,
    }
    Ok(())
}

#[cfg(not(windows))]
fn run_volume(opts: VolumeOpts) -> Result<()> {
    let what = match opts {
        VolumeOpts::Mount { target, volume } => format!("mount {volume} at {target}"),
        VolumeOpts::Unmount { target } => format!("unmount {target}"),
    };
    anyhow::bail!("Cannot {what}: volume mount points are only supported on Windows hosts")
}

/// Parse the provided arguments and execute.
/// Calls [`clap::Error::exit`] on failure, printing the error message and aborting the program.
pub fn run_from_iter<I>(args: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
{
    run_from_opt(Opt::parse_from(args))
}

fn run_from_opt(opt: Opt) -> Result<()> {
    match opt {
        Opt::ConfigureStore(opts) => {
            let config = Config::load(&opts.common.config)?;
            let plan = config.plan()?;
            let store = BootStore::new(opts.common.store);
            if opts.dry_run {
                let recorder = RecordingEditor::default();
                configure_store(&recorder, &store, &plan)?;
                for edit in recorder.into_edits() {
                    let mut c = config.tools.bcdedit.command();
                    c.args(["/store", store.path().as_str(), "/offline"]);
                    c.args(edit);
                    println!("{}", c.to_string_pretty());
                }
                Ok(())
            } else {
                let editor = BcdEdit::new(config.tools.bcdedit.clone());
                configure_store(&editor, &store, &plan)
            }
        }
        Opt::ConfigureVhd(opts) => {
            let config = Config::load(&opts.common.config)?;
            let plan = config.plan()?;
            let store = BootStore::new(opts.common.store);
            let editor = BcdEdit::new(config.tools.bcdedit.clone());
            configure_mounted_vhd(&config.tools.script_host, &opts.vhd, &editor, &store, &plan)
        }
        Opt::PrepareLayer(opts) => {
            let config = load_optional(opts.config.as_deref())?;
            let api = LayerTool::new(config.tools.layer_tool);
            let spec = MountSpec {
                source: opts.source,
                options: opts.options,
                target: opts.target,
            };
            layer::prepare(&api, &spec)
        }
        Opt::ReleaseLayer(opts) => {
            let config = load_optional(opts.config.as_deref())?;
            let api = LayerTool::new(config.tools.layer_tool);
            layer::release(&api, &opts.source)
        }
        Opt::Volume(opts) => run_volume(opts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_configure_store() {
        let o = Opt::try_parse_from([
            "uvmboot",
            "configure-store",
            "--config",
            "/etc/uvmboot.toml",
            "--dry-run",
            "/mnt/BCD",
        ])
        .unwrap();
        assert_eq!(
            o,
            Opt::ConfigureStore(ConfigureStoreOpts {
                common: ConfigureOpts {
                    config: "/etc/uvmboot.toml".into(),
                    store: "/mnt/BCD".into(),
                },
                dry_run: true,
            })
        );
    }

    #[test]
    fn parse_prepare_layer() {
        let o = Opt::try_parse_from([
            "uvmboot",
            "prepare-layer",
            "--source",
            r"C:\layers\l1",
            "-o",
            "rw",
            "-o",
            r"mountedCim=\\?\Volume{x}\",
        ])
        .unwrap();
        let Opt::PrepareLayer(opts) = o else {
            panic!("unexpected {o:?}");
        };
        assert_eq!(opts.options, ["rw", r"mountedCim=\\?\Volume{x}\"]);
        assert!(opts.config.is_none());
    }

    #[test]
    fn parse_volume() {
        let o = Opt::try_parse_from(["uvmboot", "volume", "unmount", r"C:\mnt"]).unwrap();
        assert_eq!(
            o,
            Opt::Volume(VolumeOpts::Unmount {
                target: r"C:\mnt".into()
            })
        );
    }

    #[test]
    fn dry_run_prints_without_executing() {
        let td = tempfile::tempdir().unwrap();
        let config = camino::Utf8Path::from_path(td.path()).unwrap().join("c.toml");
        // An editor that would fail if it were ever run
        std::fs::write(
            &config,
            indoc::indoc! { r#"
                [tools]
                bcdedit = "false"
                [boot.arc]
                disk-id = "c63c9bdf-5fa5-4208-b03f-6b458b365592"
                partition-id = "ae7c7b7e-6cc1-4e1f-a3e0-4f2c7a1d9b51"
            "# },
        )
        .unwrap();
        run_from_iter([
            "uvmboot",
            "configure-store",
            "--config",
            config.as_str(),
            "--dry-run",
            "/mnt/BCD",
        ])
        .unwrap();
        let e = run_from_iter([
            "uvmboot",
            "configure-store",
            "--config",
            config.as_str(),
            "/mnt/BCD",
        ])
        .unwrap_err();
        assert!(format!("{e:#}").contains("Applying restart-on-failure"));
    }

    #[test]
    fn prepare_layer_noop_without_image() {
        run_from_iter(["uvmboot", "prepare-layer", "--source", r"C:\layers\l1"]).unwrap();
    }
}
