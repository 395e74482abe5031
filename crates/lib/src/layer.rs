//! Activation and preparation of content-addressable layers.
//!
//! Activation is treated as an acquired resource: once a layer is
//! activated, any failure before preparation completes deactivates it
//! again before the error is returned. On success the layer stays
//! active; the caller deactivates it when it is unmounted.

use std::fmt::Debug;

use anyhow::{Context, Result};
use fn_error_context::context;
use uvmboot_utils::{CommandRunExt, ResultExt};

use crate::mountspec::{LayerRef, MountSpec};
use crate::tool::ToolCommand;

/// The host's layer API.
pub trait LayerApi {
    /// Activate `layer` under its home directory.
    fn activate(&self, layer: &LayerRef) -> Result<()>;
    /// Deactivate `layer`. Safe to call on any layer that was
    /// successfully activated.
    fn deactivate(&self, layer: &LayerRef) -> Result<()>;
    /// Prepare an activated layer; `parent_hints` name parent layers
    /// or mounted volumes it is composed against.
    fn prepare(&self, layer: &LayerRef, parent_hints: &[String]) -> Result<()>;
}

/// Implements [`LayerApi`] with a command-line front end, invoked as
/// `<tool> activate|deactivate <home> <id>` and
/// `<tool> prepare <home> <id> [hints...]`.
#[derive(Debug, Clone)]
pub struct LayerTool {
    tool: ToolCommand,
}

impl LayerTool {
    /// Use `tool` as the front end.
    pub fn new(tool: ToolCommand) -> Self {
        Self { tool }
    }

    fn run(&self, verb: &str, layer: &LayerRef, extra: &[String]) -> Result<()> {
        self.tool
            .command()
            .args([verb, layer.home.as_str(), layer.id.as_str()])
            .args(extra)
            .log_debug()
            .run()
    }
}

impl LayerApi for LayerTool {
    fn activate(&self, layer: &LayerRef) -> Result<()> {
        self.run("activate", layer, &[])
    }

    fn deactivate(&self, layer: &LayerRef) -> Result<()> {
        self.run("deactivate", layer, &[])
    }

    fn prepare(&self, layer: &LayerRef, parent_hints: &[String]) -> Result<()> {
        self.run("prepare", layer, parent_hints)
    }
}

/// An activated layer. Deactivated by [`ActivatedLayer::deactivate`] or,
/// best effort, on drop; [`ActivatedLayer::keep`] leaves it active.
pub struct ActivatedLayer<'a, A: LayerApi + ?Sized> {
    api: &'a A,
    layer: Option<LayerRef>,
}

impl<A: LayerApi + ?Sized> Debug for ActivatedLayer<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivatedLayer")
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

impl<'a, A: LayerApi + ?Sized> ActivatedLayer<'a, A> {
    /// Activate `layer` through `api`.
    pub fn activate(api: &'a A, layer: LayerRef) -> Result<Self> {
        api.activate(&layer)
            .with_context(|| format!("Activating layer {layer}"))?;
        tracing::debug!("Activated layer {layer}");
        Ok(Self {
            api,
            layer: Some(layer),
        })
    }

    // Shared backend for our `deactivate` and `drop` implementations.
    fn impl_deactivate(&mut self) -> Result<()> {
        let Some(layer) = self.layer.take() else {
            return Ok(());
        };
        self.api
            .deactivate(&layer)
            .with_context(|| format!("Deactivating layer {layer}"))
    }

    /// Consume this layer, deactivating it.
    pub fn deactivate(mut self) -> Result<()> {
        self.impl_deactivate()
    }

    /// Consume the guard, leaving the layer active.
    pub fn keep(mut self) {
        let _ = self.layer.take();
    }
}

impl<A: LayerApi + ?Sized> Drop for ActivatedLayer<'_, A> {
    fn drop(&mut self) {
        if self.layer.is_some() {
            self.impl_deactivate()
                .log_warn("Best-effort layer deactivation on drop");
        }
    }
}

/// Bring the layer named by `spec` into a mountable state.
///
/// A spec without a source or without a mounted composite image needs
/// no work (an empty value counts as absent): the layer's view was mounted by an earlier call. Otherwise
/// the layer is activated and then prepared against the mounted image;
/// if preparation fails the layer is deactivated before the error is
/// returned.
#[context("Preparing layer for mount")]
pub fn prepare<A: LayerApi + ?Sized>(api: &A, spec: &MountSpec) -> Result<()> {
    let (Some(layer), Some(mounted)) = (spec.layer_ref(), spec.mounted_image()) else {
        tracing::debug!("No layer source or mounted image; nothing to prepare");
        return Ok(());
    };
    let layer = layer?;
    let active = ActivatedLayer::activate(api, layer.clone())?;
    let hints = [mounted.to_string()];
    match api
        .prepare(&layer, &hints)
        .with_context(|| format!("Preparing layer {layer}"))
    {
        Ok(()) => {
            active.keep();
            tracing::info!("Prepared layer {layer} against {mounted}");
            Ok(())
        }
        Err(e) => {
            tracing::warn!("Layer preparation failed; deactivating");
            active.deactivate().log_err("Deactivating after failed preparation");
            Err(e)
        }
    }
}

/// Deactivate a layer previously brought up by [`prepare`], when its
/// mount is torn down.
#[context("Releasing layer {source}")]
pub fn release<A: LayerApi + ?Sized>(api: &A, source: &str) -> Result<()> {
    let layer = LayerRef::from_source(source)?;
    api.deactivate(&layer)?;
    tracing::debug!("Deactivated layer {layer}");
    Ok(())
}
