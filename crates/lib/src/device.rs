//! Device references written into boot entries.

use std::fmt::Display;

use serde::Deserialize;
use uuid::Uuid;

/// The class of device a [`DeviceDescriptor`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// A composite-image (CimFS) filesystem exposed to the guest
    /// over the virtual bus.
    VmbusCimfs,
}

impl DeviceClass {
    /// The tag used by the boot editor for this device class.
    pub fn tag(&self) -> &'static str {
        match self {
            DeviceClass::VmbusCimfs => "vmbuscimfs",
        }
    }
}

/// A boot device value: a device class, the class-specific identifier
/// and the identifier of the device-options object carrying its
/// mount parameters.
///
/// Rendered as `<tag>={class-id};{options-id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// The device class.
    pub class: DeviceClass,
    /// The class-specific identifier.
    pub class_id: Uuid,
    /// Identifier of the device-options object.
    pub options_id: Uuid,
}

impl DeviceDescriptor {
    /// A composite-filesystem device reachable over the virtual bus.
    pub fn vmbus_cimfs(class_id: Uuid, options_id: Uuid) -> Self {
        Self {
            class: DeviceClass::VmbusCimfs,
            class_id,
            options_id,
        }
    }

    /// The braced form of [`Self::options_id`], which addresses the
    /// device-options object in the store.
    pub fn options_object(&self) -> String {
        self.options_id.braced().to_string()
    }
}

impl Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}={};{}",
            self.class.tag(),
            self.class_id.braced(),
            self.options_id.braced()
        )
    }
}

/// A GPT partition addressed directly, used when booting from a disk
/// partition rather than a composite image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ArcDevice {
    /// The GPT disk identifier.
    pub disk_id: Uuid,
    /// The GPT partition identifier.
    pub partition_id: Uuid,
}

impl Display for ArcDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "gpt_partition={};{}",
            self.disk_id.braced(),
            self.partition_id.braced()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASS: Uuid = uuid::uuid!("c63c9bdf-5fa5-4208-b03f-6b458b365592");
    const OPTIONS: Uuid = uuid::uuid!("ae7c7b7e-6cc1-4e1f-a3e0-4f2c7a1d9b51");

    #[test]
    fn render_descriptor() {
        let d = DeviceDescriptor::vmbus_cimfs(CLASS, OPTIONS);
        assert_eq!(
            d.to_string(),
            "vmbuscimfs={c63c9bdf-5fa5-4208-b03f-6b458b365592};{ae7c7b7e-6cc1-4e1f-a3e0-4f2c7a1d9b51}"
        );
        assert_eq!(d.options_object(), "{ae7c7b7e-6cc1-4e1f-a3e0-4f2c7a1d9b51}");
    }

    #[test]
    fn render_arc() {
        let a = ArcDevice {
            disk_id: CLASS,
            partition_id: OPTIONS,
        };
        assert_eq!(
            a.to_string(),
            "gpt_partition={c63c9bdf-5fa5-4208-b03f-6b458b365592};{ae7c7b7e-6cc1-4e1f-a3e0-4f2c7a1d9b51}"
        );
    }
}
