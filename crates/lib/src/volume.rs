//! Volume mount points.
//!
//! Thin, validated wrappers over the host's volume mount-point API. Both
//! calls take NUL-terminated UTF-16 paths with a trailing separator; the
//! volume must be given as a `\\?\Volume{GUID}\` path.

use std::io;

/// Required prefix of a volume GUID path.
pub const VOLUME_GUID_PREFIX: &str = r"\\?\Volume{";

/// Errors from the mount-point helpers.
#[derive(Debug, thiserror::Error)]
pub enum VolumeMountError {
    /// The volume path is not a `\\?\Volume{GUID}` path.
    #[error("invalid volume GUID path {0:?}")]
    InvalidVolumePath(String),
    /// A path could not be encoded for the host API.
    #[error("encoding {0:?} as UTF-16: embedded NUL")]
    Encoding(String),
    /// The host call failed.
    #[error("{op} {path}")]
    Host {
        /// The failing operation.
        op: &'static str,
        /// Its target path.
        path: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// The host's volume mount-point API.
pub trait VolumeMountHost {
    /// Mount `volume` at `target`.
    fn set_volume_mount_point(&self, target: &[u16], volume: &[u16]) -> io::Result<()>;
    /// Remove the mount point at `target`.
    fn delete_volume_mount_point(&self, target: &[u16]) -> io::Result<()>;
}

fn with_trailing_separator(path: &str) -> String {
    if path.ends_with('\\') {
        path.to_string()
    } else {
        format!("{path}\\")
    }
}

/// Encode `s` as a NUL-terminated UTF-16 string.
pub fn to_wide(s: &str) -> Result<Vec<u16>, VolumeMountError> {
    if s.contains('\0') {
        return Err(VolumeMountError::Encoding(s.to_string()));
    }
    Ok(s.encode_utf16().chain(std::iter::once(0)).collect())
}

/// Mount `volume` (a `\\?\Volume{GUID}` path) at `target`. The volume
/// path is checked before anything is passed to the host.
pub fn set_volume_mount_point<H: VolumeMountHost + ?Sized>(
    host: &H,
    target: &str,
    volume: &str,
) -> Result<(), VolumeMountError> {
    if !volume.starts_with(VOLUME_GUID_PREFIX) {
        return Err(VolumeMountError::InvalidVolumePath(volume.to_string()));
    }
    let target = with_trailing_separator(target);
    let volume = with_trailing_separator(volume);
    let wtarget = to_wide(&target)?;
    let wvolume = to_wide(&volume)?;
    tracing::debug!("Mounting {volume} at {target}");
    host.set_volume_mount_point(&wtarget, &wvolume)
        .map_err(|source| VolumeMountError::Host {
            op: "Setting volume mount point",
            path: target,
            source,
        })
}

/// Remove the mount point at `target`.
pub fn delete_volume_mount_point<H: VolumeMountHost + ?Sized>(
    host: &H,
    target: &str,
) -> Result<(), VolumeMountError> {
    let target = with_trailing_separator(target);
    let wtarget = to_wide(&target)?;
    tracing::debug!("Removing mount point {target}");
    host.delete_volume_mount_point(&wtarget)
        .map_err(|source| VolumeMountError::Host {
            op: "Deleting volume mount point",
            path: target,
            source,
        })
}

#[cfg(windows)]
pub use win32::Win32VolumeMounts;

#[cfg(windows)]
#[allow(unsafe_code)]
mod win32 {
    use std::io;

    use windows_sys::Win32::Storage::FileSystem::{DeleteVolumeMountPointW, SetVolumeMountPointW};

    use super::VolumeMountHost;

    /// [`VolumeMountHost`] backed by the Win32 API.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Win32VolumeMounts;

    impl VolumeMountHost for Win32VolumeMounts {
        fn set_volume_mount_point(&self, target: &[u16], volume: &[u16]) -> io::Result<()> {
            // SAFETY: both are NUL-terminated buffers (see `to_wide`) that
            // outlive the call.
            let ok = unsafe { SetVolumeMountPointW(target.as_ptr(), volume.as_ptr()) };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn delete_volume_mount_point(&self, target: &[u16]) -> io::Result<()> {
            // SAFETY: as above.
            let ok = unsafe { DeleteVolumeMountPointW(target.as_ptr()) };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }
}
