//! Mount requests handed to us by the mount dispatcher.

/// Option prefix carrying the volume of an already mounted composite image.
pub const MOUNTED_CIM_FLAG: &str = "mountedCim=";
/// Option marking the mount writable.
pub const READ_WRITE_OPTION: &str = "rw";

/// Errors from interpreting a [`MountSpec`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MountSpecError {
    /// The source did not name a layer under a home directory.
    #[error("source {0:?} does not name a layer under a home directory")]
    MissingLayerId(String),
}

/// A filesystem mount request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountSpec {
    /// Path of the layer to mount, if any.
    pub source: Option<String>,
    /// Free-form mount options.
    pub options: Vec<String>,
    /// Where the layer will be mounted.
    pub target: Option<String>,
}

/// A content-addressable layer: a directory named `id` under `home`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerRef {
    /// Directory holding the layer.
    pub home: String,
    /// The layer directory name.
    pub id: String,
}

impl LayerRef {
    /// Split a layer path into its home directory and identifier.
    /// Both `\` and `/` are accepted as separators, and trailing
    /// separators are ignored.
    pub fn from_source(source: &str) -> Result<Self, MountSpecError> {
        let missing = || MountSpecError::MissingLayerId(source.to_string());
        let trimmed = source.trim_end_matches(['\\', '/']);
        let (home, id) = trimmed.rsplit_once(['\\', '/']).ok_or_else(missing)?;
        if home.is_empty() || id.is_empty() {
            return Err(missing());
        }
        // Keep a drive root such as `C:\` intact
        let home = if home.ends_with(':') {
            &trimmed[..home.len() + 1]
        } else {
            home
        };
        Ok(Self {
            home: home.to_string(),
            id: id.to_string(),
        })
    }
}

impl std::fmt::Display for LayerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (home {})", self.id, self.home)
    }
}

impl MountSpec {
    /// The volume of the mounted composite image, if the options carry one.
    /// When the flag is repeated the last occurrence wins; an empty value
    /// means no image.
    pub fn mounted_image(&self) -> Option<&str> {
        self.options
            .iter()
            .filter_map(|o| o.strip_prefix(MOUNTED_CIM_FLAG))
            .last()
            .filter(|v| !v.is_empty())
    }

    /// Whether any option is `rw`, compared case-insensitively.
    pub fn is_writable(&self) -> bool {
        self.options
            .iter()
            .any(|o| o.eq_ignore_ascii_case(READ_WRITE_OPTION))
    }

    /// The layer named by the source, if there is a non-empty source.
    pub fn layer_ref(&self) -> Option<Result<LayerRef, MountSpecError>> {
        self.source
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(LayerRef::from_source)
    }
}
