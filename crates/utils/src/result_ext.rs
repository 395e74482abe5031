use std::fmt::Display;

/// Extension trait for results whose failure is reported but not propagated.
pub trait ResultExt<T, E: Display> {
    /// Log the error (if any) at error level, prefixed with `what`,
    /// and convert into an `Option`.
    fn log_err(self, what: &str) -> Option<T>;
    /// Like [`ResultExt::log_err`], but at warn level.
    fn log_warn(self, what: &str) -> Option<T>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log_err(self, what: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!("{what}: {e:#}");
                None
            }
        }
    }

    #[track_caller]
    fn log_warn(self, what: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("{what}: {e:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_err() {
        let ok: Result<u32, anyhow::Error> = Ok(42);
        assert_eq!(ok.log_err("ignored"), Some(42));
        let err: Result<u32, anyhow::Error> = Err(anyhow::anyhow!("boom"));
        assert_eq!(err.log_warn("ignored"), None);
    }
}
