//! Process exit statuses shared by both binaries

/// Stable exit codes.
///
/// Failures of a child process (build tool, `env -json`, linker) are not
/// listed: those propagate the child's own status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Success = 0,
    /// Internal or I/O failure
    Fatal = 1,
    /// Bad flags, bad config, or a build command that cannot be captured
    Usage = 2,
    /// No cached invocation for the fingerprint
    CacheMiss = 3,
    /// SQLite failure
    Storage = 4,
    /// Trace or manifest content not in the expected shape
    TraceFormat = 5,
    /// Warming loop never saw every archive inside the build cache
    CacheUnstable = 6,
    /// Trace contained no link invocation
    NothingToCache = 7,
}

impl ExitCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

/// Exit status for a store failure: bad trace content inside a capture is
/// a format error, a refused append a usage error, everything else a
/// storage error.
pub fn store_exit_code(err: &relink_store::StoreError) -> i32 {
    match err {
        relink_store::StoreError::Trace(_) => ExitCode::TraceFormat.as_i32(),
        relink_store::StoreError::InvalidPolicy(_) | relink_store::StoreError::CaptureConflict { .. } => {
            ExitCode::Usage.as_i32()
        }
        _ => ExitCode::Storage.as_i32(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Fatal.as_i32(), 1);
        assert_eq!(ExitCode::Usage.as_i32(), 2);
        assert_eq!(ExitCode::CacheMiss.as_i32(), 3);
        assert_eq!(ExitCode::Storage.as_i32(), 4);
        assert_eq!(ExitCode::TraceFormat.as_i32(), 5);
        assert_eq!(ExitCode::CacheUnstable.as_i32(), 6);
        assert_eq!(ExitCode::NothingToCache.as_i32(), 7);
    }

    #[test]
    fn test_store_exit_code() {
        let err = relink_store::StoreError::Trace(relink_trace::TraceError::MalformedPackageFile {
            line: "packagefile broken".to_string(),
        });
        assert_eq!(store_exit_code(&err), 5);
        let err = relink_store::StoreError::Canonical("bad".to_string());
        assert_eq!(store_exit_code(&err), 4);
        let err = relink_store::StoreError::CaptureConflict {
            program: "hello".to_string(),
            invocation_id: 1,
        };
        assert_eq!(store_exit_code(&err), 2);
    }
}
