//! Lines of a linker manifest (`importcfg.link`).
//!
//! Only `packagefile NAME=FILE` is interpreted; every other directive is
//! carried verbatim.

use crate::{TraceError, TraceResult};

/// Directive naming a compiled package archive
pub const PACKAGEFILE_DIRECTIVE: &str = "packagefile";

/// One `packagefile NAME=FILE` directive
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageFile {
    /// Import path of the package (e.g. "fmt", "main")
    pub package: String,
    /// Path of the compiled archive
    pub file: String,
}

impl PackageFile {
    pub fn new(package: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            file: file.into(),
        }
    }

    /// Render back to manifest syntax
    pub fn to_line(&self) -> String {
        format!("{} {}={}", PACKAGEFILE_DIRECTIVE, self.package, self.file)
    }
}

/// A manifest line after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    PackageFile(PackageFile),
    /// Any other directive (`modinfo`, `packageshlib`, ...), kept as-is
    Other(String),
}

/// Classify one manifest line.
///
/// A line starting with `packagefile` must be exactly
/// `packagefile NAME=FILE`; anything else starting with that word is a
/// format error rather than an opaque line.
pub fn classify_line(line: &str) -> TraceResult<ManifestEntry> {
    if !line.starts_with(PACKAGEFILE_DIRECTIVE) {
        return Ok(ManifestEntry::Other(line.to_string()));
    }

    let malformed = || TraceError::MalformedPackageFile {
        line: line.to_string(),
    };

    let (directive, argument) = line.split_once(' ').ok_or_else(malformed)?;
    if directive != PACKAGEFILE_DIRECTIVE {
        return Err(malformed());
    }
    let (package, file) = argument.split_once('=').ok_or_else(malformed)?;

    Ok(ManifestEntry::PackageFile(PackageFile::new(package, file)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_packagefile() {
        let entry = classify_line("packagefile fmt=/root/.cache/go-build/ab/abcd-d").unwrap();
        assert_eq!(
            entry,
            ManifestEntry::PackageFile(PackageFile::new("fmt", "/root/.cache/go-build/ab/abcd-d"))
        );
    }

    #[test]
    fn test_classify_keeps_equals_in_file() {
        let entry = classify_line("packagefile main=/tmp/a=b/main.a").unwrap();
        assert_eq!(
            entry,
            ManifestEntry::PackageFile(PackageFile::new("main", "/tmp/a=b/main.a"))
        );
    }

    #[test]
    fn test_classify_other_lines_verbatim() {
        let line = "modinfo \"0w\\xaf\\f\\x92t\\b\\x02A\\t\"";
        assert_eq!(classify_line(line).unwrap(), ManifestEntry::Other(line.to_string()));
        assert_eq!(
            classify_line("# import config").unwrap(),
            ManifestEntry::Other("# import config".to_string())
        );
    }

    #[test]
    fn test_classify_packagefile_without_equals_fails() {
        let err = classify_line("packagefile fmt").unwrap_err();
        assert!(matches!(err, TraceError::MalformedPackageFile { .. }));
    }

    #[test]
    fn test_classify_packagefile_without_argument_fails() {
        assert!(classify_line("packagefile").is_err());
    }

    #[test]
    fn test_classify_glued_directive_fails() {
        assert!(classify_line("packagefilefmt=/x.a").is_err());
    }

    #[test]
    fn test_to_line() {
        assert_eq!(
            PackageFile::new("fmt", "/c/fmt.a").to_line(),
            "packagefile fmt=/c/fmt.a"
        );
    }
}
