//! Moves inline content (vcl, log formats, response bodies) out of the configuration into files
//!
//! Files live in one subdirectory per [Category] below the working directory and are referenced from the
//! configuration as `file("./{category}/{filename}")`.
use crate::prop::normalize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Vcl,
    LogFormat,
    Content,
}

impl Category {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Vcl => "vcl",
            Category::LogFormat => "logformat",
            Category::Content => "content",
        }
    }
}

/// Location of an externalized piece of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    pub category: Category,
    pub filename: String,
}

impl ContentFile {
    pub fn snippet(name: &str) -> Self {
        Self::new(Category::Vcl, format!("snippet_{}.vcl", normalize(name)))
    }

    pub fn vcl(name: &str) -> Self {
        Self::new(Category::Vcl, format!("{}.vcl", normalize(name)))
    }

    pub fn dynamic_snippet(name: &str) -> Self {
        Self::new(Category::Vcl, format!("dsnippet_{}.vcl", normalize(name)))
    }

    /// `.json` if the format parses as json, `.txt` otherwise
    pub fn log_format(name: &str, format: &[u8]) -> Self {
        let extension = if is_json(format) { "json" } else { "txt" };
        Self::new(
            Category::LogFormat,
            format!("{}.{extension}", normalize(name)),
        )
    }

    pub fn response_object(name: &str) -> Self {
        Self::new(Category::Content, format!("{}.txt", normalize(name)))
    }

    fn new(category: Category, filename: String) -> Self {
        Self { category, filename }
    }

    /// Path relative to the working directory as used in `file(...)`
    pub fn reference(&self) -> String {
        format!("./{}/{}", self.category.dir_name(), self.filename)
    }

    pub fn path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.category.dir_name()).join(&self.filename)
    }

    pub fn save(&self, base_dir: &Path, content: &[u8]) -> Result<(), ExternalizeError> {
        save(base_dir, self.category, &self.filename, content)
    }
}

fn is_json(content: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(content).is_ok()
}

/// Writes `content` to `{base_dir}/{category}/{filename}`, creating the category directory if needed
///
/// Existing files are overwritten.
pub fn save(
    base_dir: &Path,
    category: Category,
    filename: &str,
    content: &[u8],
) -> Result<(), ExternalizeError> {
    let dir = base_dir.join(category.dir_name());
    create_dir(&dir).map_err(|source| ExternalizeError::Io {
        path: dir.clone(),
        source,
    })?;

    let path = dir.join(filename);
    tracing::debug!(path=%path.display(), bytes = content.len(), "writing content file");
    std::fs::write(&path, content).map_err(|source| ExternalizeError::Io { path, source })
}

#[cfg(unix)]
fn create_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(dir)
}

#[cfg(not(unix))]
fn create_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[derive(thiserror::Error, Debug)]
pub enum ExternalizeError {
    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_names() {
        assert_eq!(
            ContentFile::snippet("Set Headers").reference(),
            "./vcl/snippet_set_headers.vcl"
        );
        assert_eq!(ContentFile::vcl("Main").reference(), "./vcl/main.vcl");
        assert_eq!(
            ContentFile::dynamic_snippet("my_dyn").reference(),
            "./vcl/dsnippet_my_dyn.vcl"
        );
        assert_eq!(
            ContentFile::response_object("Not Found").reference(),
            "./content/not_found.txt"
        );
    }

    #[test]
    fn log_format_extension_follows_content() {
        let json = br#"{"ts": "%{begin:%Y-%m-%dT%H:%M:%S}t", "status": "%>s"}"#;
        assert_eq!(
            ContentFile::log_format("S3 Logs", json).reference(),
            "./logformat/s3_logs.json"
        );
        assert_eq!(
            ContentFile::log_format("syslog", b"%h %l %u %t \"%r\" %>s").reference(),
            "./logformat/syslog.txt"
        );
    }

    #[test]
    fn save_creates_directory_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let file = ContentFile::vcl("main");

        file.save(dir.path(), b"first").unwrap();
        file.save(dir.path(), b"second").unwrap();

        let path = file.path(dir.path());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dir.path().join("vcl"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777 & !0o022, 0o755 & !0o022);
        }
    }

    #[test]
    fn save_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the category directory should be
        std::fs::write(dir.path().join("content"), b"").unwrap();

        let error = save(dir.path(), Category::Content, "a.txt", b"x").unwrap_err();
        assert!(error.to_string().contains("content"));
    }
}
