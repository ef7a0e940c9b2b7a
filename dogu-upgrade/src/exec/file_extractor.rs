use crate::{
    common::{constants::CUSTOM_RESOURCE_DIR, error::Result},
    exec::{command::ShellCommand, exec_pod::CommandTarget},
};
use std::collections::BTreeMap;
use tracing::debug;

/// Reads all files of a fixed directory inside a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileExtractor {
    directory: String,
}

impl Default for FileExtractor {
    fn default() -> Self {
        Self::new(CUSTOM_RESOURCE_DIR)
    }
}

impl FileExtractor {
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Returns the content of every file in the directory, keyed by full path. A missing or
    /// empty directory yields an empty map.
    pub async fn extract<T>(&self, target: &T) -> Result<BTreeMap<String, String>>
    where
        T: CommandTarget + ?Sized,
    {
        // The listing must not fail on a missing directory.
        let list = ShellCommand::new(
            "/bin/bash",
            ["-c".to_string(), format!("/bin/ls {}/ || true", self.directory)],
        );
        let listing = target.exec(&list).await?;

        let mut files = BTreeMap::new();
        if is_empty_listing(&listing) {
            debug!(directory = %self.directory, "No files to extract");
            return Ok(files);
        }

        for file in listing.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let path = format!("{}/{}", self.directory, file);
            let content = target
                .exec(&ShellCommand::new("/bin/cat", [path.clone()]))
                .await?;
            files.insert(path, content);
        }
        debug!(directory = %self.directory, count = files.len(), "Extracted files");

        Ok(files)
    }
}

fn is_empty_listing(listing: &str) -> bool {
    listing.trim().is_empty()
        || listing.contains("No such file or directory")
        || listing.contains("total 0")
}
