use crate::render::render;
use crate::report::Report;
use harvest_core::HarvestError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Same-second reruns get `_1`, `_2`, ... appended before giving up.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Writes rendered reports into one directory, never replacing an existing file.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{platform}_{command}_{YYYYmmdd_HHMMSS}`, without extension.
    pub fn file_stem(report: &Report) -> String {
        format!(
            "{}_{}_{}",
            report.platform.slug(),
            report.command.as_str(),
            report.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    pub fn write(&self, report: &Report) -> Result<PathBuf, HarvestError> {
        fs::create_dir_all(&self.dir).map_err(|source| HarvestError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let contents = render(report);
        let (path, mut file) = self.create_unique(&Self::file_stem(report))?;

        if let Err(source) = file.write_all(contents.as_bytes()).and_then(|_| file.sync_all()) {
            drop(file);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove partial report {}: {}", path.display(), e);
            }
            return Err(HarvestError::Write { path, source });
        }

        info!(
            "Wrote report {} ({} records, {} bytes)",
            path.display(),
            report.record_count(),
            contents.len()
        );
        Ok(path)
    }

    fn create_unique(&self, stem: &str) -> Result<(PathBuf, File), HarvestError> {
        let mut last_path = self.dir.join(format!("{stem}.md"));
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.md")
            } else {
                format!("{stem}_{attempt}.md")
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("Report name {} taken, trying next suffix", path.display());
                    last_path = path;
                }
                Err(source) => return Err(HarvestError::Write { path, source }),
            }
        }

        Err(HarvestError::Write {
            path: last_path,
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("no free report name after {MAX_NAME_ATTEMPTS} attempts"),
            ),
        })
    }
}
