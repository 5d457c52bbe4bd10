//! Local temporary files backing staged partitions.

use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};

use super::StagingError;

/// One local file and the object name it is staged under.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    object: String,
}

impl StagedFile {
    fn create(prefix: &str, dir: &Path) -> Result<Self, StagingError> {
        let path = Builder::new()
            .prefix(prefix)
            .tempfile_in(dir)
            .map_err(|err| StagingError::Io {
                path: dir.display().to_string(),
                message: err.to_string(),
            })?
            .into_temp_path();
        let object = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| StagingError::Io {
                path: path.display().to_string(),
                message: String::from("temporary file has no name"),
            })?;
        Ok(Self { path, object })
    }

    /// Local path; the file is removed when this value drops.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Object name in the staging container.
    #[must_use]
    pub fn object(&self) -> &str {
        &self.object
    }
}

/// Input and output files for every partition of a batch.
#[derive(Debug)]
pub struct StagingFiles {
    inputs: Vec<StagedFile>,
    outputs: Vec<StagedFile>,
}

impl StagingFiles {
    /// Creates `count` input files (`input-{n}-…`) and `count` output files
    /// (`output-{n}-…`) in `dir`, numbered from one.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::Io`] when a file cannot be created.
    pub fn allocate(count: usize, dir: &Path) -> Result<Self, StagingError> {
        let mut inputs = Vec::with_capacity(count);
        let mut outputs = Vec::with_capacity(count);
        for number in 1..=count {
            inputs.push(StagedFile::create(&format!("input-{number}-"), dir)?);
            outputs.push(StagedFile::create(&format!("output-{number}-"), dir)?);
        }
        Ok(Self { inputs, outputs })
    }

    /// Partition input files in order.
    #[must_use]
    pub fn inputs(&self) -> &[StagedFile] {
        &self.inputs
    }

    /// Partition output files in order.
    #[must_use]
    pub fn outputs(&self) -> &[StagedFile] {
        &self.outputs
    }

    /// Paths of the input files.
    #[must_use]
    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.inputs.iter().map(|file| file.path().to_path_buf()).collect()
    }

    /// Paths of the output files.
    #[must_use]
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(|file| file.path().to_path_buf()).collect()
    }

    /// Number of partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Whether no partitions were allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}
