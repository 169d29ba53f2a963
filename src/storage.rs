//! Acquisition files with clean feature flag handling.
//!
//! The CSV layout is:
//!
//! ```text
//! # {
//! #   "run_id": "...",
//! #   ...
//! # }
//! Freq,S11_real,S11_imag,S21_real,S21_imag
//! 1000000,0.12,-0.03,0.98,0.01
//! ```
//!
//! The `#` block is the acquisition metadata as pretty-printed JSON. Columns
//! follow the dataset's parameter order, real part first.

use crate::measurement::{AcquisitionMetadata, MeasurementDataset};
use chrono::{DateTime, Local};

/// File name for an acquisition taken at `timestamp`: `YYYYmmdd_HHMMSS.csv`.
pub fn default_file_name(timestamp: &DateTime<Local>) -> String {
    format!("{}.csv", timestamp.format("%Y%m%d_%H%M%S"))
}

/// Contents of a stored acquisition file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAcquisition {
    /// Metadata block, when the file has one.
    pub metadata: Option<AcquisitionMetadata>,
    /// Stored data.
    pub dataset: MeasurementDataset,
}

// ============================================================================
// CSV Writer
// ============================================================================

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use crate::error::{VnaError, VnaResult};
    use crate::measurement::{assemble, Acquisition, MeasurementParameter, TraceData};
    use std::fs::File;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tracing::info;

    const STIMULUS_COLUMN: &str = "Freq";

    fn storage_err(context: &str, path: &Path, e: impl std::fmt::Display) -> VnaError {
        VnaError::Storage(format!("{} {}: {}", context, path.display(), e))
    }

    /// Writes acquisitions as CSV files into one directory.
    #[derive(Debug, Clone)]
    pub struct CsvWriter {
        output_dir: PathBuf,
    }

    impl CsvWriter {
        /// Writer for `output_dir`. The directory is created on first write.
        pub fn new(output_dir: impl Into<PathBuf>) -> Self {
            Self {
                output_dir: output_dir.into(),
            }
        }

        /// Output directory.
        pub fn output_dir(&self) -> &Path {
            &self.output_dir
        }

        /// Write `acquisition` under a timestamped name and return its path.
        ///
        /// A numeric suffix is added when a file of that name already exists.
        pub fn write(&self, acquisition: &Acquisition) -> VnaResult<PathBuf> {
            let name = default_file_name(&acquisition.metadata.timestamp.with_timezone(&Local));
            self.write_as(acquisition, &name)
        }

        /// Write `acquisition` as `name` (`.csv` appended if missing).
        ///
        /// Existing files are never overwritten; a numeric suffix is added instead.
        pub fn write_as(&self, acquisition: &Acquisition, name: &str) -> VnaResult<PathBuf> {
            let stem = name.strip_suffix(".csv").unwrap_or(name);
            if stem.is_empty() || stem.contains(['/', '\\']) {
                return Err(VnaError::Storage(format!("Invalid file name '{}'", name)));
            }

            if !self.output_dir.exists() {
                std::fs::create_dir_all(&self.output_dir).map_err(|e| {
                    storage_err("Failed to create storage directory", &self.output_dir, e)
                })?;
            }

            let mut path = self.output_dir.join(format!("{}.csv", stem));
            let mut n = 1;
            while path.exists() {
                path = self.output_dir.join(format!("{}_{}.csv", stem, n));
                n += 1;
            }

            write_csv(&path, &acquisition.dataset, Some(&acquisition.metadata))?;
            info!(path = %path.display(), points = acquisition.dataset.len(), "Acquisition written");
            Ok(path)
        }
    }

    /// Write `dataset` to `path`, preceded by the metadata block if given.
    pub fn write_csv(
        path: &Path,
        dataset: &MeasurementDataset,
        metadata: Option<&AcquisitionMetadata>,
    ) -> VnaResult<()> {
        let mut file =
            File::create(path).map_err(|e| storage_err("Failed to create CSV file", path, e))?;

        if let Some(metadata) = metadata {
            let json_string = serde_json::to_string_pretty(metadata)
                .map_err(|e| storage_err("Failed to serialize metadata for", path, e))?;
            for line in json_string.lines() {
                file.write_all(b"# ")
                    .and_then(|_| file.write_all(line.as_bytes()))
                    .and_then(|_| file.write_all(b"\n"))
                    .map_err(|e| storage_err("Failed to write metadata to", path, e))?;
            }
        }

        let columns: Vec<_> = dataset.columns().collect();
        let mut writer = csv::Writer::from_writer(file);

        let mut header = vec![STIMULUS_COLUMN.to_string()];
        header.extend(columns.iter().map(|(key, _)| key.column_name()));
        writer
            .write_record(&header)
            .map_err(|e| storage_err("Failed to write CSV header to", path, e))?;

        for (i, freq) in dataset.stimulus().iter().enumerate() {
            let mut record = Vec::with_capacity(columns.len() + 1);
            record.push(freq.to_string());
            record.extend(columns.iter().map(|(_, values)| values[i].to_string()));
            writer
                .write_record(&record)
                .map_err(|e| storage_err("Failed to write CSV row to", path, e))?;
        }

        writer
            .flush()
            .map_err(|e| storage_err("Failed to flush CSV file", path, e))?;
        Ok(())
    }

    /// Read a file written by [`write_csv`].
    pub fn read_csv(path: &Path) -> VnaResult<StoredAcquisition> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| storage_err("Failed to read CSV file", path, e))?;

        let json: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix('#'))
            .map(|l| l.strip_prefix(' ').unwrap_or(l))
            .collect();
        let metadata = if json.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(&json.join("\n"))
                    .map_err(|e| storage_err("Invalid metadata block in", path, e))?,
            )
        };

        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| storage_err("Failed to read CSV header from", path, e))?
            .clone();
        let parameters = parse_header(&headers).map_err(|e| storage_err("Bad header in", path, e))?;

        let mut stimulus = Vec::new();
        let mut columns = vec![Vec::new(); parameters.len() * 2];
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| storage_err("Failed to read CSV row from", path, e))?;
            if record.len() != headers.len() {
                return Err(storage_err(
                    "Wrong field count",
                    path,
                    format!("row {} has {} fields, expected {}", row + 1, record.len(), headers.len()),
                ));
            }
            let mut values = record.iter().map(|field| {
                field.parse::<f64>().map_err(|e| {
                    storage_err("Invalid number in", path, format!("row {}: {:?}: {}", row + 1, field, e))
                })
            });
            if let Some(freq) = values.next() {
                stimulus.push(freq?);
            }
            for (column, value) in columns.iter_mut().zip(values) {
                column.push(value?);
            }
        }

        let mut columns = columns.into_iter();
        let traces = parameters
            .into_iter()
            .map(|parameter| {
                let real = columns.next().unwrap_or_default();
                let imag = columns.next().unwrap_or_default();
                TraceData::new(parameter, real, imag)
            })
            .collect();

        Ok(StoredAcquisition {
            metadata,
            dataset: assemble(stimulus, traces)?,
        })
    }

    /// `Freq` followed by `{P}_real,{P}_imag` pairs.
    fn parse_header(headers: &csv::StringRecord) -> Result<Vec<MeasurementParameter>, String> {
        let mut fields = headers.iter();
        match fields.next() {
            Some(first) if first.eq_ignore_ascii_case(STIMULUS_COLUMN) => {}
            other => return Err(format!("first column must be '{}', found {:?}", STIMULUS_COLUMN, other)),
        }

        let rest: Vec<&str> = fields.collect();
        if rest.is_empty() || rest.len() % 2 != 0 {
            return Err(format!("expected real/imag column pairs, found {} columns", rest.len()));
        }

        rest.chunks_exact(2)
            .map(|pair| {
                let real = pair[0]
                    .strip_suffix("_real")
                    .ok_or_else(|| format!("expected '<param>_real', found '{}'", pair[0]))?;
                let imag = pair[1]
                    .strip_suffix("_imag")
                    .ok_or_else(|| format!("expected '<param>_imag', found '{}'", pair[1]))?;
                if real != imag {
                    return Err(format!("column pair '{}'/'{}' names two parameters", pair[0], pair[1]));
                }
                real.parse::<MeasurementParameter>().map_err(|e| e.to_string())
            })
            .collect()
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;
    use crate::error::{VnaError, VnaResult};
    use crate::measurement::Acquisition;
    use std::path::{Path, PathBuf};

    /// Placeholder when the `storage_csv` feature is disabled.
    #[derive(Debug, Clone)]
    pub struct CsvWriter {
        output_dir: PathBuf,
    }

    impl CsvWriter {
        /// Writer for `output_dir`.
        pub fn new(output_dir: impl Into<PathBuf>) -> Self {
            Self {
                output_dir: output_dir.into(),
            }
        }

        /// Output directory.
        pub fn output_dir(&self) -> &Path {
            &self.output_dir
        }

        /// Always fails: `storage_csv` is disabled.
        pub fn write(&self, _acquisition: &Acquisition) -> VnaResult<PathBuf> {
            Err(VnaError::FeatureNotEnabled("storage_csv".to_string()))
        }

        /// Always fails: `storage_csv` is disabled.
        pub fn write_as(&self, _acquisition: &Acquisition, _name: &str) -> VnaResult<PathBuf> {
            Err(VnaError::FeatureNotEnabled("storage_csv".to_string()))
        }
    }

    /// Always fails: `storage_csv` is disabled.
    pub fn write_csv(
        _path: &Path,
        _dataset: &MeasurementDataset,
        _metadata: Option<&AcquisitionMetadata>,
    ) -> VnaResult<()> {
        Err(VnaError::FeatureNotEnabled("storage_csv".to_string()))
    }

    /// Always fails: `storage_csv` is disabled.
    pub fn read_csv(_path: &Path) -> VnaResult<StoredAcquisition> {
        Err(VnaError::FeatureNotEnabled("storage_csv".to_string()))
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::{read_csv, write_csv, CsvWriter};

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::{read_csv, write_csv, CsvWriter};
