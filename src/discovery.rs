//! Data directory discovery and file-name conventions.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

/// Manifest file that switches a data directory to the manifest loader.
pub const MANIFEST_FILE_NAME: &str = "data_manifest.yaml";

/// Currency assumed when none can be detected.
pub const DEFAULT_CURRENCY: &str = "nok";

/// Conventional data locations: the mounted production volume, then a local directory.
pub const DEFAULT_DATA_DIRS: [&str; 2] = ["/data", "./data"];

const SUPPORTED_CURRENCIES: &[&str] = &["NOK", "USD", "EUR", "GBP", "SEK", "DKK"];

const DATA_EXTENSIONS: &[&str] = &["parquet", "pq"];

/// Metadata of one discovered data file.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFileInfo {
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub size_mb: f64,
}

/// First directory holding data files, with its files sorted newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDirScan {
    pub dir: PathBuf,
    pub files: Vec<DataFileInfo>,
}

/// Scan each of `dirs` in order (non-recursively) and return the first one holding
/// `.parquet`/`.pq` files.
///
/// Missing or unreadable directories are skipped.
pub fn scan_data_dirs<I, P>(dirs: I) -> Option<DataDirScan>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for dir in dirs {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            continue;
        }

        let mut files: Vec<DataFileInfo> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && has_data_extension(entry.path()))
            .filter_map(|entry| {
                let meta = entry.metadata().ok()?;
                Some(DataFileInfo {
                    file_name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path().to_path_buf(),
                    size: meta.len(),
                    modified: meta.modified().ok()?,
                    size_mb: (meta.len() as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
                })
            })
            .collect();

        if files.is_empty() {
            continue;
        }
        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.path.cmp(&b.path)));
        tracing::info!(dir = %dir.display(), files = files.len(), "found data files");
        return Some(DataDirScan {
            dir: dir.to_path_buf(),
            files,
        });
    }
    None
}

fn has_data_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| DATA_EXTENSIONS.iter().any(|d| d.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Currency code embedded in a file name (`export_USD.parquet` is `usd`), `nok` otherwise.
pub fn detect_currency(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_uppercase())
        .unwrap_or_default();
    SUPPORTED_CURRENCIES
        .iter()
        .find(|c| name.contains(*c))
        .map(|c| c.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_from_file_name() {
        assert_eq!(detect_currency(Path::new("/data/export_USD_2024.parquet")), "usd");
        assert_eq!(detect_currency(Path::new("report-eur.pq")), "eur");
        assert_eq!(detect_currency(Path::new("/usd/plain.parquet")), "nok");
    }

    #[test]
    fn data_extensions() {
        assert!(has_data_extension(Path::new("a.PARQUET")));
        assert!(has_data_extension(Path::new("a.pq")));
        assert!(!has_data_extension(Path::new("a.csv")));
    }
}
