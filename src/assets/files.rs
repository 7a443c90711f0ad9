//! Chart archive download and README/values/schema extraction

use crate::error::AssetError;
use crate::index::{join_url_path, parse_repo_url};
use crate::models::{ChartVersion, Repo};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use tar::Archive;

pub const README_FILE: &str = "README.md";
pub const VALUES_FILE: &str = "values.yaml";
pub const SCHEMA_FILE: &str = "values.schema.json";

/// Archive entry names looked up for a chart: `<chart>/README.md`,
/// `<chart>/values.yaml` and `<chart>/values.schema.json`.
pub fn chart_file_names(chart_name: &str) -> [String; 3] {
    [
        format!("{chart_name}/{README_FILE}"),
        format!("{chart_name}/{VALUES_FILE}"),
        format!("{chart_name}/{SCHEMA_FILE}"),
    ]
}

/// Download URL of a chart version archive.
///
/// The first listed URL wins. Absolute URLs are used as-is; relative ones
/// are appended to the path of the repository URL.
///
/// ```rust
/// use chart_repo::assets::files::chart_tarball_url;
/// use chart_repo::models::{ChartVersion, Repo};
///
/// let repo = Repo::new("stable", "http://testrepo.com");
/// let version = ChartVersion {
///     version: "0.1.0".to_string(),
///     app_version: String::new(),
///     created: Default::default(),
///     digest: String::new(),
///     urls: vec!["wordpress-0.1.0.tgz".to_string()],
/// };
/// assert_eq!(
///     chart_tarball_url(&repo, &version).unwrap(),
///     "http://testrepo.com/wordpress-0.1.0.tgz"
/// );
/// ```
pub fn chart_tarball_url(repo: &Repo, version: &ChartVersion) -> Result<String, AssetError> {
    let source = version
        .urls
        .first()
        .ok_or_else(|| AssetError::DownloadError {
            url: String::new(),
            message: format!("chart version {} lists no download URL", version.version),
        })?;

    if parse_repo_url(source).is_ok() {
        return Ok(source.trim().to_string());
    }

    let base = parse_repo_url(&repo.url).map_err(|e| AssetError::DownloadError {
        url: source.clone(),
        message: e.to_string(),
    })?;
    Ok(join_url_path(&base, source).to_string())
}

/// Extracts the named files from a gzip-compressed tar stream.
///
/// Names are matched case-insensitively against full entry paths. Files that
/// are absent from the archive are absent from the result.
pub fn extract_files_from_tarball(
    filenames: &[String],
    tarball: impl Read,
) -> Result<HashMap<String, String>, AssetError> {
    extract_files_from_archive(filenames, &mut Archive::new(GzDecoder::new(tarball)))
}

/// Same as [`extract_files_from_tarball`] on an already opened archive.
pub fn extract_files_from_archive<R: Read>(
    filenames: &[String],
    archive: &mut Archive<R>,
) -> Result<HashMap<String, String>, AssetError> {
    let mut found = HashMap::new();

    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        let entry_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let Some(wanted) = filenames
            .iter()
            .find(|name| name.eq_ignore_ascii_case(&entry_name))
        else {
            continue;
        };

        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(archive_error)?;
        found.insert(
            wanted.clone(),
            String::from_utf8_lossy(&content).into_owned(),
        );

        if found.len() == filenames.len() {
            break;
        }
    }

    Ok(found)
}

fn archive_error(err: std::io::Error) -> AssetError {
    if err.kind() == ErrorKind::UnexpectedEof {
        AssetError::UnexpectedEof {
            message: err.to_string(),
        }
    } else {
        AssetError::ArchiveDecodeError {
            message: err.to_string(),
        }
    }
}
