//! Location-table loader.

use std::collections::HashSet;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use thiserror::Error;
use totefleet_core::{LocationId, SiteRecord};

/// Errors raised while loading a location table.
#[derive(Debug, Error)]
pub enum SiteLoadError {
    /// The file could not be read.
    #[error("failed to read location table {path}")]
    Read {
        /// File that failed.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file is not a JSON array of site records.
    #[error("location table {path} is not valid JSON")]
    Parse {
        /// File that failed.
        path: Utf8PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Two records share an identifier.
    #[error("location {id} appears more than once in {path}")]
    DuplicateId {
        /// File that failed.
        path: Utf8PathBuf,
        /// Repeated identifier.
        id: LocationId,
    },
    /// A record has a coordinate outside the longitude/latitude ranges.
    #[error("location {id} in {path} has an invalid coordinate")]
    InvalidCoordinate {
        /// File that failed.
        path: Utf8PathBuf,
        /// Offending identifier.
        id: LocationId,
    },
}

/// Load site records from a JSON array at `path`.
///
/// # Errors
///
/// Returns [`SiteLoadError`] when the file is unreadable, malformed, repeats
/// an identifier or carries an invalid coordinate.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use totefleet_data::load_sites;
///
/// let sites = load_sites(Utf8Path::new("sites.json"))?;
/// println!("{} sites", sites.len());
/// # Ok::<(), totefleet_data::SiteLoadError>(())
/// ```
pub fn load_sites(path: &Utf8Path) -> Result<Vec<SiteRecord>, SiteLoadError> {
    let text = totefleet_fs::read_utf8(path).map_err(|source| SiteLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let sites = parse_sites(path, &text)?;
    info!("loaded {} sites from {path}", sites.len());
    Ok(sites)
}

fn parse_sites(path: &Utf8Path, text: &str) -> Result<Vec<SiteRecord>, SiteLoadError> {
    let sites: Vec<SiteRecord> =
        serde_json::from_str(text).map_err(|source| SiteLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let mut seen = HashSet::with_capacity(sites.len());
    for site in &sites {
        if !seen.insert(site.id) {
            return Err(SiteLoadError::DuplicateId {
                path: path.to_path_buf(),
                id: site.id,
            });
        }
        let c = site.location;
        if !(c.x.is_finite() && c.y.is_finite()) || c.x.abs() > 180.0 || c.y.abs() > 90.0 {
            return Err(SiteLoadError::InvalidCoordinate {
                path: path.to_path_buf(),
                id: site.id,
            });
        }
    }
    Ok(sites)
}
