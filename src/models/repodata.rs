//! Conda repodata catalog model
//!
//! A [`Repodata`] document lists every package file of one channel subdir,
//! split into two filename-keyed maps: legacy `.tar.bz2` archives under
//! `packages` and `.conda` archives under `packages.conda`.
//!
//! [`RepodataRecord`] decodes the fields this crate needs and keeps every
//! other field in [`RepodataRecord::extra`], so a decode/encode cycle does
//! not lose data when upstream adds new keys.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CatalogError;

/// Canonical metadata filename served and fetched per channel subdir
pub const REPODATA_FILENAME: &str = "repodata.json";

/// Lightweight index some clients try before falling back to `repodata.json`
pub const CURRENT_REPODATA_FILENAME: &str = "current_repodata.json";

/// Field names decoded into typed [`RepodataRecord`] fields
const KNOWN_FIELDS: &[&str] = &[
    "subdir",
    "name",
    "version",
    "build",
    "build_number",
    "sha256",
    "md5",
    "size",
    "depends",
];

/// Archive format of a package file, one per record collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Legacy bzip2 tarball, stored under `packages`
    TarBz2,
    /// Zip-based `.conda` archive, stored under `packages.conda`
    Conda,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::TarBz2 => ".tar.bz2",
            ArchiveFormat::Conda => ".conda",
        }
    }
}

/// One package file entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepodataRecord {
    pub subdir: String,
    pub name: String,
    pub version: String,
    pub build: String,
    pub build_number: u64,
    pub sha256: Option<String>,
    pub md5: Option<String>,
    pub size: u64,
    /// Raw dependency specifiers such as `"python >=3.9,<3.13"`
    pub depends: Option<Vec<String>>,
    /// Every field not listed above, kept verbatim
    pub extra: Map<String, Value>,
}

impl RepodataRecord {
    /// The filename this record must be published under for `format`
    pub fn expected_filename(&self, format: ArchiveFormat) -> String {
        format!(
            "{}-{}-{}{}",
            self.name,
            self.version,
            self.build,
            format.extension()
        )
    }
}

#[derive(Deserialize)]
struct KnownFields {
    subdir: String,
    name: String,
    version: String,
    build: String,
    build_number: u64,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    md5: Option<String>,
    size: u64,
    #[serde(default)]
    depends: Option<Vec<String>>,
}

#[derive(Serialize)]
struct KnownFieldsRef<'a> {
    subdir: &'a str,
    name: &'a str,
    version: &'a str,
    build: &'a str,
    build_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha256: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    md5: Option<&'a str>,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    depends: Option<&'a [String]>,
}

impl<'de> Deserialize<'de> for RepodataRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut extra = Map::<String, Value>::deserialize(deserializer)?;

        let known: KnownFields =
            serde_json::from_value(Value::Object(extra.clone())).map_err(de::Error::custom)?;

        for field in KNOWN_FIELDS {
            extra.remove(*field);
        }

        Ok(Self {
            subdir: known.subdir,
            name: known.name,
            version: known.version,
            build: known.build,
            build_number: known.build_number,
            sha256: known.sha256,
            md5: known.md5,
            size: known.size,
            depends: known.depends,
            extra,
        })
    }
}

impl Serialize for RepodataRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let known = KnownFieldsRef {
            subdir: &self.subdir,
            name: &self.name,
            version: &self.version,
            build: &self.build,
            build_number: self.build_number,
            sha256: self.sha256.as_deref(),
            md5: self.md5.as_deref(),
            size: self.size,
            depends: self.depends.as_deref(),
        };

        // Typed fields overwrite anything of the same name left in `extra`
        let mut data = self.extra.clone();
        match serde_json::to_value(known).map_err(ser::Error::custom)? {
            Value::Object(fields) => data.extend(fields),
            _ => return Err(ser::Error::custom("record fields did not encode as an object")),
        }

        data.serialize(serializer)
    }
}

/// The `info` block of a repodata document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepodataInfo {
    pub subdir: String,
}

/// A full repodata document for one channel subdir
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repodata {
    #[serde(default)]
    pub repodata_version: u32,

    pub info: RepodataInfo,

    /// `.tar.bz2` records keyed by filename
    #[serde(default)]
    pub packages: BTreeMap<String, RepodataRecord>,

    /// `.conda` records keyed by filename
    #[serde(default, rename = "packages.conda")]
    pub packages_conda: BTreeMap<String, RepodataRecord>,
}

impl Repodata {
    /// Parse a repodata document from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Read and parse a repodata document from disk
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| CatalogError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_slice(&bytes).map_err(|e| CatalogError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// A document with the same version and info but no records
    pub fn empty_like(&self) -> Self {
        Self {
            repodata_version: self.repodata_version,
            info: self.info.clone(),
            packages: BTreeMap::new(),
            packages_conda: BTreeMap::new(),
        }
    }

    /// The record map holding archives of `format`
    pub fn records(&self, format: ArchiveFormat) -> &BTreeMap<String, RepodataRecord> {
        match format {
            ArchiveFormat::TarBz2 => &self.packages,
            ArchiveFormat::Conda => &self.packages_conda,
        }
    }

    pub fn records_mut(&mut self, format: ArchiveFormat) -> &mut BTreeMap<String, RepodataRecord> {
        match format {
            ArchiveFormat::TarBz2 => &mut self.packages,
            ArchiveFormat::Conda => &mut self.packages_conda,
        }
    }

    /// Iterate `(format, filename, record)` over both collections
    pub fn iter_records(&self) -> impl Iterator<Item = (ArchiveFormat, &String, &RepodataRecord)> {
        [ArchiveFormat::TarBz2, ArchiveFormat::Conda]
            .into_iter()
            .flat_map(move |format| {
                self.records(format)
                    .iter()
                    .map(move |(filename, record)| (format, filename, record))
            })
    }

    /// Total number of records in both collections
    pub fn record_count(&self) -> usize {
        self.packages.len() + self.packages_conda.len()
    }
}

/// Encode a value as JSON without HTML escaping
///
/// An empty `indent` produces compact output; otherwise every nesting level
/// is indented by `indent`. Output always ends with a newline. Object keys
/// come out sorted because records and their field bags are sorted maps.
pub fn encode_json<T: Serialize + ?Sized>(value: &T, indent: &str) -> serde_json::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if indent.is_empty() {
        serde_json::to_writer(&mut buffer, value)?;
    } else {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        value.serialize(&mut serializer)?;
    }
    buffer.push(b'\n');
    Ok(buffer)
}
