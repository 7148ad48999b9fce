//! Source dispatch: pick a loader by path shape and collect raw rows.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use fiscal_recon::config::ColumnOverrides;
use fiscal_recon::model::{RawRow, RawValue};
use fiscal_recon::normalize::normalize_key;

use crate::csv::{decode_text, display_name};
use crate::error::IoError;
use crate::nfe::{self, Document};

/// A document that was skipped without failing the load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    pub origin: String,
    pub message: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub rows: Vec<RawRow>,
    pub warnings: Vec<LoadWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Delimited,
    Workbook,
    Xml,
}

fn kind_of(path: &Path) -> Result<Kind, IoError> {
    let meta = std::fs::metadata(path).map_err(|e| IoError::read(path, e))?;
    if meta.is_dir() {
        return Ok(Kind::Xml);
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" | "tsv" | "txt" => Ok(Kind::Delimited),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Kind::Workbook),
        "xml" | "zip" => Ok(Kind::Xml),
        _ => Err(IoError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Load a secondary source: CSV/TSV, a workbook, or NF-e XML.
pub fn load_source(path: &Path, columns: &ColumnOverrides) -> Result<Loaded, IoError> {
    match kind_of(path)? {
        Kind::Delimited => Ok(Loaded {
            rows: crate::csv::load(path, columns)?,
            warnings: Vec::new(),
        }),
        Kind::Workbook => Ok(Loaded {
            rows: crate::xlsx::load(path, columns)?,
            warnings: Vec::new(),
        }),
        Kind::Xml => load_xml(path, &[]),
    }
}

/// Load the canonical set: a `.xml`, a `.zip` of XMLs or a directory holding
/// either. Tabular files are accepted too, without cancellation detection.
///
/// A document is cancelled when its protocol says so, when a cancellation
/// event for its access key is in the same set, or when its file name starts
/// with one of `cancelled_prefixes` (case-insensitive).
pub fn load_canonical(path: &Path, cancelled_prefixes: &[String]) -> Result<Loaded, IoError> {
    match kind_of(path)? {
        Kind::Xml => load_xml(path, cancelled_prefixes),
        _ => load_source(path, &ColumnOverrides::default()),
    }
}

// ---------------------------------------------------------------------------
// XML sets
// ---------------------------------------------------------------------------

struct XmlFile {
    origin: String,
    /// Base file name, for the prefix rule.
    name: String,
    bytes: Vec<u8>,
}

fn load_xml(path: &Path, cancelled_prefixes: &[String]) -> Result<Loaded, IoError> {
    let mut warnings = Vec::new();
    let files = collect_xml(path, &mut warnings)?;

    let mut rows = Vec::new();
    let mut cancellations: Vec<(String, String)> = Vec::new();

    for file in files {
        match nfe::parse(&decode_text(file.bytes)) {
            Ok(Document::Invoice(inv)) => {
                let by_name = has_prefix(&file.name, cancelled_prefixes);
                rows.push(RawRow {
                    date: inv.date.map(RawValue::Text),
                    series: inv.series.map(RawValue::Text),
                    number: inv.number.map(RawValue::Text),
                    value: inv.value.map(RawValue::Text),
                    tax_base: inv.tax_base.map(RawValue::Text),
                    tax_amount: inv.tax_amount.map(RawValue::Text),
                    cancelled: inv.cancelled || by_name,
                    origin: Some(file.origin),
                });
            }
            Ok(Document::Cancellation { access_key }) => match nfe::key_parts(&access_key) {
                Some((series, number)) => {
                    cancellations.push((normalize_key(series), normalize_key(number)));
                }
                None => warnings.push(LoadWarning {
                    origin: file.origin,
                    message: format!("cancellation event with invalid access key '{access_key}'"),
                }),
            },
            Ok(Document::Other) => warnings.push(LoadWarning {
                origin: file.origin,
                message: "not an NF-e document".into(),
            }),
            Err(e) => warnings.push(LoadWarning {
                origin: file.origin,
                message: e.to_string(),
            }),
        }
    }

    apply_cancellations(&mut rows, &cancellations);

    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    tracing::debug!(
        "{}: {} documents, {} cancellation events, {} skipped",
        path.display(),
        rows.len(),
        cancellations.len(),
        warnings.len()
    );

    Ok(Loaded { rows, warnings })
}

fn apply_cancellations(rows: &mut [RawRow], cancellations: &[(String, String)]) {
    for (series, number) in cancellations {
        let mut matched = false;
        for row in rows.iter_mut() {
            if key_of(&row.series).as_ref() == Some(series) && key_of(&row.number).as_ref() == Some(number) {
                row.cancelled = true;
                matched = true;
            }
        }
        if !matched {
            tracing::debug!("cancellation event for {series}/{number} has no matching document");
        }
    }
}

fn key_of(cell: &Option<RawValue>) -> Option<String> {
    cell.as_ref().map(|v| normalize_key(&v.to_key_text()))
}

fn has_prefix(name: &str, prefixes: &[String]) -> bool {
    let upper = name.to_uppercase();
    prefixes
        .iter()
        .filter(|p| !p.is_empty())
        .any(|p| upper.starts_with(&p.to_uppercase()))
}

fn is_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn collect_xml(path: &Path, warnings: &mut Vec<LoadWarning>) -> Result<Vec<XmlFile>, IoError> {
    if !path.is_dir() {
        return if is_ext(path, "zip") {
            read_zip(path, warnings)
        } else {
            read_xml_file(path).map(|f| vec![f])
        };
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
        .map_err(|e| IoError::read(path, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let mut files = Vec::new();
    for entry in entries {
        let result = if is_ext(&entry, "xml") {
            read_xml_file(&entry).map(|f| vec![f])
        } else if is_ext(&entry, "zip") {
            read_zip(&entry, warnings)
        } else {
            tracing::debug!("skipping {}", entry.display());
            continue;
        };
        match result {
            Ok(mut found) => files.append(&mut found),
            Err(e) => warnings.push(LoadWarning {
                origin: display_name(&entry),
                message: e.to_string(),
            }),
        }
    }

    if files.is_empty() {
        tracing::warn!("{}: no XML documents found", path.display());
    }
    Ok(files)
}

fn read_xml_file(path: &Path) -> Result<XmlFile, IoError> {
    let bytes = std::fs::read(path).map_err(|e| IoError::read(path, e))?;
    let name = display_name(path);
    Ok(XmlFile {
        origin: name.clone(),
        name,
        bytes,
    })
}

fn read_zip(path: &Path, warnings: &mut Vec<LoadWarning>) -> Result<Vec<XmlFile>, IoError> {
    let archive_name = display_name(path);
    let file = std::fs::File::open(path).map_err(|e| IoError::read(path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| IoError::Zip(format!("{archive_name}: {e}")))?;

    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut member = match archive.by_index(i) {
            Ok(m) => m,
            Err(e) => {
                warnings.push(LoadWarning {
                    origin: format!("{archive_name}#{i}"),
                    message: e.to_string(),
                });
                continue;
            }
        };
        if member.is_dir() {
            continue;
        }
        let member_path = member.name().to_string();
        if !member_path.to_lowercase().ends_with(".xml") {
            continue;
        }

        let origin = format!("{archive_name}:{member_path}");
        let mut bytes = Vec::new();
        if let Err(e) = member.read_to_end(&mut bytes) {
            warnings.push(LoadWarning {
                origin,
                message: e.to_string(),
            });
            continue;
        }

        let name = member_path
            .rsplit('/')
            .next()
            .unwrap_or(member_path.as_str())
            .to_string();
        files.push(XmlFile { origin, name, bytes });
    }

    if files.is_empty() {
        warnings.push(LoadWarning {
            origin: archive_name,
            message: "archive contains no .xml files".into(),
        });
    }
    Ok(files)
}
