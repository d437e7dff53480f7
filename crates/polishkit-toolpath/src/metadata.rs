//! STL header sniffing
//!
//! Some CAD exporters write free-text hints into the 80-byte STL header:
//! vendor names, `UNITS=IN`, `CREATED=2024-03-01`, `PART=bracket`. This
//! module extracts them without touching the triangle data. A unit is only
//! reported when an explicit `UNITS` key names a recognised unit.

use polishkit_core::{LengthUnit, PolishError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Size of the STL header in bytes.
pub const HEADER_LEN: usize = 80;
/// Size of one binary triangle record.
pub const BINARY_RECORD_LEN: u64 = 50;

/// Physical encoding of an STL file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StlFormat {
    Binary,
    Ascii,
    Unknown,
}

/// Metadata recovered from an STL header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StlMetadata {
    /// Header carries vendor markers or recognised `KEY=VALUE` hints
    pub is_vendor_specific: bool,
    /// Exporting CAD system when one is named in the header
    pub cad_system: Option<String>,
    /// Unit named by an explicit `UNITS` hint
    pub unit: Option<LengthUnit>,
    pub creation_date: Option<String>,
    pub part_name: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    /// Export chord tolerance
    pub tolerance: Option<f64>,
    pub format: StlFormat,
    /// Triangle count declared by a binary header
    pub face_count: Option<u32>,
    pub file_size: u64,
}

impl Default for StlMetadata {
    fn default() -> Self {
        Self {
            is_vendor_specific: false,
            cad_system: None,
            unit: None,
            creation_date: None,
            part_name: None,
            author: None,
            version: None,
            tolerance: None,
            format: StlFormat::Unknown,
            face_count: None,
            file_size: 0,
        }
    }
}

impl StlMetadata {
    /// Sniff metadata from the leading bytes of a file.
    ///
    /// `file_size` is the total size of the file; `bytes` needs to hold at
    /// least the first 84 bytes for binary detection to work.
    pub fn from_bytes(bytes: &[u8], file_size: u64) -> Self {
        let header_end = bytes.len().min(HEADER_LEN);
        let header = String::from_utf8_lossy(&bytes[..header_end]).into_owned();

        let mut metadata = Self {
            file_size,
            ..Default::default()
        };

        let (format, face_count) = detect_format(bytes, file_size);
        metadata.format = format;
        metadata.face_count = face_count;

        let vendor = vendor_regex().find(&header).map(|m| m.as_str().to_string());
        let has_hints = hint_regex().is_match(&header);

        if vendor.is_some() || has_hints {
            metadata.is_vendor_specific = true;
            metadata.cad_system = vendor.map(|v| match v.as_str() {
                "UG" | "Unigraphics" | "Siemens" => "NX".to_string(),
                _ => v,
            });
            metadata.unit = capture(&header, "UNITS").and_then(|u| u.parse().ok());
            metadata.creation_date = date_regex()
                .captures(&header)
                .map(|c| c[1].to_string());
            metadata.part_name = capture(&header, "PART");
            metadata.author = capture(&header, "AUTHOR");
            metadata.version = capture(&header, "VERSION");
            metadata.tolerance = capture(&header, "TOLERANCE").and_then(|t| t.parse().ok());
        } else {
            metadata.cad_system = detect_other_cad(&header);
        }

        metadata
    }
}

/// Reads STL metadata from a file path.
pub trait MetadataReader {
    fn read_metadata(&self, path: &Path) -> Result<StlMetadata>;
}

/// [`MetadataReader`] that inspects only the first 84 bytes of the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderMetadataReader;

impl MetadataReader for HeaderMetadataReader {
    fn read_metadata(&self, path: &Path) -> Result<StlMetadata> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();

        let mut head = Vec::with_capacity(HEADER_LEN + 4);
        file.take(HEADER_LEN as u64 + 4).read_to_end(&mut head)?;

        let metadata = StlMetadata::from_bytes(&head, file_size);
        if metadata.format == StlFormat::Unknown && file_size < HEADER_LEN as u64 + 4 {
            return Err(PolishError::UnsupportedFormat(format!(
                "{} is too short to be an STL file ({} bytes)",
                path.display(),
                file_size
            )));
        }

        debug!(
            "STL metadata for {}: vendor={}, unit={:?}, format={:?}",
            path.display(),
            metadata.is_vendor_specific,
            metadata.unit,
            metadata.format
        );
        Ok(metadata)
    }
}

fn detect_format(bytes: &[u8], file_size: u64) -> (StlFormat, Option<u32>) {
    if bytes.len() >= HEADER_LEN + 4 {
        let count_bytes = [bytes[80], bytes[81], bytes[82], bytes[83]];
        let count = u32::from_le_bytes(count_bytes);
        let expected = HEADER_LEN as u64 + 4 + u64::from(count) * BINARY_RECORD_LEN;
        if expected == file_size {
            return (StlFormat::Binary, Some(count));
        }
    }

    let trimmed = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| &bytes[start..])
        .unwrap_or(&[]);
    if trimmed.len() >= 5 && trimmed[..5].eq_ignore_ascii_case(b"solid") {
        return (StlFormat::Ascii, None);
    }

    (StlFormat::Unknown, None)
}

fn capture(header: &str, key: &str) -> Option<String> {
    let re = key_value_regex();
    re.captures_iter(header)
        .find(|c| c[1].eq_ignore_ascii_case(key))
        .map(|c| c[2].trim().to_string())
        .filter(|v| !v.is_empty())
}

fn detect_other_cad(header: &str) -> Option<String> {
    const SYSTEMS: &[(&str, &[&str])] = &[
        ("SolidWorks", &["SolidWorks", "SOLIDWORKS"]),
        ("CATIA", &["CATIA"]),
        ("Creo", &["Pro/ENGINEER", "CREO", "Creo", "PTC"]),
        ("AutoCAD", &["AutoCAD", "ACAD"]),
        ("Inventor", &["Inventor"]),
        ("Fusion 360", &["Fusion"]),
    ];

    SYSTEMS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| header.contains(m)))
        .map(|(name, _)| name.to_string())
}

fn vendor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(NX|Siemens|Unigraphics|UG)\b").expect("invalid regex pattern")
    })
}

fn hint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(UNITS\s*=\s*[A-Z]+|CREATED\s*=\s*[0-9\-/]+|PART\s*=\s*\S+)")
            .expect("invalid regex pattern")
    })
}

fn key_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(UNITS|PART|AUTHOR|VERSION|TOLERANCE)\s*[=:]\s*([^\s;,\x00]+)")
            .expect("invalid regex pattern")
    })
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)CREATED\s*[=:]\s*(\d{4}[-/]\d{2}[-/]\d{2})").expect("invalid regex pattern")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_header(text: &str, faces: u32) -> (Vec<u8>, u64) {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        bytes.extend_from_slice(&faces.to_le_bytes());
        let size = HEADER_LEN as u64 + 4 + u64::from(faces) * BINARY_RECORD_LEN;
        (bytes, size)
    }

    #[test]
    fn test_plain_header_has_no_hints() {
        let (bytes, size) = binary_header("binary stl exported", 2);
        let meta = StlMetadata::from_bytes(&bytes, size);
        assert!(!meta.is_vendor_specific);
        assert_eq!(meta.unit, None);
        assert_eq!(meta.format, StlFormat::Binary);
        assert_eq!(meta.face_count, Some(2));
    }

    #[test]
    fn test_nx_header_with_units() {
        let (bytes, size) = binary_header("NX STL UNITS=IN CREATED=2024-03-01 PART=bracket_a", 12);
        let meta = StlMetadata::from_bytes(&bytes, size);
        assert!(meta.is_vendor_specific);
        assert_eq!(meta.cad_system.as_deref(), Some("NX"));
        assert_eq!(meta.unit, Some(LengthUnit::Inch));
        assert_eq!(meta.creation_date.as_deref(), Some("2024-03-01"));
        assert_eq!(meta.part_name.as_deref(), Some("bracket_a"));
    }

    #[test]
    fn test_key_value_hints_without_vendor() {
        let (bytes, size) = binary_header("UNITS=M; AUTHOR=qa; TOLERANCE=0.01", 1);
        let meta = StlMetadata::from_bytes(&bytes, size);
        assert!(meta.is_vendor_specific);
        assert_eq!(meta.cad_system, None);
        assert_eq!(meta.unit, Some(LengthUnit::Meter));
        assert_eq!(meta.author.as_deref(), Some("qa"));
        assert_eq!(meta.tolerance, Some(0.01));
    }

    #[test]
    fn test_unrecognised_unit_is_not_guessed() {
        let (bytes, size) = binary_header("Siemens UNITS=FURLONG", 1);
        let meta = StlMetadata::from_bytes(&bytes, size);
        assert!(meta.is_vendor_specific);
        assert_eq!(meta.unit, None);
    }

    #[test]
    fn test_other_cad_detection() {
        let (bytes, size) = binary_header("SOLIDWORKS export", 1);
        let meta = StlMetadata::from_bytes(&bytes, size);
        assert!(!meta.is_vendor_specific);
        assert_eq!(meta.cad_system.as_deref(), Some("SolidWorks"));
    }

    #[test]
    fn test_ascii_detection() {
        let text = b"solid part\n facet normal 0 0 1\n";
        let meta = StlMetadata::from_bytes(text, text.len() as u64);
        assert_eq!(meta.format, StlFormat::Ascii);
        assert_eq!(meta.face_count, None);
    }

    #[test]
    fn test_words_containing_markers_are_not_vendors() {
        let (bytes, size) = binary_header("PLUG HOUSING LENX", 1);
        let meta = StlMetadata::from_bytes(&bytes, size);
        assert!(!meta.is_vendor_specific);
    }
}
