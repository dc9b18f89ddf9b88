//! Barcode symbologies and the requested format set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building a format set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("no recognized code formats in {0:?}")]
    NoRecognizedFormats(Vec<String>),
}

/// A barcode symbology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeFormat {
    Codabar,
    Code39,
    Code93,
    Code128,
    Ean8,
    Ean13,
    Itf,
    Upca,
    Upce,
    Aztec,
    DataMatrix,
    Pdf417,
    Qr,
}

impl CodeFormat {
    /// Every symbology, in host tag order.
    pub const ALL: [CodeFormat; 13] = [
        CodeFormat::Codabar,
        CodeFormat::Code39,
        CodeFormat::Code93,
        CodeFormat::Code128,
        CodeFormat::Ean8,
        CodeFormat::Ean13,
        CodeFormat::Itf,
        CodeFormat::Upca,
        CodeFormat::Upce,
        CodeFormat::Aztec,
        CodeFormat::DataMatrix,
        CodeFormat::Pdf417,
        CodeFormat::Qr,
    ];

    /// Parses a host tag such as `"ean13"`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.tag() == tag)
    }

    /// Host tag for this symbology.
    pub const fn tag(self) -> &'static str {
        match self {
            CodeFormat::Codabar => "codabar",
            CodeFormat::Code39 => "code39",
            CodeFormat::Code93 => "code93",
            CodeFormat::Code128 => "code128",
            CodeFormat::Ean8 => "ean8",
            CodeFormat::Ean13 => "ean13",
            CodeFormat::Itf => "itf",
            CodeFormat::Upca => "upca",
            CodeFormat::Upce => "upce",
            CodeFormat::Aztec => "aztec",
            CodeFormat::DataMatrix => "datamatrix",
            CodeFormat::Pdf417 => "pdf417",
            CodeFormat::Qr => "qr",
        }
    }

    /// Format bit used by mobile barcode detector SDKs.
    pub const fn native_code(self) -> u32 {
        match self {
            CodeFormat::Code128 => 0x0001,
            CodeFormat::Code39 => 0x0002,
            CodeFormat::Code93 => 0x0004,
            CodeFormat::Codabar => 0x0008,
            CodeFormat::DataMatrix => 0x0010,
            CodeFormat::Ean13 => 0x0020,
            CodeFormat::Ean8 => 0x0040,
            CodeFormat::Itf => 0x0080,
            CodeFormat::Qr => 0x0100,
            CodeFormat::Upca => 0x0200,
            CodeFormat::Upce => 0x0400,
            CodeFormat::Pdf417 => 0x0800,
            CodeFormat::Aztec => 0x1000,
        }
    }
}

impl std::fmt::Display for CodeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Non-empty, ordered, deduplicated set of requested symbologies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFormatSet {
    formats: Vec<CodeFormat>,
}

impl CodeFormatSet {
    /// Builds the set from host tags, dropping unknown ones.
    ///
    /// Fails if no tag is recognized.
    pub fn from_tags<I, S>(tags: I) -> Result<Self, FormatError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut formats = Vec::new();
        let mut seen = Vec::new();
        for tag in tags {
            let tag = tag.as_ref();
            seen.push(tag.to_string());
            match CodeFormat::from_tag(tag) {
                Some(format) if !formats.contains(&format) => formats.push(format),
                Some(_) => {}
                None => tracing::debug!(tag, "Dropping unknown code format"),
            }
        }

        if formats.is_empty() {
            return Err(FormatError::NoRecognizedFormats(seen));
        }
        Ok(Self { formats })
    }

    /// The first requested symbology.
    pub fn primary(&self) -> CodeFormat {
        self.formats[0]
    }

    /// Returns true if `format` was requested.
    pub fn contains(&self, format: CodeFormat) -> bool {
        self.formats.contains(&format)
    }

    /// Requested symbologies in request order.
    pub fn iter(&self) -> impl Iterator<Item = CodeFormat> + '_ {
        self.formats.iter().copied()
    }

    /// Number of requested symbologies.
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Returns true if no symbology was requested.
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Union of the native format bits.
    pub fn native_mask(&self) -> u32 {
        self.formats.iter().fold(0, |mask, f| mask | f.native_code())
    }
}
