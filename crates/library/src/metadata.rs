// FILE: crates/library/src/metadata.rs

//! Metadata readers for ebook files

use folio_core::{EbookFormat, EbookMetadata, FolioError, Result};
use folio_resource::ResourceHandle;
use log::{debug, warn};

/// Leading bytes read for format sniffing
const HEADER_LEN: usize = 64;

/// Extracts metadata from one kind of ebook
pub trait MetadataReader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this reader understands `format` (`None` = unknown format)
    fn supports(&self, format: Option<EbookFormat>) -> bool;

    fn read(&self, handle: &ResourceHandle, format: Option<EbookFormat>) -> Result<EbookMetadata>;
}

/// Derives title and authors from file names like `Author - Title.epub`.
///
/// Several authors may be joined with `&` or `;`. Underscores count as
/// spaces. A name without ` - ` is all title.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileNameReader;

impl FileNameReader {
    pub fn new() -> Self {
        Self
    }

    /// Splits a file name into title and authors
    pub fn parse(file_name: &str) -> (String, Vec<String>) {
        let stem = match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file_name,
        };
        let stem = stem.replace('_', " ");

        match stem.split_once(" - ") {
            Some((authors, title)) if !authors.trim().is_empty() && !title.trim().is_empty() => {
                let authors = authors
                    .split(['&', ';'])
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect();
                (title.trim().to_string(), authors)
            }
            _ => (stem.trim().to_string(), Vec::new()),
        }
    }
}

impl MetadataReader for FileNameReader {
    fn name(&self) -> &'static str {
        "file-name"
    }

    fn supports(&self, _format: Option<EbookFormat>) -> bool {
        true
    }

    fn read(&self, handle: &ResourceHandle, format: Option<EbookFormat>) -> Result<EbookMetadata> {
        let (title, authors) = Self::parse(handle.display_name());
        if title.is_empty() {
            return Err(FolioError::Metadata {
                path: handle.path().to_string(),
                reason: "file name has no title".to_string(),
            });
        }
        Ok(EbookMetadata {
            title: Some(title),
            authors,
            format,
            ..Default::default()
        })
    }
}

/// Registry choosing a reader per format, with [`FileNameReader`] as the
/// fallback for formats nobody claims and for readers that fail.
pub struct MetadataReaders {
    readers: Vec<Box<dyn MetadataReader>>,
    fallback: Box<dyn MetadataReader>,
}

impl MetadataReaders {
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
            fallback: Box::new(FileNameReader),
        }
    }

    /// Registers a reader; earlier registrations win
    pub fn register(&mut self, reader: Box<dyn MetadataReader>) {
        self.readers.push(reader);
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Format from the extension, corrected by the file's magic bytes when
    /// they are readable
    pub fn detect_format(handle: &ResourceHandle) -> Option<EbookFormat> {
        let hint = EbookFormat::from_path(handle.path());
        match handle.read_header(HEADER_LEN) {
            Ok(header) => EbookFormat::from_magic_bytes(&header, hint).or(hint),
            Err(e) => {
                debug!("Cannot sniff {}: {}", handle, e);
                hint
            }
        }
    }

    pub fn read(&self, handle: &ResourceHandle) -> Result<EbookMetadata> {
        let format = Self::detect_format(handle);
        let reader = self.readers.iter().find(|r| r.supports(format));

        let mut metadata = match reader {
            Some(reader) => match reader.read(handle, format) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("{} reader failed on {}: {}", reader.name(), handle, e);
                    self.fallback.read(handle, format)?
                }
            },
            None => self.fallback.read(handle, format)?,
        };
        if metadata.format.is_none() {
            metadata.format = format;
        }
        Ok(metadata)
    }
}

impl Default for MetadataReaders {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetadataReaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataReaders")
            .field(
                "readers",
                &self.readers.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.name())
            .finish()
    }
}
