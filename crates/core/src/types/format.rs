//! Ebook format detection

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ResourcePath;

/// Ebook formats recognised by the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EbookFormat {
    // === Reflowable ===
    /// EPUB - zipped XHTML with an OPF package document
    Epub,
    /// Mobipocket
    Mobi,
    /// Kindle Format 8
    Azw3,
    /// FictionBook XML
    Fb2,
    /// Rich Text Format
    Rtf,
    /// Plain text
    Txt,

    // === Fixed layout ===
    /// Portable Document Format
    Pdf,
    /// DjVu scanned documents
    Djvu,

    // === Comic archives ===
    /// Zip archive of page images
    Cbz,
    /// Rar archive of page images
    Cbr,
}

impl EbookFormat {
    /// Returns all supported formats
    pub fn all() -> &'static [Self] {
        &[
            Self::Epub,
            Self::Mobi,
            Self::Azw3,
            Self::Fb2,
            Self::Rtf,
            Self::Txt,
            Self::Pdf,
            Self::Djvu,
            Self::Cbz,
            Self::Cbr,
        ]
    }

    /// Detects format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        match ext.as_str() {
            "epub" => Some(Self::Epub),
            "mobi" | "prc" => Some(Self::Mobi),
            "azw" | "azw3" => Some(Self::Azw3),
            "fb2" => Some(Self::Fb2),
            "rtf" => Some(Self::Rtf),
            "txt" => Some(Self::Txt),
            "pdf" => Some(Self::Pdf),
            "djvu" | "djv" => Some(Self::Djvu),
            "cbz" => Some(Self::Cbz),
            "cbr" => Some(Self::Cbr),
            _ => None,
        }
    }

    /// Detects format from a resource's extension
    pub fn from_path(path: &ResourcePath) -> Option<Self> {
        path.extension().as_deref().and_then(Self::from_extension)
    }

    /// Detects format from the first bytes of a file.
    ///
    /// Zip-based formats share a signature, so `hint` (usually the
    /// extension-derived format) decides between EPUB and CBZ.
    pub fn from_magic_bytes(header: &[u8], hint: Option<Self>) -> Option<Self> {
        if header.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }
        if header.starts_with(b"AT&TFORM") {
            return Some(Self::Djvu);
        }
        if header.starts_with(b"Rar!") {
            return Some(Self::Cbr);
        }
        if header.starts_with(b"{\\rtf") {
            return Some(Self::Rtf);
        }
        if header.starts_with(b"PK\x03\x04") {
            // EPUB stores its mimetype uncompressed as the first entry
            if header.len() >= 58 && &header[30..38] == b"mimetype" {
                return Some(Self::Epub);
            }
            return match hint {
                Some(Self::Cbz) => Some(Self::Cbz),
                _ => Some(Self::Epub),
            };
        }
        if header.len() >= 68 && (&header[60..68] == b"BOOKMOBI" || &header[60..68] == b"TEXtREAd")
        {
            return match hint {
                Some(Self::Azw3) => Some(Self::Azw3),
                _ => Some(Self::Mobi),
            };
        }
        None
    }

    /// Returns the canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Azw3 => "azw3",
            Self::Fb2 => "fb2",
            Self::Rtf => "rtf",
            Self::Txt => "txt",
            Self::Pdf => "pdf",
            Self::Djvu => "djvu",
            Self::Cbz => "cbz",
            Self::Cbr => "cbr",
        }
    }

    /// Returns the MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Epub => "application/epub+zip",
            Self::Mobi => "application/x-mobipocket-ebook",
            Self::Azw3 => "application/vnd.amazon.ebook",
            Self::Fb2 => "application/x-fictionbook+xml",
            Self::Rtf => "application/rtf",
            Self::Txt => "text/plain",
            Self::Pdf => "application/pdf",
            Self::Djvu => "image/vnd.djvu",
            Self::Cbz => "application/vnd.comicbook+zip",
            Self::Cbr => "application/vnd.comicbook-rar",
        }
    }

    /// Returns true for archives of page images
    pub fn is_comic(&self) -> bool {
        matches!(self, Self::Cbz | Self::Cbr)
    }
}

impl fmt::Display for EbookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension_case_insensitive() {
        assert_eq!(EbookFormat::from_extension("EPUB"), Some(EbookFormat::Epub));
        assert_eq!(EbookFormat::from_extension(".cbz"), Some(EbookFormat::Cbz));
        assert_eq!(EbookFormat::from_extension("prc"), Some(EbookFormat::Mobi));
        assert_eq!(EbookFormat::from_extension("mp3"), None);
    }

    #[test]
    fn test_from_path() {
        let path = ResourcePath::new("/lib/Author - Title.Epub");
        assert_eq!(EbookFormat::from_path(&path), Some(EbookFormat::Epub));
        assert_eq!(EbookFormat::from_path(&ResourcePath::new("/lib/notes")), None);
    }

    #[test]
    fn test_extension_roundtrip() {
        for format in EbookFormat::all() {
            assert_eq!(EbookFormat::from_extension(format.extension()), Some(*format));
        }
    }

    #[test]
    fn test_magic_bytes_pdf() {
        assert_eq!(
            EbookFormat::from_magic_bytes(b"%PDF-1.7\n", None),
            Some(EbookFormat::Pdf)
        );
    }

    #[test]
    fn test_magic_bytes_zip_uses_hint() {
        let zip = b"PK\x03\x04\x14\x00\x00\x00";
        assert_eq!(
            EbookFormat::from_magic_bytes(zip, Some(EbookFormat::Cbz)),
            Some(EbookFormat::Cbz)
        );
        assert_eq!(EbookFormat::from_magic_bytes(zip, None), Some(EbookFormat::Epub));
    }

    #[test]
    fn test_magic_bytes_epub_mimetype_entry() {
        let mut header = vec![0u8; 64];
        header[..4].copy_from_slice(b"PK\x03\x04");
        header[30..38].copy_from_slice(b"mimetype");
        assert_eq!(
            EbookFormat::from_magic_bytes(&header, Some(EbookFormat::Cbz)),
            Some(EbookFormat::Epub)
        );
    }

    #[test]
    fn test_magic_bytes_unknown() {
        assert_eq!(EbookFormat::from_magic_bytes(b"hello", None), None);
    }

    #[test]
    fn test_display_and_mime() {
        assert_eq!(EbookFormat::Epub.to_string(), "EPUB");
        assert_eq!(EbookFormat::Epub.mime_type(), "application/epub+zip");
        assert!(EbookFormat::Cbr.is_comic());
        assert!(!EbookFormat::Pdf.is_comic());
    }
}
