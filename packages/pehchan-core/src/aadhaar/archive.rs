//! Password-protected archive decryption.
//!
//! The whole upload is read through an in-memory cursor; nothing touches the
//! filesystem. The share code is the archive password.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::config::ArchiveLimits;
use crate::error::{Error, Result};

/// Opens offline-eKYC archives and yields the embedded XML text.
#[derive(Debug, Clone, Default)]
pub struct ArchiveReader {
    limits: ArchiveLimits,
}

impl ArchiveReader {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ArchiveLimits {
        &self.limits
    }

    /// Decrypt `bytes` with `passphrase` and return the first `.xml` member
    /// as UTF-8 text.
    ///
    /// A wrong passphrase and a corrupt archive both come back as
    /// [`Error::ArchiveUnreadable`]; at this layer they cannot be told apart.
    pub fn open(&self, bytes: &[u8], passphrase: &str) -> Result<String> {
        if passphrase.is_empty() {
            return Err(Error::InvalidInput("Missing share code".into()));
        }

        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| unreadable("open archive", e))?;

        let entry_name = archive
            .file_names()
            .find(|name| name.to_ascii_lowercase().ends_with(".xml"))
            .map(str::to_owned)
            .ok_or(Error::NoXmlEntry)?;

        let index = archive.index_for_name(&entry_name).ok_or(Error::NoXmlEntry)?;

        let limit = self.limits.max_entry_bytes;
        let entry = archive
            .by_index_decrypt(index, passphrase.as_bytes())
            .map_err(|e| unreadable("decrypt entry", e))?;

        // Central-directory size first, so a bomb is refused before inflating.
        if entry.size() > limit {
            tracing::warn!(
                declared = entry.size(),
                limit,
                "Rejecting oversized XML entry"
            );
            return Err(Error::EntryTooLarge {
                size: entry.size(),
                limit,
            });
        }

        let mut payload = Vec::with_capacity(entry.size() as usize);
        entry
            .take(limit + 1)
            .read_to_end(&mut payload)
            .map_err(|e| unreadable("read entry", e))?;

        if payload.len() as u64 > limit {
            tracing::warn!(limit, "XML entry inflated past its declared size");
            return Err(Error::EntryTooLarge {
                size: payload.len() as u64,
                limit,
            });
        }

        tracing::debug!(entry = entry_name.as_str(), size = payload.len(), "Extracted XML entry");

        String::from_utf8(payload).map_err(|e| unreadable("decode entry", e))
    }
}

fn unreadable(stage: &str, err: impl std::fmt::Display) -> Error {
    // Detail stays in the debug log; callers only learn the category.
    tracing::debug!(stage, error = %err, "Archive unreadable");
    Error::ArchiveUnreadable(format!("{}: {}", stage, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build_archive, sample_xml, ArchiveEncryption};

    const SHARE_CODE: &str = "4821";

    #[test]
    fn test_open_aes_archive() {
        let xml = sample_xml("Jane Q Public", "01-01-1990", "S/O: John Public");
        let bytes = build_archive("offlineaadhaar.xml", &xml, SHARE_CODE, ArchiveEncryption::Aes256);

        let text = ArchiveReader::default().open(&bytes, SHARE_CODE).unwrap();
        assert_eq!(text, xml);
    }

    #[test]
    fn test_open_zipcrypto_archive() {
        let xml = sample_xml("Jane Q Public", "01-01-1990", "S/O: John Public");
        let bytes = build_archive("offlineaadhaar.xml", &xml, SHARE_CODE, ArchiveEncryption::ZipCrypto);

        let text = ArchiveReader::default().open(&bytes, SHARE_CODE).unwrap();
        assert_eq!(text, xml);
    }

    #[test]
    fn test_wrong_share_code_is_unreadable() {
        let xml = sample_xml("Jane Q Public", "01-01-1990", "S/O: John Public");
        let bytes = build_archive("offlineaadhaar.xml", &xml, SHARE_CODE, ArchiveEncryption::Aes256);

        let err = ArchiveReader::default().open(&bytes, "9999").unwrap_err();
        assert!(matches!(err, Error::ArchiveUnreadable(_)));
    }

    #[test]
    fn test_garbage_bytes_are_unreadable() {
        let err = ArchiveReader::default()
            .open(b"definitely not a zip file", SHARE_CODE)
            .unwrap_err();
        assert!(matches!(err, Error::ArchiveUnreadable(_)));
    }

    #[test]
    fn test_archive_without_xml_member() {
        let bytes = build_archive("readme.txt", "hello", SHARE_CODE, ArchiveEncryption::Aes256);

        let err = ArchiveReader::default().open(&bytes, SHARE_CODE).unwrap_err();
        assert!(matches!(err, Error::NoXmlEntry));
    }

    #[test]
    fn test_uppercase_extension_is_found() {
        let xml = sample_xml("A", "01-01-1990", "B");
        let bytes = build_archive("OFFLINE.XML", &xml, SHARE_CODE, ArchiveEncryption::Aes256);

        assert!(ArchiveReader::default().open(&bytes, SHARE_CODE).is_ok());
    }

    #[test]
    fn test_empty_share_code_rejected() {
        let err = ArchiveReader::default().open(b"PK", "").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let padding = "x".repeat(4096);
        let xml = format!("<OfflinePaperlessKyc>{}</OfflinePaperlessKyc>", padding);
        let bytes = build_archive("big.xml", &xml, SHARE_CODE, ArchiveEncryption::Aes256);

        let reader = ArchiveReader::new(ArchiveLimits {
            max_entry_bytes: 1024,
        });
        let err = reader.open(&bytes, SHARE_CODE).unwrap_err();
        assert!(matches!(err, Error::EntryTooLarge { limit: 1024, .. }));
    }
}
