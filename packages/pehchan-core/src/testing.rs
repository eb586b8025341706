//! Fixtures for building offline-eKYC archives in tests.
//!
//! Compiled for unit tests and for downstream crates that enable the
//! `test-support` feature.

use std::io::{Cursor, Write};

use zip::unstable::write::FileOptionsExt;
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

/// Which zip encryption scheme to apply to the fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveEncryption {
    /// WinZip AES-256 (what current UIDAI downloads use)
    Aes256,
    /// Legacy PKWARE ZipCrypto
    ZipCrypto,
}

/// Build an in-memory zip holding one member `name` with `content`,
/// encrypted with `share_code`.
pub fn build_archive(
    name: &str,
    content: &str,
    share_code: &str,
    encryption: ArchiveEncryption,
) -> Vec<u8> {
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let options = match encryption {
        ArchiveEncryption::Aes256 => base.with_aes_encryption(AesMode::Aes256, share_code),
        ArchiveEncryption::ZipCrypto => base.with_deprecated_encryption(share_code.as_bytes()),
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(name, options).expect("start zip entry");
    writer
        .write_all(content.as_bytes())
        .expect("write zip entry");
    writer.finish().expect("finish zip").into_inner()
}

/// A minimal offline-eKYC document.
pub fn sample_xml(name: &str, dob: &str, care_of: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<OfflinePaperlessKyc referenceId="482120190101120000000">
  <UidData>
    <Poi dob="{dob}" e="" gender="F" m="" name="{name}"/>
    <Poa careof="{care_of}" country="India" dist="Pune" house="12" loc="" pc="411001" state="Maharashtra" street="" subdist="" vtc="Pune"/>
    <Pht>aGVsbG8=</Pht>
  </UidData>
  <Signature xmlns="http://www.w3.org/2000/09/xmldsig#"><SignatureValue>c2lnbmF0dXJl</SignatureValue></Signature>
</OfflinePaperlessKyc>"#
    )
}

/// [`build_archive`] around [`sample_xml`], AES-256 encrypted.
pub fn sample_archive(name: &str, dob: &str, care_of: &str, share_code: &str) -> Vec<u8> {
    build_archive(
        "offlineaadhaar.xml",
        &sample_xml(name, dob, care_of),
        share_code,
        ArchiveEncryption::Aes256,
    )
}
