//! Identity attribute extraction from offline-eKYC XML.
//!
//! Only two elements matter: the first `<Poi>` (proof of identity) for
//! `name` and `dob`, and the first `<Poa>` (proof of address) for the
//! care-of field. Everything else, including the photo and the signature
//! block, is skipped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;

use super::IdentityField;
use crate::error::{Error, Result};

/// Attributes read from the document, after care-of label stripping and
/// before canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedIdentity {
    pub name: String,
    pub date_of_birth: String,
    pub care_of: String,
}

/// Parse `xml` and pull out the three identity attributes.
///
/// Fails with [`Error::MissingIdentityFields`] if any attribute is absent or
/// blank, so a partial identity can never reach the fingerprint deriver.
pub fn extract_identity(xml: &str) -> Result<ExtractedIdentity> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut poi: Option<(Option<String>, Option<String>)> = None;
    let mut care_of: Option<Option<String>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"Poi" if poi.is_none() => {
                    poi = Some((attribute(&e, "name")?, attribute(&e, "dob")?));
                }
                b"Poa" if care_of.is_none() => {
                    // Older documents use `careof`, newer ones `co`.
                    let value = match attribute(&e, "careof")? {
                        Some(v) => Some(v),
                        None => attribute(&e, "co")?,
                    };
                    care_of = Some(value);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::MalformedXml(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }

        if poi.is_some() && care_of.is_some() {
            break;
        }
    }

    let (name, dob) = poi.unwrap_or((None, None));
    let care_of = care_of.flatten().map(|raw| strip_care_of_label(&raw));

    let mut missing = Vec::new();
    let name = present(name, IdentityField::Name, &mut missing);
    let date_of_birth = present(dob, IdentityField::DateOfBirth, &mut missing);
    let care_of = present(care_of, IdentityField::CareOf, &mut missing);

    if !missing.is_empty() {
        tracing::debug!(missing = ?missing, "Identity attributes missing from XML");
        return Err(Error::MissingIdentityFields(missing));
    }

    Ok(ExtractedIdentity {
        name,
        date_of_birth,
        care_of,
    })
}

/// `"S/O: Jane Doe"` → `"Jane Doe"`. Values without a colon pass through.
///
/// Only the first colon separates the label. Everything after it is kept,
/// so `"W/O:Ram: Kumar"` becomes `"Ram: Kumar"`, not `"Ram"` as a naive
/// `split(':')[1]` would give. Fingerprints of accounts created by such a
/// splitter will not match for care-of values with a second colon.
pub fn strip_care_of_label(raw: &str) -> String {
    match raw.split_once(':') {
        Some((_label, rest)) => rest.trim().to_string(),
        None => raw.to_string(),
    }
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    let attr = element
        .try_get_attribute(key)
        .map_err(|e| Error::MalformedXml(e.to_string()))?;

    match attr {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::MalformedXml(e.to_string()))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

fn present(
    value: Option<String>,
    field: IdentityField,
    missing: &mut Vec<IdentityField>,
) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            missing.push(field);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(poi: &str, poa: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<OfflinePaperlessKyc referenceId="123420190101120000000">
  <UidData>
    {poi}
    {poa}
    <Pht>aGVsbG8=</Pht>
  </UidData>
  <Signature xmlns="http://www.w3.org/2000/09/xmldsig#"><SignatureValue>c2ln</SignatureValue></Signature>
</OfflinePaperlessKyc>"#
        )
    }

    #[test]
    fn test_extracts_all_fields() {
        let xml = document(
            r#"<Poi dob="01-01-1990" gender="F" name="Jane Q Public"/>"#,
            r#"<Poa careof="S/O: John Public" country="India" dist="Pune"/>"#,
        );

        let identity = extract_identity(&xml).unwrap();
        assert_eq!(identity.name, "Jane Q Public");
        assert_eq!(identity.date_of_birth, "01-01-1990");
        assert_eq!(identity.care_of, "John Public");
    }

    #[test]
    fn test_care_of_without_label_is_kept() {
        let xml = document(
            r#"<Poi dob="01-01-1990" name="A"/>"#,
            r#"<Poa careof="Jane Doe"/>"#,
        );
        assert_eq!(extract_identity(&xml).unwrap().care_of, "Jane Doe");
    }

    #[test]
    fn test_care_of_keeps_everything_after_first_colon() {
        assert_eq!(strip_care_of_label("S/O: Jane Doe"), "Jane Doe");
        assert_eq!(strip_care_of_label("W/O:Ram: Kumar"), "Ram: Kumar");
        assert_eq!(strip_care_of_label("Plain"), "Plain");
    }

    #[test]
    fn test_co_attribute_fallback() {
        let xml = document(
            r#"<Poi dob="1990-01-01" name="A"/>"#,
            r#"<Poa co="D/O: Mother Name"/>"#,
        );
        assert_eq!(extract_identity(&xml).unwrap().care_of, "Mother Name");
    }

    #[test]
    fn test_first_poi_wins() {
        let xml = document(
            r#"<Poi dob="01-01-1990" name="First"/><Poi dob="02-02-1992" name="Second"/>"#,
            r#"<Poa careof="X"/>"#,
        );
        let identity = extract_identity(&xml).unwrap();
        assert_eq!(identity.name, "First");
        assert_eq!(identity.date_of_birth, "01-01-1990");
    }

    #[test]
    fn test_escaped_attribute_values() {
        let xml = document(
            r#"<Poi dob="01-01-1990" name="Anne &amp; Co"/>"#,
            r#"<Poa careof="X"/>"#,
        );
        assert_eq!(extract_identity(&xml).unwrap().name, "Anne & Co");
    }

    #[test]
    fn test_missing_dob_reported() {
        let xml = document(r#"<Poi name="Jane"/>"#, r#"<Poa careof="S/O: X"/>"#);
        match extract_identity(&xml) {
            Err(Error::MissingIdentityFields(fields)) => {
                assert_eq!(fields, vec![IdentityField::DateOfBirth]);
            }
            other => panic!("expected MissingIdentityFields, got {:?}", other),
        }
    }

    #[test]
    fn test_label_only_care_of_is_missing() {
        let xml = document(
            r#"<Poi dob="01-01-1990" name="Jane"/>"#,
            r#"<Poa careof="S/O: "/>"#,
        );
        match extract_identity(&xml) {
            Err(Error::MissingIdentityFields(fields)) => {
                assert_eq!(fields, vec![IdentityField::CareOf]);
            }
            other => panic!("expected MissingIdentityFields, got {:?}", other),
        }
    }

    #[test]
    fn test_no_elements_reports_every_field() {
        let err = extract_identity("<OfflinePaperlessKyc/>").unwrap_err();
        match err {
            Error::MissingIdentityFields(fields) => assert_eq!(fields.len(), 3),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_malformed_xml() {
        let err = extract_identity("<Poi name=\"unterminated></Poa>").unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedXml(_) | Error::MissingIdentityFields(_)
        ));
    }
}
