//! Payload decoding for distributed documents: base64, then gzip, then UTF-8.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use std::io::Read;
use thiserror::Error;

use super::traits::RawDocument;
use crate::models::FetchedDocument;

const ACCESS_KEY_TAGS: &[&str] = &["chNFe", "chCTe", "chMDFe", "chNFSe"];
const BUSINESS_DATE_TAGS: &[&str] = &["dhEmi", "dEmi", "dhEvento", "dhRecbto"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(String),
    #[error("payload could not be decompressed: {0}")]
    Decompress(String),
    #[error("decompressed payload is not valid UTF-8: {0}")]
    Utf8(String),
    #[error("document at cursor {0} has no access key")]
    MissingAccessKey(u64),
}

/// Decode a base64 gzip payload into text
pub fn decode_payload(compressed_payload: &str) -> Result<String, DecodeError> {
    let bytes = STANDARD
        .decode(compressed_payload.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    let mut inflated = Vec::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|e| DecodeError::Decompress(e.to_string()))?;
    String::from_utf8(inflated).map_err(|e| DecodeError::Utf8(e.to_string()))
}

/// Decode one raw document, filling access key and business date from the
/// payload when the envelope does not carry them
pub fn decode_document(raw: &RawDocument) -> Result<FetchedDocument, DecodeError> {
    let text = decode_payload(&raw.compressed_payload)?;

    let access_key = raw
        .access_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| first_tag_value(&text, ACCESS_KEY_TAGS).map(str::to_string))
        .ok_or(DecodeError::MissingAccessKey(raw.cursor))?;

    let business_date = raw.business_date.or_else(|| extract_business_date(&text));

    Ok(FetchedDocument {
        cursor: raw.cursor,
        access_key,
        schema: raw.schema.clone(),
        raw_payload: text,
        business_date,
    })
}

/// Issue date of the document, read from the first date element present
pub fn extract_business_date(text: &str) -> Option<NaiveDate> {
    BUSINESS_DATE_TAGS.iter().find_map(|tag| {
        let value = tag_value(text, tag)?;
        let date_part = value.get(..10)?;
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    })
}

fn first_tag_value<'a>(text: &'a str, tags: &[&str]) -> Option<&'a str> {
    tags.iter()
        .find_map(|tag| tag_value(text, tag))
        .filter(|value| !value.is_empty())
}

/// Text content of the first `<tag>` or `<tag attr..>` element
fn tag_value<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(&open) {
        let name_end = search_from + found + open.len();
        let rest = &text[name_end..];
        match rest.chars().next() {
            Some('>') | Some(' ') => {
                let body_start = name_end + rest.find('>')? + 1;
                let body_len = text[body_start..].find(&close)?;
                return Some(text[body_start..body_start + body_len].trim());
            }
            // longer element name sharing the prefix
            _ => search_from = name_end,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn compress(text: &str) -> String {
        compress_bytes(text.as_bytes())
    }

    fn compress_bytes(bytes: &[u8]) -> String {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        STANDARD.encode(encoder.finish().unwrap())
    }

    fn raw(payload: String) -> RawDocument {
        RawDocument {
            cursor: 42,
            schema: Some("resNFe_v1.01.xsd".to_string()),
            access_key: None,
            compressed_payload: payload,
            business_date: None,
        }
    }

    #[test]
    fn test_decode_reads_key_and_date_from_payload() {
        let xml = "<resNFe><chNFe>35240112345678000190550010000000011000000010</chNFe>\
                   <dhEmi>2024-01-15T10:30:00-03:00</dhEmi></resNFe>";
        let document = decode_document(&raw(compress(xml))).unwrap();

        assert_eq!(document.cursor, 42);
        assert_eq!(
            document.access_key,
            "35240112345678000190550010000000011000000010"
        );
        assert_eq!(
            document.business_date,
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(document.raw_payload, xml);
    }

    #[test]
    fn test_envelope_values_take_precedence() {
        let mut document = raw(compress("<resEvento><dhEvento>2024-03-01</dhEvento></resEvento>"));
        document.access_key = Some("KEY-1".to_string());
        document.business_date = NaiveDate::from_ymd_opt(2024, 2, 2);

        let decoded = decode_document(&document).unwrap();
        assert_eq!(decoded.access_key, "KEY-1");
        assert_eq!(decoded.business_date, NaiveDate::from_ymd_opt(2024, 2, 2));
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        assert!(matches!(
            decode_document(&raw("%%% not base64 %%%".to_string())),
            Err(DecodeError::Base64(_))
        ));
        assert!(matches!(
            decode_document(&raw(STANDARD.encode(b"plain, not gzip"))),
            Err(DecodeError::Decompress(_))
        ));
        assert!(matches!(
            decode_document(&raw(compress("<resNFe/>"))),
            Err(DecodeError::MissingAccessKey(42))
        ));
    }

    #[test]
    fn test_latin1_payload_is_reported_as_encoding_error() {
        // "Razão" in ISO-8859-1
        let latin1 = b"<resNFe><xNome>Raz\xe3o</xNome></resNFe>";
        let error = decode_payload(&compress_bytes(latin1)).unwrap_err();
        assert!(matches!(error, DecodeError::Utf8(_)));
        assert!(error.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_tag_value_skips_longer_names() {
        let xml = "<dhEmiOriginal>1999-01-01</dhEmiOriginal><dhEmi>2024-05-06</dhEmi>";
        assert_eq!(tag_value(xml, "dhEmi"), Some("2024-05-06"));
        assert_eq!(
            extract_business_date(xml),
            NaiveDate::from_ymd_opt(2024, 5, 6)
        );
        assert_eq!(extract_business_date("<x/>"), None);
    }
}
