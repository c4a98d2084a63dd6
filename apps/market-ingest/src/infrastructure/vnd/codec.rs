//! Frame Codec
//!
//! Live frames look like `D|<category>:<ciphertext>`. The ciphertext decodes
//! to `<subtype>|<v1>|<v2>|...`, which is labelled with the schema selected by
//! (category, subtype, variant), where the variant is `v2` (the instrument
//! type in quote frames). REST snapshot entries are bare ciphertexts of
//! quote payloads.

use crate::domain::{DecodeError, DecodedMessage, MessageCategory, StockSnapshot};

use super::cipher;
use super::schema::{schema_for, zip_fields};

/// The only outer frame type carrying data.
const DATA_FRAME: &str = "D";

/// Decode one live frame.
///
/// # Errors
///
/// Returns `DecodeError::MalformedFrame` for frames without the envelope and
/// `DecodeError::UnsupportedMessage` for unknown frame types, categories or
/// subtypes. Values stay raw; numbers are coerced by the consumer that reads
/// them.
pub fn decode_frame(raw: &str) -> Result<DecodedMessage, DecodeError> {
    let (frame_type, body) = raw
        .split_once('|')
        .ok_or_else(|| DecodeError::MalformedFrame(truncate(raw)))?;
    if !frame_type.eq_ignore_ascii_case(DATA_FRAME) {
        return Err(DecodeError::UnsupportedMessage {
            category: frame_type.to_string(),
            subtype: String::new(),
        });
    }

    let (category, ciphertext) = body
        .split_once(':')
        .ok_or_else(|| DecodeError::MalformedFrame(truncate(raw)))?;
    decode_payload(MessageCategory::parse(category)?, ciphertext)
}

/// Decode a ciphertext payload whose first token is the subtype.
///
/// # Errors
///
/// Same as [`decode_frame`], minus the envelope checks.
pub fn decode_payload(
    category: MessageCategory,
    ciphertext: &str,
) -> Result<DecodedMessage, DecodeError> {
    let plain = cipher::decode(ciphertext)?;
    let tokens: Vec<&str> = plain.split('|').collect();
    let (subtype, values) = tokens
        .split_first()
        .ok_or_else(|| DecodeError::MalformedFrame(String::new()))?;
    let variant = values.get(1).copied().unwrap_or_default();

    let schema = schema_for(category, subtype, variant)?;
    Ok(DecodedMessage {
        category,
        subtype: subtype.to_ascii_uppercase(),
        fields: zip_fields(schema, values),
    })
}

/// Decode one REST snapshot entry into a full snapshot.
///
/// Returns `None` for entries without an instrument code.
///
/// # Errors
///
/// Same as [`decode_payload`], plus `DecodeError::MalformedField` for
/// non-numeric snapshot values.
pub fn decode_snapshot(ciphertext: &str) -> Result<Option<StockSnapshot>, DecodeError> {
    let message = decode_payload(MessageCategory::Quote, ciphertext)?;
    StockSnapshot::from_message(&message)
}

/// Build a live frame from plain tokens (subtype first).
///
/// # Errors
///
/// Returns `DecodeError::MalformedFrame` if a token cannot be shifted.
pub fn encode_frame(category: MessageCategory, tokens: &[&str]) -> Result<String, DecodeError> {
    Ok(format!(
        "{DATA_FRAME}|{}:{}",
        category.token(),
        cipher::encode(&tokens.join("|"))?
    ))
}

fn truncate(raw: &str) -> String {
    raw.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldValue, SnapshotField, SnapshotUpdate};

    fn sma_tokens<'a>(code: &'a str, match_price: &'a str) -> Vec<&'a str> {
        vec![
            "SMA", code, "ST", "1", "100", "200", "25.5", "24.1", "1e9", "40000", match_price, "100",
            "25.0", "100", "", "5000", "4000", "",
        ]
    }

    #[test]
    fn decodes_quote_match_frame() {
        let frame = encode_frame(MessageCategory::Quote, &sma_tokens("FPT", "25.0")).unwrap();
        let message = decode_frame(&frame).unwrap();

        assert_eq!(message.category, MessageCategory::Quote);
        assert_eq!(message.subtype, "SMA");
        assert_eq!(message.code(), Some("FPT"));
        assert_eq!(message.get("stockType"), Some("ST"));
        assert_eq!(message.number("matchPrice").unwrap(), Some(25.0));
        assert_eq!(message.get("projectOpen"), Some(""));
        assert_eq!(message.get("iNav"), Some(""));
    }

    #[test]
    fn short_frames_zip_partially() {
        let frame = encode_frame(MessageCategory::Quote, &["SMA", "FPT", "ST"]).unwrap();
        let message = decode_frame(&frame).unwrap();
        assert_eq!(message.fields.len(), 2);
        assert!(message.get("tradingSessionId").is_none());
    }

    #[test]
    fn lowercase_frame_type_and_category() {
        let frame = encode_frame(MessageCategory::Index, &["MI", "10", "09:15:00", "O", "1"]).unwrap();
        let frame = frame.replacen("D|MI", "d|mi", 1);
        let message = decode_frame(&frame).unwrap();
        assert_eq!(message.category, MessageCategory::Index);
        assert_eq!(message.get("floorCode"), Some("10"));
        assert_eq!(message.get("advance"), Some("1"));
    }

    #[test]
    fn derivative_frame() {
        let frame = encode_frame(
            MessageCategory::Derivative,
            &["DMA", "VN30F2401", "10:00:00", "LO", "1", "2", "1200.5"],
        )
        .unwrap();
        let message = decode_frame(&frame).unwrap();
        assert_eq!(message.subtype, "DMA");
        assert_eq!(message.get("highestPrice"), Some("1200.5"));
    }

    #[test]
    fn unknown_outer_type() {
        assert!(matches!(
            decode_frame("X|S:abc"),
            Err(DecodeError::UnsupportedMessage { category, .. }) if category == "X"
        ));
    }

    #[test]
    fn unknown_category() {
        assert!(matches!(
            decode_frame("D|Q:abc"),
            Err(DecodeError::UnsupportedMessage { category, .. }) if category == "Q"
        ));
    }

    #[test]
    fn unknown_subtype() {
        let frame = encode_frame(MessageCategory::Quote, &["SXX", "FPT"]).unwrap();
        assert!(matches!(
            decode_frame(&frame),
            Err(DecodeError::UnsupportedMessage { subtype, .. }) if subtype == "SXX"
        ));
    }

    #[test]
    fn missing_envelope() {
        assert!(matches!(decode_frame("1"), Err(DecodeError::MalformedFrame(_))));
        assert!(matches!(decode_frame("D|S"), Err(DecodeError::MalformedFrame(_))));
    }

    #[test]
    fn numeric_values_stay_raw_until_read() {
        let frame = encode_frame(MessageCategory::Quote, &sma_tokens("FPT", "abc")).unwrap();
        let message = decode_frame(&frame).unwrap();
        assert_eq!(message.get("matchPrice"), Some("abc"));
        assert_eq!(
            message.number("matchPrice"),
            Err(DecodeError::MalformedField {
                field: "matchPrice".to_string(),
                value: "abc".to_string(),
            })
        );
    }

    #[test]
    fn auction_book_frame_decodes() {
        let frame =
            encode_frame(MessageCategory::Quote, &["SBA", "FPT", "ST", "ATO", "99.8"]).unwrap();
        let message = decode_frame(&frame).unwrap();
        assert_eq!(message.get("bidPrice01"), Some("ATO"));
        assert_eq!(message.get("bidPrice02"), Some("99.8"));

        let update = SnapshotUpdate::from_message(&message).unwrap().unwrap();
        assert!(!update.fields.contains_key(&SnapshotField::BidPrice(0)));
        assert_eq!(
            update.fields.get(&SnapshotField::BidPrice(1)),
            Some(&FieldValue::Number(99.8))
        );
    }

    #[test]
    fn auction_markers_in_rest_snapshot() {
        let tokens = [
            "SFU", "FPT", "ST", "HOSE", "100", "93", "107", "ATC", "99.8", "99.7",
        ];
        let encoded = cipher::encode(&tokens.join("|")).unwrap();
        let snapshot = decode_snapshot(&encoded).unwrap().unwrap();
        assert_eq!(snapshot.bid_price, [0.0, 99.8, 99.7]);
    }

    #[test]
    fn snapshot_entry() {
        let tokens = [
            "SFU", "FPT", "ST", "HOSE", "100", "93", "107", "99.9", "99.8", "99.7", "", "", "", "",
            "", "", "", "10", "20", "30",
        ];
        let encoded = cipher::encode(&tokens.join("|")).unwrap();
        let snapshot = decode_snapshot(&encoded).unwrap().unwrap();

        assert_eq!(snapshot.symbol, "FPT");
        assert_eq!(snapshot.floor_code, "HOSE");
        assert_eq!(snapshot.basic_price, 100.0);
        assert_eq!(snapshot.ceiling_price, 107.0);
        assert_eq!(snapshot.bid_price, [99.9, 99.8, 99.7]);
        assert_eq!(snapshot.bid_qtty, [10.0, 20.0, 30.0]);
    }
}
