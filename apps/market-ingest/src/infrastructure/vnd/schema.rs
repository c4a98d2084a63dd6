//! Positional Field Schemas
//!
//! Ordered field-name tables for every supported (category, subtype,
//! variant) layout. A decoded token list is labelled by zipping it against
//! its table by position.

use std::collections::HashMap;

use crate::domain::{DecodeError, MessageCategory};

/// `S/SFU` stock variant: full quote with ten book levels.
pub static QUOTE_FULL_STOCK: &[&str] = &[
    "code", "stockType", "floorCode", "basicPrice", "floorPrice", "ceilingPrice", "bidPrice01",
    "bidPrice02", "bidPrice03", "bidPrice04", "bidPrice05", "bidPrice06", "bidPrice07",
    "bidPrice08", "bidPrice09", "bidPrice10", "bidQtty01", "bidQtty02", "bidQtty03",
    "bidQtty04", "bidQtty05", "bidQtty06", "bidQtty07", "bidQtty08", "bidQtty09", "bidQtty10",
    "offerPrice01", "offerPrice02", "offerPrice03", "offerPrice04", "offerPrice05",
    "offerPrice06", "offerPrice07", "offerPrice08", "offerPrice09", "offerPrice10",
    "offerQtty01", "offerQtty02", "offerQtty03", "offerQtty04", "offerQtty05", "offerQtty06",
    "offerQtty07", "offerQtty08", "offerQtty09", "offerQtty10", "totalBidQtty",
    "totalOfferQtty", "tradingSessionId", "buyForeignQtty", "sellForeignQtty", "highestPrice",
    "lowestPrice", "accumulatedVal", "accumulatedVol", "matchPrice", "matchQtty",
    "currentPrice", "currentQtty", "projectOpen", "totalRoom", "currentRoom",
];

/// `S/SFU` covered-warrant variant.
pub static QUOTE_FULL_WARRANT: &[&str] = &[
    "code", "stockType", "floorCode", "basicPrice", "floorPrice", "ceilingPrice",
    "underlyingSymbol", "issuerName", "exercisePrice", "exerciseRatio", "bidPrice01",
    "bidPrice02", "bidPrice03", "bidQtty01", "bidQtty02", "bidQtty03", "offerPrice01",
    "offerPrice02", "offerPrice03", "offerQtty01", "offerQtty02", "offerQtty03", "totalBidQtty",
    "totalOfferQtty", "tradingSessionId", "buyForeignQtty", "sellForeignQtty", "highestPrice",
    "lowestPrice", "accumulatedVal", "accumulatedVol", "matchPrice", "matchQtty",
    "currentPrice", "currentQtty", "projectOpen", "totalRoom", "currentRoom",
];

/// `S/SFU` default variant (ETF and others): three levels plus iNAV.
pub static QUOTE_FULL: &[&str] = &[
    "code", "stockType", "floorCode", "basicPrice", "floorPrice", "ceilingPrice", "bidPrice01",
    "bidPrice02", "bidPrice03", "bidQtty01", "bidQtty02", "bidQtty03", "offerPrice01",
    "offerPrice02", "offerPrice03", "offerQtty01", "offerQtty02", "offerQtty03", "totalBidQtty",
    "totalOfferQtty", "tradingSessionId", "buyForeignQtty", "sellForeignQtty", "highestPrice",
    "lowestPrice", "accumulatedVal", "accumulatedVol", "matchPrice", "matchQtty",
    "currentPrice", "currentQtty", "projectOpen", "totalRoom", "currentRoom", "iNav",
];

/// `S/SBA` stock variant: ten-level book.
pub static QUOTE_BOOK_STOCK: &[&str] = &[
    "code", "stockType", "bidPrice01", "bidPrice02", "bidPrice03", "bidPrice04", "bidPrice05",
    "bidPrice06", "bidPrice07", "bidPrice08", "bidPrice09", "bidPrice10", "bidQtty01",
    "bidQtty02", "bidQtty03", "bidQtty04", "bidQtty05", "bidQtty06", "bidQtty07", "bidQtty08",
    "bidQtty09", "bidQtty10", "offerPrice01", "offerPrice02", "offerPrice03", "offerPrice04",
    "offerPrice05", "offerPrice06", "offerPrice07", "offerPrice08", "offerPrice09",
    "offerPrice10", "offerQtty01", "offerQtty02", "offerQtty03", "offerQtty04", "offerQtty05",
    "offerQtty06", "offerQtty07", "offerQtty08", "offerQtty09", "offerQtty10", "totalBidQtty",
    "totalOfferQtty",
];

/// `S/SBA` default variant: three-level book.
pub static QUOTE_BOOK: &[&str] = &[
    "code", "stockType", "bidPrice01", "bidPrice02", "bidPrice03", "bidQtty01", "bidQtty02",
    "bidQtty03", "offerPrice01", "offerPrice02", "offerPrice03", "offerQtty01", "offerQtty02",
    "offerQtty03", "totalBidQtty", "totalOfferQtty",
];

/// `S/SMA`: match and session statistics.
pub static QUOTE_MATCH: &[&str] = &[
    "code", "stockType", "tradingSessionId", "buyForeignQtty", "sellForeignQtty",
    "highestPrice", "lowestPrice", "accumulatedVal", "accumulatedVol", "matchPrice",
    "matchQtty", "currentPrice", "currentQtty", "projectOpen", "totalRoom", "currentRoom",
    "iNav",
];

/// `S/SBS` covered-warrant variant.
pub static QUOTE_BASIC_WARRANT: &[&str] = &[
    "code", "stockType", "floorCode", "basicPrice", "floorPrice", "ceilingPrice",
    "underlyingSymbol", "issuerName", "exercisePrice", "exerciseRatio",
];

/// `S/SBS` default variant: reference prices.
pub static QUOTE_BASIC: &[&str] = &[
    "code", "stockType", "floorCode", "basicPrice", "floorPrice", "ceilingPrice",
];

/// `D/DFU`: full derivative quote.
pub static DERIVATIVE_FULL: &[&str] = &[
    "code", "time", "bidPrice01", "bidPrice02", "bidPrice03", "bidPrice04", "bidPrice05",
    "bidPrice06", "bidPrice07", "bidPrice08", "bidPrice09", "bidPrice10", "bidQtty01",
    "bidQtty02", "bidQtty03", "bidQtty04", "bidQtty05", "bidQtty06", "bidQtty07", "bidQtty08",
    "bidQtty09", "bidQtty10", "offerPrice01", "offerPrice02", "offerPrice03", "offerPrice04",
    "offerPrice05", "offerPrice06", "offerPrice07", "offerPrice08", "offerPrice09",
    "offerPrice10", "offerQtty01", "offerQtty02", "offerQtty03", "offerQtty04", "offerQtty05",
    "offerQtty06", "offerQtty07", "offerQtty08", "offerQtty09", "offerQtty10", "totalBidQtty",
    "totalOfferQtty", "tradingSessionId", "buyForeignQtty", "sellForeignQtty", "highestPrice",
    "lowestPrice", "accumulatedVal", "accumulatedVol", "matchPrice", "currentPrice",
    "matchQtty", "currentQtty", "floorCode", "stockType", "tradingDate", "lastTradingDate",
    "underlying", "basicPrice", "floorPrice", "ceilingPrice", "openInterest", "openPrice",
];

/// `D/DBA`: derivative book.
pub static DERIVATIVE_BOOK: &[&str] = &[
    "code", "bidPrice01", "bidPrice02", "bidPrice03", "bidPrice04", "bidPrice05", "bidPrice06",
    "bidPrice07", "bidPrice08", "bidPrice09", "bidPrice10", "bidQtty01", "bidQtty02",
    "bidQtty03", "bidQtty04", "bidQtty05", "bidQtty06", "bidQtty07", "bidQtty08", "bidQtty09",
    "bidQtty10", "offerPrice01", "offerPrice02", "offerPrice03", "offerPrice04", "offerPrice05",
    "offerPrice06", "offerPrice07", "offerPrice08", "offerPrice09", "offerPrice10",
    "offerQtty01", "offerQtty02", "offerQtty03", "offerQtty04", "offerQtty05", "offerQtty06",
    "offerQtty07", "offerQtty08", "offerQtty09", "offerQtty10", "totalBidQtty",
    "totalOfferQtty",
];

/// `D/DMA`: derivative match.
pub static DERIVATIVE_MATCH: &[&str] = &[
    "code", "time", "tradingSessionId", "buyForeignQtty", "sellForeignQtty", "highestPrice",
    "lowestPrice", "accumulatedVal", "accumulatedVol", "matchPrice", "currentPrice",
    "matchQtty", "currentQtty",
];

/// `D/DBS`: derivative contract reference data.
pub static DERIVATIVE_BASIC: &[&str] = &[
    "code", "floorCode", "stockType", "tradingDate", "lastTradingDate", "underlying",
    "basicPrice", "floorPrice", "ceilingPrice", "openInterest", "openPrice",
];

/// `MI/MI`: market index.
pub static MARKET_INDEX: &[&str] = &[
    "floorCode", "tradingTime", "status", "advance", "noChange", "decline", "marketIndex",
    "priorMarketIndex", "highestIndex", "lowestIndex", "totalShareTraded", "totalValueTraded",
    "totalNormalTradedQttyRd", "totalNormalTradedValueRd", "predictionIndex",
];

/// Select the schema for a layout.
///
/// `variant` is the instrument-type token that follows the code in quote
/// frames (`ST`, `W`, ...); it only matters for `SFU`, `SBA` and `SBS`.
/// Matching is case-insensitive.
///
/// # Errors
///
/// Returns `DecodeError::UnsupportedMessage` for unknown combinations.
pub fn schema_for(
    category: MessageCategory,
    subtype: &str,
    variant: &str,
) -> Result<&'static [&'static str], DecodeError> {
    let subtype_upper = subtype.to_ascii_uppercase();
    let variant = variant.to_ascii_uppercase();

    let schema = match (category, subtype_upper.as_str()) {
        (MessageCategory::Quote, "SFU") => match variant.as_str() {
            "ST" => QUOTE_FULL_STOCK,
            "W" => QUOTE_FULL_WARRANT,
            _ => QUOTE_FULL,
        },
        (MessageCategory::Quote, "SBA") => match variant.as_str() {
            "ST" => QUOTE_BOOK_STOCK,
            _ => QUOTE_BOOK,
        },
        (MessageCategory::Quote, "SMA") => QUOTE_MATCH,
        (MessageCategory::Quote, "SBS") => match variant.as_str() {
            "W" => QUOTE_BASIC_WARRANT,
            _ => QUOTE_BASIC,
        },
        (MessageCategory::Derivative, "DFU") => DERIVATIVE_FULL,
        (MessageCategory::Derivative, "DBA") => DERIVATIVE_BOOK,
        (MessageCategory::Derivative, "DMA") => DERIVATIVE_MATCH,
        (MessageCategory::Derivative, "DBS") => DERIVATIVE_BASIC,
        (MessageCategory::Index, "MI") => MARKET_INDEX,
        _ => {
            return Err(DecodeError::UnsupportedMessage {
                category: category.token().to_string(),
                subtype: subtype.to_string(),
            });
        }
    };
    Ok(schema)
}

/// Label `values` by position. Extra values or extra names are ignored.
#[must_use]
pub fn zip_fields(schema: &[&str], values: &[&str]) -> HashMap<String, String> {
    schema
        .iter()
        .zip(values)
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    #[test_case(MessageCategory::Quote, "SFU", "ST", 62 ; "full stock")]
    #[test_case(MessageCategory::Quote, "sfu", "w", 38 ; "full warrant lowercase")]
    #[test_case(MessageCategory::Quote, "SFU", "E", 35 ; "full default")]
    #[test_case(MessageCategory::Quote, "SBA", "ST", 44 ; "book stock")]
    #[test_case(MessageCategory::Quote, "SBA", "", 16 ; "book default")]
    #[test_case(MessageCategory::Quote, "SMA", "ST", 17 ; "match")]
    #[test_case(MessageCategory::Quote, "SBS", "W", 10 ; "basic warrant")]
    #[test_case(MessageCategory::Quote, "SBS", "ST", 6 ; "basic default")]
    #[test_case(MessageCategory::Derivative, "DFU", "", 65 ; "derivative full")]
    #[test_case(MessageCategory::Derivative, "DBA", "", 43 ; "derivative book")]
    #[test_case(MessageCategory::Derivative, "DMA", "", 13 ; "derivative match")]
    #[test_case(MessageCategory::Derivative, "DBS", "", 11 ; "derivative basic")]
    #[test_case(MessageCategory::Index, "MI", "", 15 ; "market index")]
    fn schema_sizes(category: MessageCategory, subtype: &str, variant: &str, len: usize) {
        assert_eq!(schema_for(category, subtype, variant).unwrap().len(), len);
    }

    #[test_case(MessageCategory::Quote, "DFU" ; "derivative subtype under quote")]
    #[test_case(MessageCategory::Derivative, "SFU" ; "quote subtype under derivative")]
    #[test_case(MessageCategory::Index, "XX" ; "unknown index subtype")]
    fn unsupported(category: MessageCategory, subtype: &str) {
        assert!(matches!(
            schema_for(category, subtype, ""),
            Err(DecodeError::UnsupportedMessage { .. })
        ));
    }

    #[test]
    fn book_levels_are_grouped_by_side_and_kind() {
        assert_eq!(QUOTE_FULL_STOCK[6], "bidPrice01");
        assert_eq!(QUOTE_FULL_STOCK[16], "bidQtty01");
        assert_eq!(QUOTE_FULL_STOCK[26], "offerPrice01");
        assert_eq!(QUOTE_FULL_STOCK[36], "offerQtty01");
        assert_eq!(QUOTE_FULL_STOCK[61], "currentRoom");
        assert_eq!(QUOTE_FULL.last(), Some(&"iNav"));
    }

    #[test]
    fn schemas_have_unique_names() {
        for schema in [
            QUOTE_FULL_STOCK,
            QUOTE_FULL_WARRANT,
            QUOTE_FULL,
            QUOTE_BOOK_STOCK,
            QUOTE_BOOK,
            QUOTE_MATCH,
            QUOTE_BASIC_WARRANT,
            QUOTE_BASIC,
            DERIVATIVE_FULL,
            DERIVATIVE_BOOK,
            DERIVATIVE_MATCH,
            DERIVATIVE_BASIC,
            MARKET_INDEX,
        ] {
            let mut names = schema.to_vec();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), schema.len());
        }
    }

    /// Every supported layout, keyed the way frames select it.
    const LAYOUTS: [(MessageCategory, &str, &str); 13] = [
        (MessageCategory::Quote, "SFU", "ST"),
        (MessageCategory::Quote, "SFU", "W"),
        (MessageCategory::Quote, "SFU", "E"),
        (MessageCategory::Quote, "SBA", "ST"),
        (MessageCategory::Quote, "SBA", "E"),
        (MessageCategory::Quote, "SMA", "ST"),
        (MessageCategory::Quote, "SBS", "W"),
        (MessageCategory::Quote, "SBS", "ST"),
        (MessageCategory::Derivative, "DFU", ""),
        (MessageCategory::Derivative, "DBA", ""),
        (MessageCategory::Derivative, "DMA", ""),
        (MessageCategory::Derivative, "DBS", ""),
        (MessageCategory::Index, "MI", ""),
    ];

    #[test]
    fn layouts_cover_every_table() {
        let mut seen: Vec<*const [&str]> = LAYOUTS
            .iter()
            .map(|(category, subtype, variant)| {
                std::ptr::from_ref(schema_for(*category, subtype, variant).unwrap())
            })
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), LAYOUTS.len());
    }

    #[test]
    fn exact_length_zip_labels_every_field_in_order() {
        for (category, subtype, variant) in LAYOUTS {
            let schema = schema_for(category, subtype, variant).unwrap();
            let values: Vec<String> = (0..schema.len()).map(|i| i.to_string()).collect();
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            let zipped = zip_fields(schema, &refs);

            assert_eq!(zipped.len(), schema.len(), "{subtype}/{variant}");
            for (i, name) in schema.iter().enumerate() {
                assert_eq!(zipped.get(*name), Some(&i.to_string()), "{subtype}/{variant} {name}");
            }
        }
    }

    proptest! {
        #[test]
        fn zip_is_total_and_positional(
            layout in 0..LAYOUTS.len(),
            values in prop::collection::vec("[a-z0-9.]{0,6}", 0..90),
        ) {
            let (category, subtype, variant) = LAYOUTS[layout];
            let schema = schema_for(category, subtype, variant).unwrap();
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            let zipped = zip_fields(schema, &refs);

            // Short lists label a prefix; long lists drop the surplus.
            prop_assert_eq!(zipped.len(), values.len().min(schema.len()));
            for (i, name) in schema.iter().enumerate() {
                prop_assert_eq!(zipped.get(*name), values.get(i));
            }
        }
    }
}
