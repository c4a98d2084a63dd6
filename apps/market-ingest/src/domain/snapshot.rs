//! Stock Snapshots
//!
//! Latest known quote state per symbol, plus the typed partial updates the
//! live feed produces. A partial update only carries the fields the frame
//! actually contained; merging leaves every other field untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::feed::{DecodeError, DecodedMessage, MessageCategory, coerce_number};

/// Latest quote state for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StockSnapshot {
    /// Symbol (cache key).
    pub symbol: String,
    /// Exchange floor code.
    pub floor_code: String,
    /// Reference price.
    pub basic_price: f64,
    /// Ceiling price.
    pub ceiling_price: f64,
    /// Floor price.
    pub floor_price: f64,
    /// Last matched price.
    pub match_price: f64,
    /// Last matched quantity.
    pub match_qtty: f64,
    /// Session high.
    pub highest_price: f64,
    /// Session low.
    pub lowest_price: f64,
    /// Accumulated traded volume.
    pub accumulated_vol: f64,
    /// Accumulated traded value.
    pub accumulated_val: f64,
    /// Projected open price.
    pub project_open: f64,
    /// Foreign buy quantity.
    pub buy_foreign_qtty: f64,
    /// Foreign sell quantity.
    pub sell_foreign_qtty: f64,
    /// Remaining foreign room.
    pub current_room: f64,
    /// Total foreign room.
    pub total_room: f64,
    /// Best three bid prices.
    pub bid_price: [f64; 3],
    /// Best three bid quantities.
    pub bid_qtty: [f64; 3],
    /// Best three offer prices.
    pub offer_price: [f64; 3],
    /// Best three offer quantities.
    pub offer_qtty: [f64; 3],
}

impl StockSnapshot {
    /// Zero-valued record for a symbol.
    #[must_use]
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    /// Build a full record from a decoded quote message.
    ///
    /// Returns `None` when the message carries no instrument code.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::MalformedField` for non-numeric values.
    pub fn from_message(message: &DecodedMessage) -> Result<Option<Self>, DecodeError> {
        let Some(update) = SnapshotUpdate::from_message(message)? else {
            return Ok(None);
        };
        let mut snapshot = Self::empty(update.symbol.clone());
        update.apply_to(&mut snapshot);
        Ok(Some(snapshot))
    }

    fn set(&mut self, field: SnapshotField, value: &FieldValue) {
        let number = match value {
            FieldValue::Text(text) => {
                if field == SnapshotField::FloorCode {
                    self.floor_code.clone_from(text);
                }
                return;
            }
            FieldValue::Number(n) => *n,
        };
        let slot = match field {
            SnapshotField::FloorCode => None,
            SnapshotField::BasicPrice => Some(&mut self.basic_price),
            SnapshotField::CeilingPrice => Some(&mut self.ceiling_price),
            SnapshotField::FloorPrice => Some(&mut self.floor_price),
            SnapshotField::MatchPrice => Some(&mut self.match_price),
            SnapshotField::MatchQtty => Some(&mut self.match_qtty),
            SnapshotField::HighestPrice => Some(&mut self.highest_price),
            SnapshotField::LowestPrice => Some(&mut self.lowest_price),
            SnapshotField::AccumulatedVol => Some(&mut self.accumulated_vol),
            SnapshotField::AccumulatedVal => Some(&mut self.accumulated_val),
            SnapshotField::ProjectOpen => Some(&mut self.project_open),
            SnapshotField::BuyForeignQtty => Some(&mut self.buy_foreign_qtty),
            SnapshotField::SellForeignQtty => Some(&mut self.sell_foreign_qtty),
            SnapshotField::CurrentRoom => Some(&mut self.current_room),
            SnapshotField::TotalRoom => Some(&mut self.total_room),
            SnapshotField::BidPrice(level) => self.bid_price.get_mut(usize::from(level)),
            SnapshotField::BidQtty(level) => self.bid_qtty.get_mut(usize::from(level)),
            SnapshotField::OfferPrice(level) => self.offer_price.get_mut(usize::from(level)),
            SnapshotField::OfferQtty(level) => self.offer_qtty.get_mut(usize::from(level)),
        };
        // Levels past the third are not tracked.
        if let Some(slot) = slot {
            *slot = number;
        }
    }
}

// =============================================================================
// Fields
// =============================================================================

/// A snapshot field addressable by a partial update.
///
/// Book levels are zero-based (`0..3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SnapshotField {
    /// Exchange floor code (text).
    FloorCode,
    /// Reference price.
    BasicPrice,
    /// Ceiling price.
    CeilingPrice,
    /// Floor price.
    FloorPrice,
    /// Last matched price.
    MatchPrice,
    /// Last matched quantity.
    MatchQtty,
    /// Session high.
    HighestPrice,
    /// Session low.
    LowestPrice,
    /// Accumulated volume.
    AccumulatedVol,
    /// Accumulated value.
    AccumulatedVal,
    /// Projected open.
    ProjectOpen,
    /// Foreign buy quantity.
    BuyForeignQtty,
    /// Foreign sell quantity.
    SellForeignQtty,
    /// Remaining foreign room.
    CurrentRoom,
    /// Total foreign room.
    TotalRoom,
    /// Bid price at a book level.
    BidPrice(u8),
    /// Bid quantity at a book level.
    BidQtty(u8),
    /// Offer price at a book level.
    OfferPrice(u8),
    /// Offer quantity at a book level.
    OfferQtty(u8),
}

/// Feed field name for every snapshot field.
const FIELD_NAMES: [(&str, SnapshotField); 27] = [
    ("floorCode", SnapshotField::FloorCode),
    ("basicPrice", SnapshotField::BasicPrice),
    ("ceilingPrice", SnapshotField::CeilingPrice),
    ("floorPrice", SnapshotField::FloorPrice),
    ("matchPrice", SnapshotField::MatchPrice),
    ("matchQtty", SnapshotField::MatchQtty),
    ("highestPrice", SnapshotField::HighestPrice),
    ("lowestPrice", SnapshotField::LowestPrice),
    ("accumulatedVol", SnapshotField::AccumulatedVol),
    ("accumulatedVal", SnapshotField::AccumulatedVal),
    ("projectOpen", SnapshotField::ProjectOpen),
    ("buyForeignQtty", SnapshotField::BuyForeignQtty),
    ("sellForeignQtty", SnapshotField::SellForeignQtty),
    ("currentRoom", SnapshotField::CurrentRoom),
    ("totalRoom", SnapshotField::TotalRoom),
    ("bidPrice01", SnapshotField::BidPrice(0)),
    ("bidPrice02", SnapshotField::BidPrice(1)),
    ("bidPrice03", SnapshotField::BidPrice(2)),
    ("bidQtty01", SnapshotField::BidQtty(0)),
    ("bidQtty02", SnapshotField::BidQtty(1)),
    ("bidQtty03", SnapshotField::BidQtty(2)),
    ("offerPrice01", SnapshotField::OfferPrice(0)),
    ("offerPrice02", SnapshotField::OfferPrice(1)),
    ("offerPrice03", SnapshotField::OfferPrice(2)),
    ("offerQtty01", SnapshotField::OfferQtty(0)),
    ("offerQtty02", SnapshotField::OfferQtty(1)),
    ("offerQtty03", SnapshotField::OfferQtty(2)),
];

impl SnapshotField {
    /// Feed field name.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        FIELD_NAMES
            .iter()
            .find(|(_, field)| *field == self)
            .map_or("", |(name, _)| name)
    }

    /// Look up a field by feed field name.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        FIELD_NAMES
            .iter()
            .find(|(wire, _)| *wire == name)
            .map(|(_, field)| *field)
    }

    /// Whether the field holds text rather than a number.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(self, Self::FloorCode)
    }

    /// Whether the field is a bid or offer price level.
    #[must_use]
    pub const fn is_book_price(self) -> bool {
        matches!(self, Self::BidPrice(_) | Self::OfferPrice(_))
    }
}

/// Session markers quoted in book price levels during opening and closing
/// auctions.
const AUCTION_MARKERS: [&str; 2] = ["ATO", "ATC"];

fn is_auction_marker(raw: &str) -> bool {
    AUCTION_MARKERS
        .iter()
        .any(|marker| raw.eq_ignore_ascii_case(marker))
}

/// Value carried by a partial update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Numeric value.
    Number(f64),
    /// Text value.
    Text(String),
}

// =============================================================================
// Partial Update
// =============================================================================

/// A field-subset update for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotUpdate {
    /// Target symbol.
    pub symbol: String,
    /// Fields to overwrite.
    pub fields: BTreeMap<SnapshotField, FieldValue>,
}

impl SnapshotUpdate {
    /// Create an empty update.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style numeric field.
    #[must_use]
    pub fn with_number(mut self, field: SnapshotField, value: f64) -> Self {
        self.fields.insert(field, FieldValue::Number(value));
        self
    }

    /// Builder-style text field.
    #[must_use]
    pub fn with_text(mut self, field: SnapshotField, value: impl Into<String>) -> Self {
        self.fields.insert(field, FieldValue::Text(value.into()));
        self
    }

    /// Whether the update touches no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Extract an update from a decoded quote message.
    ///
    /// Empty values are skipped, so they never clobber cached state. So are
    /// auction markers in book price levels. Returns `None` for non-quote
    /// messages and messages without an instrument code.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::MalformedField` for non-numeric values in the
    /// snapshot fields read.
    pub fn from_message(message: &DecodedMessage) -> Result<Option<Self>, DecodeError> {
        if message.category != MessageCategory::Quote {
            return Ok(None);
        }
        let Some(code) = message.code() else {
            return Ok(None);
        };

        let mut update = Self::new(code);
        for (name, raw) in &message.fields {
            let Some(field) = SnapshotField::from_wire_name(name) else {
                continue;
            };
            if raw.is_empty() || (field.is_book_price() && is_auction_marker(raw)) {
                continue;
            }
            let value = if field.is_text() {
                FieldValue::Text(raw.clone())
            } else {
                FieldValue::Number(coerce_number(name, raw)?)
            };
            update.fields.insert(field, value);
        }
        Ok(Some(update))
    }

    /// Overwrite exactly the carried fields on `snapshot`.
    pub fn apply_to(&self, snapshot: &mut StockSnapshot) {
        for (field, value) in &self.fields {
            snapshot.set(*field, value);
        }
    }
}
