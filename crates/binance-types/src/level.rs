//! Price level types with decimal precision

use rust_decimal::Decimal;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single price level in the orderbook
///
/// On the wire a level is a two-element array of decimal strings,
/// `["price", "quantity"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceLevel {
    /// Price of this level
    pub price: Decimal,
    /// Quantity at this price level (zero in a diff means "remove")
    pub quantity: Decimal,
}

impl PriceLevel {
    /// Create a new price level
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }

    /// Check if this level has zero quantity (should be removed)
    pub fn is_zero(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Check neither price nor quantity is below zero
    pub fn is_non_negative(&self) -> bool {
        self.price >= Decimal::ZERO && self.quantity >= Decimal::ZERO
    }
}

impl Serialize for PriceLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.price.to_string())?;
        tuple.serialize_element(&self.quantity.to_string())?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for PriceLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(PriceLevelVisitor)
    }
}

struct PriceLevelVisitor;

impl<'de> Visitor<'de> for PriceLevelVisitor {
    type Value = PriceLevel;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a [price, quantity] pair of decimal strings")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PriceLevel, A::Error> {
        let price: DecimalField = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let quantity: DecimalField = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;

        // Binance occasionally appends fields to level arrays; ignore them
        while seq.next_element::<de::IgnoredAny>()?.is_some() {}

        let level = PriceLevel::new(price.0, quantity.0);
        if !level.is_non_negative() {
            return Err(de::Error::custom(format!(
                "negative value in level [{}, {}]",
                level.price, level.quantity
            )));
        }
        Ok(level)
    }
}

/// CRITICAL: decimal field that never passes through f64
///
/// Binance sends strings. Bare JSON numbers are accepted through their
/// textual form so test fixtures and other venues still decode exactly.
struct DecimalField(Decimal);

impl<'de> Deserialize<'de> for DecimalField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNumber {
            String(String),
            Number(serde_json::Number),
        }

        let text = match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        };

        let parsed = if text.contains('e') || text.contains('E') {
            Decimal::from_scientific(&text)
        } else {
            Decimal::from_str(&text)
        };

        parsed.map(DecimalField).map_err(de::Error::custom)
    }
}
