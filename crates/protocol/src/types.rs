use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Entity kind a finished upload is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    /// Appended to an order's document collection.
    #[serde(rename = "order_document")]
    OrderDocument,
    /// Replaces a product's single document slot.
    #[serde(rename = "product_document")]
    ProductDocument,
}

impl TargetType {
    /// Wire name of the variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderDocument => "order_document",
            Self::ProductDocument => "product_document",
        }
    }

    /// Public storage namespace finalized files of this kind are written to.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::OrderDocument => "orders/documents",
            Self::ProductDocument => "products/documents",
        }
    }

    /// Name of the owning entity, used in not-found messages.
    pub fn entity(&self) -> &'static str {
        match self {
            Self::OrderDocument => "order",
            Self::ProductDocument => "product",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known [`TargetType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid target type: {0}")]
pub struct ParseTargetTypeError(pub String);

impl FromStr for TargetType {
    type Err = ParseTargetTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order_document" => Ok(Self::OrderDocument),
            "product_document" => Ok(Self::ProductDocument),
            other => Err(ParseTargetTypeError(other.to_string())),
        }
    }
}
