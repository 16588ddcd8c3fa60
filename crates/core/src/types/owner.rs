//! Gallery owners.
//!
//! A gallery belongs either to a product or to one color variant of a
//! product. Each owner has its own independent image collection.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::id::{IdParseError, ProductId, VariantId};

/// Errors that can occur when parsing an [`Owner`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnerParseError {
    /// The input string is empty.
    #[error("owner cannot be empty")]
    Empty,
    /// One of the ID components is not a number.
    #[error(transparent)]
    InvalidId(#[from] IdParseError),
    /// More than two components were given.
    #[error("owner must be PRODUCT or PRODUCT:VARIANT (got {0:?})")]
    Malformed(String),
}

/// The product or color variant a gallery belongs to.
///
/// ## Examples
///
/// ```
/// use opsdesk_core::{Owner, ProductId, VariantId};
///
/// let product: Owner = "12".parse().unwrap();
/// assert_eq!(product, Owner::product(ProductId::new(12)));
///
/// let variant: Owner = "12:3".parse().unwrap();
/// assert_eq!(variant.path_segment(), "products/12/variants/3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Owner {
    /// Gallery of a product.
    #[serde(rename_all = "camelCase")]
    Product { product_id: ProductId },
    /// Gallery of one color variant of a product.
    #[serde(rename_all = "camelCase")]
    ColorVariant {
        product_id: ProductId,
        variant_id: VariantId,
    },
}

impl Owner {
    /// Owner for a product gallery.
    #[must_use]
    pub const fn product(product_id: ProductId) -> Self {
        Self::Product { product_id }
    }

    /// Owner for a color variant gallery.
    #[must_use]
    pub const fn color_variant(product_id: ProductId, variant_id: VariantId) -> Self {
        Self::ColorVariant {
            product_id,
            variant_id,
        }
    }

    /// The product this gallery ultimately belongs to.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        match self {
            Self::Product { product_id } | Self::ColorVariant { product_id, .. } => *product_id,
        }
    }

    /// Relative path identifying this owner, used for resource URLs and
    /// upload folders.
    #[must_use]
    pub fn path_segment(&self) -> String {
        match self {
            Self::Product { product_id } => format!("products/{product_id}"),
            Self::ColorVariant {
                product_id,
                variant_id,
            } => format!("products/{product_id}/variants/{variant_id}"),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product { product_id } => write!(f, "product {product_id}"),
            Self::ColorVariant {
                product_id,
                variant_id,
            } => write!(f, "product {product_id} variant {variant_id}"),
        }
    }
}

impl FromStr for Owner {
    type Err = OwnerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(OwnerParseError::Empty);
        }

        let mut parts = s.split(':');
        let product_id = parts.next().unwrap_or_default().parse::<ProductId>()?;
        let variant_id = parts.next().map(str::parse::<VariantId>).transpose()?;

        if parts.next().is_some() {
            return Err(OwnerParseError::Malformed(s.to_string()));
        }

        Ok(variant_id.map_or_else(
            || Self::product(product_id),
            |variant_id| Self::color_variant(product_id, variant_id),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner() {
        assert_eq!(
            "7".parse::<Owner>().unwrap(),
            Owner::product(ProductId::new(7))
        );
        assert_eq!(
            "7:2".parse::<Owner>().unwrap(),
            Owner::color_variant(ProductId::new(7), VariantId::new(2))
        );
    }

    #[test]
    fn test_parse_owner_errors() {
        assert_eq!("".parse::<Owner>().unwrap_err(), OwnerParseError::Empty);
        assert!(matches!(
            "7:x".parse::<Owner>().unwrap_err(),
            OwnerParseError::InvalidId(_)
        ));
        assert!(matches!(
            "1:2:3".parse::<Owner>().unwrap_err(),
            OwnerParseError::Malformed(_)
        ));
    }

    #[test]
    fn test_owner_wire_format() {
        let owner = Owner::color_variant(ProductId::new(4), VariantId::new(5));
        let json = serde_json::to_value(owner).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "color_variant", "productId": 4, "variantId": 5})
        );
    }

    #[test]
    fn test_owner_display() {
        let owner = Owner::product(ProductId::new(4));
        assert_eq!(owner.to_string(), "product 4");
        assert_eq!(owner.path_segment(), "products/4");
    }
}
