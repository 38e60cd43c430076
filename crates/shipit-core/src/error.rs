// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for shipit-core.

use thiserror::Error;

/// Domain errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The product name is not part of the product table.
    #[error("Product {0} versions are not supported")]
    UnknownProduct(String),

    /// A version string could not be parsed for the product.
    #[error("Invalid version `{version}` for {product}: {reason}")]
    InvalidVersion {
        /// Product the version was parsed for.
        product: String,
        /// The offending version string.
        version: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The release cannot be mapped to release promotion flavors.
    #[error("{0}")]
    UnsupportedFlavor(String),

    /// A hook payload template could not be rendered.
    #[error("Template rendering failed: {0}")]
    Render(String),

    /// A lookup did not match anything.
    #[error("{0}")]
    NotFound(String),

    /// A lookup matched more than one item.
    #[error("{0}")]
    Ambiguous(String),

    /// Product details data is inconsistent.
    #[error("{0}")]
    ProductDetails(String),
}

/// Result type using core Error.
pub type Result<T> = std::result::Result<T, Error>;
