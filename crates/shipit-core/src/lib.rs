// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shipit Core - Release Shipping Rules
//!
//! This crate holds every rule of the release shipping service that does not
//! touch the network or the database. The HTTP service (`shipit-api`) and the
//! product details worker both build on it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    shipit-api (admin + public HTTP)                      │
//! │        releases, phases, signoffs, XPIs, merge automation, worker        │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       shipit-core (This Crate)                           │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────┐   │
//! │  │ Products │ │ Versions │ │  Scopes  │ │  Hooks   │ │   Product    │   │
//! │  │ Flavors  │ │ Releases │ │  Groups  │ │ Payloads │ │   Details    │   │
//! │  └──────────┘ └──────────┘ └──────────┘ └──────────┘ └──────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`product`] | Product table: phases, authorized groups, repositories |
//! | [`version`] | Gecko and mobile version parsing, ordering and bumping |
//! | [`release`] | Release naming, RC detection, action input |
//! | [`flavors`] | Release promotion flavors and required signoffs |
//! | [`scopes`] | Scope strings, scope matching, groups per scope |
//! | [`repo`] | Source-control helpers and trust domains |
//! | [`hooks`] | Action hook generation and JSON-e rendering |
//! | [`merge`] | Merge automation behaviors and task statuses |
//! | [`product_details`] | Generators for the product details data set |

pub mod error;
pub mod flavors;
pub mod hooks;
pub mod merge;
pub mod product;
pub mod product_details;
pub mod release;
pub mod repo;
pub mod scopes;
pub mod version;

pub use error::{Error, Result};
pub use product::Product;
pub use version::Version;
