// Copyright (C) 2025 Ship It contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Product version numbers.
//!
//! Two notations are in use:
//!
//! | Notation | Examples |
//! |----------|----------|
//! | Gecko | `60.0a1`, `54.0a2`, `68.2b3`, `45.0`, `60.8.0`, `45.2.1esr` |
//! | Mobile | `84.0.0-beta.2`, `84.0.0-rc.1`, `84.0.0` |
//!
//! Versions keep the notation they were parsed from so `Display` gives back
//! the input (modulo bumping).

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::product::Product;

static GECKO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?(?:(a1)|(a2)|b(\d+)|(esr)|rc(\d+))?$")
        .expect("gecko version regex")
});

static MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?(?:-beta\.(\d+)|-rc\.(\d+))?$").expect("mobile version regex")
});

/// Which notations a product accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    /// Desktop Gecko versions (Firefox, Thunderbird, Fennec).
    Gecko,
    /// Gecko notation, betas only.
    Devedition,
    /// Mobile notation; Gecko notation is accepted too since the monorepo move.
    Mobile,
}

/// How the version was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    Gecko,
    Mobile,
}

/// Release stage of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Nightly,
    Aurora,
    Beta(u32),
    ReleaseCandidate(u32),
    Release,
    Esr,
}

impl Stage {
    /// Releases and ESRs share a rank: `60.0esr` and `60.0` compare equal.
    fn rank(&self) -> (u8, u32) {
        match self {
            Stage::Nightly => (0, 0),
            Stage::Aurora => (1, 0),
            Stage::Beta(n) => (2, *n),
            Stage::ReleaseCandidate(n) => (3, *n),
            Stage::Release | Stage::Esr => (4, 0),
        }
    }
}

/// Number to increment when bumping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpField {
    Patch,
    Beta,
    ReleaseCandidate,
}

/// A parsed product version.
#[derive(Debug, Clone, Copy)]
pub struct Version {
    major: u32,
    minor: u32,
    patch: Option<u32>,
    stage: Stage,
    notation: Notation,
}

impl Version {
    /// Parse Gecko notation.
    pub fn parse_gecko(text: &str) -> Result<Self> {
        let caps = GECKO_RE
            .captures(text.trim())
            .ok_or_else(|| invalid("gecko", text, "does not match the gecko notation"))?;
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let stage = if caps.get(4).is_some() {
            Stage::Nightly
        } else if caps.get(5).is_some() {
            Stage::Aurora
        } else if let Some(n) = number(6) {
            Stage::Beta(n)
        } else if caps.get(7).is_some() {
            Stage::Esr
        } else if let Some(n) = number(8) {
            Stage::ReleaseCandidate(n)
        } else {
            Stage::Release
        };
        let version = Self {
            major: number(1).ok_or_else(|| invalid("gecko", text, "major number overflow"))?,
            minor: number(2).ok_or_else(|| invalid("gecko", text, "minor number overflow"))?,
            patch: number(3),
            stage,
            notation: Notation::Gecko,
        };
        if version.patch.is_some() && matches!(stage, Stage::Nightly | Stage::Aurora | Stage::Beta(_)) {
            return Err(invalid("gecko", text, "pre-releases cannot have a patch number"));
        }
        Ok(version)
    }

    /// Parse mobile notation, falling back to Gecko notation.
    pub fn parse_mobile(text: &str) -> Result<Self> {
        if let Some(caps) = MOBILE_RE.captures(text.trim()) {
            let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
            let stage = if let Some(n) = number(4) {
                Stage::Beta(n)
            } else if let Some(n) = number(5) {
                Stage::ReleaseCandidate(n)
            } else {
                Stage::Release
            };
            let notation = if text.contains('-') {
                Notation::Mobile
            } else {
                Notation::Gecko
            };
            return Ok(Self {
                major: number(1).ok_or_else(|| invalid("mobile", text, "major number overflow"))?,
                minor: number(2).ok_or_else(|| invalid("mobile", text, "minor number overflow"))?,
                patch: number(3),
                stage,
                notation,
            });
        }
        Self::parse_gecko(text).map_err(|_| invalid("mobile", text, "does not match any notation"))
    }

    pub fn major_number(&self) -> u32 {
        self.major
    }

    pub fn minor_number(&self) -> u32 {
        self.minor
    }

    pub fn patch_number(&self) -> Option<u32> {
        self.patch
    }

    pub fn beta_number(&self) -> Option<u32> {
        match self.stage {
            Stage::Beta(n) => Some(n),
            _ => None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_nightly(&self) -> bool {
        self.stage == Stage::Nightly
    }

    pub fn is_aurora(&self) -> bool {
        self.stage == Stage::Aurora
    }

    pub fn is_beta(&self) -> bool {
        matches!(self.stage, Stage::Beta(_))
    }

    pub fn is_release_candidate(&self) -> bool {
        matches!(self.stage, Stage::ReleaseCandidate(_))
    }

    pub fn is_release(&self) -> bool {
        self.stage == Stage::Release
    }

    pub fn is_esr(&self) -> bool {
        self.stage == Stage::Esr
    }

    /// Increment the given number, leaving the others untouched.
    pub fn bump(&self, field: BumpField) -> Result<Self> {
        let overflow = || invalid("bump", &self.to_string(), "number overflow");
        let mut bumped = *self;
        match (field, self.stage) {
            (BumpField::Beta, Stage::Beta(n)) => {
                bumped.stage = Stage::Beta(n.checked_add(1).ok_or_else(overflow)?)
            }
            (BumpField::ReleaseCandidate, Stage::ReleaseCandidate(n)) => {
                bumped.stage = Stage::ReleaseCandidate(n.checked_add(1).ok_or_else(overflow)?)
            }
            (BumpField::Patch, Stage::Release | Stage::Esr) => {
                let patch = self.patch.unwrap_or(0).checked_add(1).ok_or_else(overflow)?;
                bumped.patch = Some(patch)
            }
            _ => {
                return Err(invalid(
                    "bump",
                    &self.to_string(),
                    &format!("cannot bump {:?} of this version", field),
                ));
            }
        }
        Ok(bumped)
    }

    /// The most sensible number to bump for this version.
    pub fn natural_bump_field(&self) -> BumpField {
        match self.stage {
            Stage::Beta(_) => BumpField::Beta,
            Stage::ReleaseCandidate(_) => BumpField::ReleaseCandidate,
            _ => BumpField::Patch,
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch.unwrap_or(0), self.stage.rank()).cmp(&(
            other.major,
            other.minor,
            other.patch.unwrap_or(0),
            other.stage.rank(),
        ))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(patch) = self.patch {
            write!(f, ".{}", patch)?;
        }
        match (self.notation, self.stage) {
            (_, Stage::Nightly) => f.write_str("a1"),
            (_, Stage::Aurora) => f.write_str("a2"),
            (Notation::Gecko, Stage::Beta(n)) => write!(f, "b{}", n),
            (Notation::Mobile, Stage::Beta(n)) => write!(f, "-beta.{}", n),
            (Notation::Gecko, Stage::ReleaseCandidate(n)) => write!(f, "rc{}", n),
            (Notation::Mobile, Stage::ReleaseCandidate(n)) => write!(f, "-rc.{}", n),
            (_, Stage::Esr) => f.write_str("esr"),
            (_, Stage::Release) => Ok(()),
        }
    }
}

fn invalid(product: &str, version: &str, reason: &str) -> Error {
    Error::InvalidVersion {
        product: product.to_string(),
        version: version.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a version with the notation of the given product.
pub fn parse_version(product: &str, version: &str) -> Result<Version> {
    let product: Product = product.parse()?;
    match product.config().version_scheme {
        VersionScheme::Gecko => Version::parse_gecko(version),
        VersionScheme::Devedition => {
            let parsed = Version::parse_gecko(version)?;
            if !parsed.is_beta() {
                return Err(invalid(product.as_str(), version, "devedition only ships betas"));
            }
            Ok(parsed)
        }
        VersionScheme::Mobile => Version::parse_mobile(version),
    }
}
