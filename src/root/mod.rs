//! Root file dispatch and the per-game handler surface.
//!
//! The root file is an ordinary encoded blob; its first dword selects the
//! handler. The three variants share no fields, only a capability surface,
//! so they are a tagged enum rather than a trait object.

mod diablo3;
mod mndx;
mod wow6;

pub use diablo3::{DIABLO3_SIGNATURE, Diablo3Root};
pub use mndx::{MNDX_SIGNATURE, MndxRoot};
pub use wow6::WowRoot;

use crate::error::{CascError, Result};
use crate::types::{ContentKey, GameId};
use byteorder::{ByteOrder, LittleEndian};
use std::ops::BitOr;
use tracing::debug;

/// Capabilities a root handler offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RootFeatures(u32);

impl RootFeatures {
    pub const NONE: Self = Self(0);
    /// File names (or name hashes) are available.
    pub const HAS_NAMES: Self = Self(0x1);
    /// Entries carry locale masks.
    pub const HAS_LOCALES: Self = Self(0x2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RootFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The selected per-game root handler.
pub enum RootHandler {
    WoW6(WowRoot),
    Diablo3(Diablo3Root),
    Mndx(MndxRoot),
}

impl RootHandler {
    /// Select and construct a handler from a decoded root image.
    pub fn dispatch(data: Vec<u8>, locale_mask: u32) -> Result<Self> {
        if data.len() < 4 {
            return Err(CascError::BadFormat("root file too short".into()));
        }

        let signature = LittleEndian::read_u32(&data[0..4]);
        let handler = match signature {
            MNDX_SIGNATURE => {
                debug!("root signature MNDX");
                Self::Mndx(MndxRoot::parse(data)?)
            }
            DIABLO3_SIGNATURE => {
                debug!("root signature Diablo3");
                Self::Diablo3(Diablo3Root::parse(data)?)
            }
            _ => {
                debug!("no known root signature, assuming WoW6");
                Self::WoW6(WowRoot::parse(&data, locale_mask)?)
            }
        };
        Ok(handler)
    }

    pub fn game(&self) -> GameId {
        match self {
            Self::WoW6(_) => GameId::WorldOfWarcraft,
            Self::Diablo3(_) => GameId::Diablo3,
            Self::Mndx(_) => GameId::HeroesOfTheStorm,
        }
    }

    pub fn features(&self) -> RootFeatures {
        match self {
            Self::WoW6(_) => RootFeatures::HAS_NAMES | RootFeatures::HAS_LOCALES,
            Self::Diablo3(_) => RootFeatures::NONE,
            Self::Mndx(_) => RootFeatures::HAS_NAMES,
        }
    }

    /// Resolve a file name to its content key, if this handler has names
    /// decoded.
    pub fn lookup(&self, name: &str) -> Option<&ContentKey> {
        match self {
            Self::WoW6(root) => root.lookup(name),
            Self::Diablo3(_) | Self::Mndx(_) => None,
        }
    }

    /// All decoded (name hash, content key) pairs.
    pub fn entries(&self) -> Vec<(u64, ContentKey)> {
        match self {
            Self::WoW6(root) => root.entries().map(|(hash, key)| (hash, *key)).collect(),
            Self::Diablo3(_) | Self::Mndx(_) => Vec::new(),
        }
    }
}
