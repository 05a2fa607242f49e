//! The nine fixed runlevels and their link directories.

use bitflags::bitflags;
use std::fmt;
use tracing::warn;

/// Characters separating tokens in header values, level strings and targets.
pub const DELIMITERS: &[char] = &[' ', ',', ';', '\t'];

/// Split a value on [`DELIMITERS`], dropping empty tokens.
pub fn tokens(value: &str) -> impl Iterator<Item = &str> {
    value.split(DELIMITERS).filter(|t| !t.is_empty())
}

bitflags! {
    /// Set of runlevels a service is active in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Runlevels: u16 {
        const HALT = 1 << 0;
        const ONE = 1 << 1;
        const TWO = 1 << 2;
        const THREE = 1 << 3;
        const FOUR = 1 << 4;
        const FIVE = 1 << 5;
        const REBOOT = 1 << 6;
        const SINGLE = 1 << 7;
        const BOOT = 1 << 8;
    }
}

/// One runlevel directory under the scripts root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runlevel {
    /// Position in [`Runlevel::ALL`]
    pub index: usize,
    /// Directory name relative to the scripts root
    pub dir: &'static str,
    /// Token used in level strings
    pub token: &'static str,
    /// Bit in a [`Runlevels`] mask
    pub flag: Runlevels,
}

impl Runlevel {
    /// All runlevels in scan order.
    pub const ALL: [Runlevel; 9] = [
        Runlevel::new(0, "rc0.d", "0", Runlevels::HALT),
        Runlevel::new(1, "rc1.d", "1", Runlevels::ONE),
        Runlevel::new(2, "rc2.d", "2", Runlevels::TWO),
        Runlevel::new(3, "rc3.d", "3", Runlevels::THREE),
        Runlevel::new(4, "rc4.d", "4", Runlevels::FOUR),
        Runlevel::new(5, "rc5.d", "5", Runlevels::FIVE),
        Runlevel::new(6, "rc6.d", "6", Runlevels::REBOOT),
        Runlevel::new(7, "rcS.d", "S", Runlevels::SINGLE),
        Runlevel::new(8, "boot.d", "B", Runlevels::BOOT),
    ];

    const fn new(index: usize, dir: &'static str, token: &'static str, flag: Runlevels) -> Self {
        Self {
            index,
            dir,
            token,
            flag,
        }
    }

    /// Halt, reboot and boot are never left again, so kill links are useless there.
    pub fn is_one_way(&self) -> bool {
        matches!(self.index, 0 | 6 | 8)
    }

    /// Look up a runlevel by its level-string token.
    pub fn from_token(token: &str) -> Option<Runlevel> {
        Self::ALL
            .iter()
            .find(|level| level.token.eq_ignore_ascii_case(token))
            .copied()
    }
}

impl fmt::Display for Runlevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir)
    }
}

impl Runlevels {
    /// Parse a level string such as `"2 3 5"` or `"1,S"`.
    ///
    /// Unknown tokens are reported and ignored.
    pub fn parse(value: &str) -> Runlevels {
        let mut levels = Runlevels::empty();
        for token in tokens(value) {
            match Runlevel::from_token(token) {
                Some(level) => levels |= level.flag,
                None => warn!(runlevel = %token, "Unexpected runlevel, ignored"),
            }
        }
        levels
    }
}

impl fmt::Display for Runlevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for level in Runlevel::ALL.iter().filter(|l| self.contains(l.flag)) {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(level.token)?;
            first = false;
        }
        Ok(())
    }
}
