//! Manual order adjustments for well-known scripts.
//!
//! Pinning a few common services keeps the numbering stable, so adding a new
//! script does not renumber every existing link.

use crate::error::{Error, Result};
use crate::order::OrderingService;
use tracing::debug;

/// Highest order expressible in a two-digit link name.
pub const MAX_ORDER: u32 = 99;

/// A single order adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Raise `name` to at least `floor`
    Floor { name: &'static str, floor: u32 },
    /// Place `name` exactly `offset` after `anchor`
    After {
        name: &'static str,
        anchor: &'static str,
        offset: u32,
    },
}

/// Adjustments applied after sorting, in order.
pub const WELL_KNOWN: &[Adjustment] = &[
    Adjustment::Floor { name: "network", floor: 5 },
    Adjustment::After { name: "route", anchor: "network", offset: 2 },
    Adjustment::Floor { name: "inetd", floor: 20 },
    Adjustment::Floor { name: "halt", floor: 20 },
    Adjustment::Floor { name: "reboot", floor: 20 },
    Adjustment::Floor { name: "single", floor: 20 },
    Adjustment::After { name: "single", anchor: "kbd", offset: 2 },
    Adjustment::Floor { name: "serial", floor: 10 },
    Adjustment::Floor { name: "boot.setup", floor: 20 },
    Adjustment::Floor { name: "gpm", floor: 20 },
];

impl Adjustment {
    /// Apply to `ordering` if every service involved has a positive order.
    pub fn apply(&self, ordering: &mut dyn OrderingService) {
        match *self {
            Adjustment::Floor { name, floor } => {
                let order = ordering.get_order(name);
                if order > 0 && order < floor {
                    debug!(service = %name, from = order, to = floor, "Raising order");
                    ordering.set_order(name, floor);
                }
            }
            Adjustment::After { name, anchor, offset } => {
                let base = ordering.get_order(anchor);
                let order = ordering.get_order(name);
                if base > 0 && order > 0 && order != base + offset {
                    debug!(service = %name, anchor = %anchor, to = base + offset, "Placing order");
                    ordering.set_order(name, base + offset);
                }
            }
        }
    }
}

/// Apply `adjustments` and check the result fits two digits.
pub fn post_process(ordering: &mut dyn OrderingService, adjustments: &[Adjustment]) -> Result<u32> {
    for adjustment in adjustments {
        adjustment.apply(ordering);
    }

    let max = ordering.max_order();
    if max > MAX_ORDER {
        return Err(Error::OrderOverflow(max));
    }
    Ok(max)
}
