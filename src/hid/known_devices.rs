/* Static table of known SteelSeries OLED keyboards, used by `auto_detect`
 * (4.A). Declaration order is the match order. */

use crate::geometry::DisplayGeometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: &'static str,
    pub geometry: DisplayGeometry,
}

pub const KNOWN_DEVICES: &[KnownDevice] = &[
    KnownDevice {
        vendor_id: 0x1038,
        product_id: 0x1612,
        name: "SteelSeries Apex 7",
        geometry: DisplayGeometry::STEELSERIES_OLED,
    },
    KnownDevice {
        vendor_id: 0x1038,
        product_id: 0x1618,
        name: "SteelSeries Apex Pro",
        geometry: DisplayGeometry::STEELSERIES_OLED,
    },
    KnownDevice {
        vendor_id: 0x1038,
        product_id: 0x161c,
        name: "SteelSeries Apex Pro TKL",
        geometry: DisplayGeometry::STEELSERIES_OLED,
    },
    KnownDevice {
        vendor_id: 0x1038,
        product_id: 0x1622,
        name: "SteelSeries Apex 7 TKL",
        geometry: DisplayGeometry::STEELSERIES_OLED,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_non_empty_and_unique() {
        assert!(!KNOWN_DEVICES.is_empty());
        let mut seen = std::collections::HashSet::new();
        for d in KNOWN_DEVICES {
            assert!(seen.insert((d.vendor_id, d.product_id)));
        }
    }
}
