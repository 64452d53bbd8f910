//! Periodic table subset: symbols, default valences, monoisotopic masses

/// Mass of one electron in Da
pub const ELECTRON_MASS: f64 = 0.000_548_579_909_46;

#[derive(Debug, Clone, Copy)]
pub struct ElementInfo {
    pub number: u8,
    pub symbol: &'static str,
    /// Mass of the most abundant isotope
    pub mass: f64,
    /// Allowed valences for implicit hydrogen assignment; empty for elements
    /// that only appear in brackets
    pub valences: &'static [u8],
}

pub const HYDROGEN: u8 = 1;
pub const CARBON: u8 = 6;

static ELEMENTS: &[ElementInfo] = &[
    ElementInfo { number: 1, symbol: "H", mass: 1.007_825_032, valences: &[1] },
    ElementInfo { number: 2, symbol: "He", mass: 4.002_603_254_15, valences: &[] },
    ElementInfo { number: 3, symbol: "Li", mass: 7.016_004_5, valences: &[] },
    ElementInfo { number: 5, symbol: "B", mass: 11.009_305_4, valences: &[3] },
    ElementInfo { number: 6, symbol: "C", mass: 12.0, valences: &[4] },
    ElementInfo { number: 7, symbol: "N", mass: 14.003_074_004_8, valences: &[3, 5] },
    ElementInfo { number: 8, symbol: "O", mass: 15.994_914_619_56, valences: &[2] },
    ElementInfo { number: 9, symbol: "F", mass: 18.998_403_22, valences: &[1] },
    ElementInfo { number: 11, symbol: "Na", mass: 22.989_769_280_9, valences: &[] },
    ElementInfo { number: 12, symbol: "Mg", mass: 23.985_041_7, valences: &[] },
    ElementInfo { number: 13, symbol: "Al", mass: 26.981_538_63, valences: &[] },
    ElementInfo { number: 14, symbol: "Si", mass: 27.976_926_532_5, valences: &[] },
    ElementInfo { number: 15, symbol: "P", mass: 30.973_761_63, valences: &[3, 5] },
    ElementInfo { number: 16, symbol: "S", mass: 31.972_071_00, valences: &[2, 4, 6] },
    ElementInfo { number: 17, symbol: "Cl", mass: 34.968_852_68, valences: &[1] },
    ElementInfo { number: 19, symbol: "K", mass: 38.963_706_68, valences: &[] },
    ElementInfo { number: 20, symbol: "Ca", mass: 39.962_590_98, valences: &[] },
    ElementInfo { number: 26, symbol: "Fe", mass: 55.934_937_5, valences: &[] },
    ElementInfo { number: 29, symbol: "Cu", mass: 62.929_597_5, valences: &[] },
    ElementInfo { number: 30, symbol: "Zn", mass: 63.929_142_2, valences: &[] },
    ElementInfo { number: 33, symbol: "As", mass: 74.921_596_5, valences: &[] },
    ElementInfo { number: 34, symbol: "Se", mass: 79.916_521_3, valences: &[] },
    ElementInfo { number: 35, symbol: "Br", mass: 78.918_337_1, valences: &[1] },
    ElementInfo { number: 50, symbol: "Sn", mass: 119.902_194_7, valences: &[] },
    ElementInfo { number: 53, symbol: "I", mass: 126.904_473, valences: &[1] },
];

/// Exact isotope masses for the labels that show up in practice
static ISOTOPES: &[(u8, u16, f64)] = &[
    (1, 2, 2.014_101_778_12),
    (1, 3, 3.016_049_277_7),
    (6, 13, 13.003_354_835_07),
    (6, 14, 14.003_241_989),
    (7, 15, 15.000_108_898_9),
    (8, 17, 16.999_131_70),
    (8, 18, 17.999_161_0),
];

pub fn by_symbol(symbol: &str) -> Option<&'static ElementInfo> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

pub fn by_number(number: u8) -> Option<&'static ElementInfo> {
    ELEMENTS.iter().find(|e| e.number == number)
}

/// Mass of one atom of `number`, honoring an isotope label when present
pub fn atom_mass(number: u8, isotope: Option<u16>) -> f64 {
    match isotope {
        Some(mass_number) => ISOTOPES
            .iter()
            .find(|(n, a, _)| *n == number && *a == mass_number)
            .map(|(_, _, m)| *m)
            .unwrap_or(mass_number as f64),
        None => by_number(number).map(|e| e.mass).unwrap_or(0.0),
    }
}
