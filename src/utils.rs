//! Numeric rendering helpers shared by the pepXML writer, plus the residue
//! mass table used when declaring modifications in the search summary.

/// Mass of a proton, used to convert reported M+H values to neutral masses.
pub const PROTON: f64 = 1.00727646677;

/// Monoisotopic mass of the peptide N-terminus (a hydrogen).
pub const N_TERMINUS_MASS: f64 = 1.00782503;
/// Monoisotopic mass of the peptide C-terminus (a hydroxyl).
pub const C_TERMINUS_MASS: f64 = 17.00273963;

/// Default number of decimal digits for mass-like attributes.
pub const DEFAULT_MASS_DIGITS: usize = 4;
/// Mass differences carry an extra digit per the pepXML convention.
pub const MASS_DIFF_DIGITS: usize = 5;
/// Retention times are reported in seconds with two decimal digits.
pub const RETENTION_TIME_DIGITS: usize = 2;

/// Render `value` with a fixed number of decimal digits.
#[inline]
pub fn format_fixed(value: f64, digits: usize) -> String {
    format!("{:.*}", digits, value)
}

/// Render `value` with a fixed number of decimal digits and an explicit
/// leading sign. The pepXML schema requires `massdiff`-style attributes to
/// carry a `+` or `-` prefix; zero counts as non-negative.
#[inline]
pub fn format_signed(value: f64, digits: usize) -> String {
    if value >= 0.0 {
        format!("+{:.*}", digits, value)
    } else {
        format!("{:.*}", digits, value)
    }
}

/// Best-effort parse of a numeric field from a legacy text export. Blank or
/// corrupt cells degrade to the default instead of failing the record.
#[inline]
pub fn parse_f64_or_default(text: &str) -> f64 {
    text.trim().parse().unwrap_or(0.0)
}

/// Monoisotopic mass of an amino acid residue, or `None` for characters that
/// are not standard residues (modification symbols, terminal markers).
pub fn residue_mass(residue: char) -> Option<f64> {
    let mass = match residue {
        'A' => 71.03711,
        'R' => 156.10111,
        'N' => 114.04293,
        'D' => 115.02694,
        'C' => 103.00919,
        'E' => 129.04259,
        'Q' => 128.05858,
        'G' => 57.02146,
        'H' => 137.05891,
        'I' => 113.08406,
        'L' => 113.08406,
        'K' => 128.09496,
        'M' => 131.04049,
        'F' => 147.06841,
        'P' => 97.05276,
        'S' => 87.03203,
        'T' => 101.04768,
        'W' => 186.07931,
        'Y' => 163.06333,
        'V' => 99.06841,
        'U' => 150.95363,
        'O' => 237.14773,
        _ => return None,
    };
    Some(mass)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_fixed() {
        assert_eq!(format_fixed(1.23456789, 4), "1.2346");
        assert_eq!(format_fixed(0.0, 2), "0.00");
        assert_eq!(format_fixed(-12.5, 4), "-12.5000");
    }

    #[test]
    fn test_format_signed() {
        assert!(format_signed(0.00001, 5).starts_with('+'));
        assert!(format_signed(-0.00001, 5).starts_with('-'));
        assert!(format_signed(0.0, 5).starts_with('+'));
        assert_eq!(format_signed(0.00001, 5), "+0.00001");
        assert_eq!(format_signed(-1.5, 5), "-1.50000");
    }

    #[test]
    fn test_parse_fallback() {
        assert_eq!(parse_f64_or_default("3.25"), 3.25);
        assert_eq!(parse_f64_or_default(" 3.25 "), 3.25);
        assert_eq!(parse_f64_or_default("abc"), 0.0);
        assert_eq!(parse_f64_or_default(""), 0.0);
    }

    #[test]
    fn test_residue_masses() {
        for aa in "ARNDCEQGHILKMFPSTWYV".chars() {
            assert!(residue_mass(aa).unwrap() > 0.0);
        }
        assert!(residue_mass('*').is_none());
        assert!(residue_mass('<').is_none());
    }
}
