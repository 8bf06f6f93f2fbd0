//! Packed 32-bit date/time stamps
//!
//! Layout: `(year - 1995) << 26 | month << 22 | day << 17 | hour << 12 |
//! minute << 6 | second`. Stamps are interpreted as UTC.

/// Broken-down date/time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Datime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl Datime {
    /// Earliest representable year
    pub const EPOCH_YEAR: u32 = 1995;

    pub const fn pack(&self) -> u32 {
        let year = if self.year < Self::EPOCH_YEAR { 0 } else { self.year - Self::EPOCH_YEAR };
        year << 26
            | (self.month & 0xf) << 22
            | (self.day & 0x1f) << 17
            | (self.hour & 0x1f) << 12
            | (self.minute & 0x3f) << 6
            | (self.second & 0x3f)
    }

    pub const fn unpack(v: u32) -> Self {
        Self {
            year: (v >> 26) + Self::EPOCH_YEAR,
            month: (v >> 22) & 0xf,
            day: (v >> 17) & 0x1f,
            hour: (v >> 12) & 0x1f,
            minute: (v >> 6) & 0x3f,
            second: v & 0x3f,
        }
    }

    /// Convert seconds since the Unix epoch (UTC)
    pub const fn from_unix(secs: i64) -> Self {
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400);

        // civil-from-days over 400-year eras
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };

        Self {
            year: year as u32,
            month: month as u32,
            day: day as u32,
            hour: (rem / 3600) as u32,
            minute: ((rem % 3600) / 60) as u32,
            second: (rem % 60) as u32,
        }
    }
}

impl core::fmt::Display for Datime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_unix() {
        let d = Datime::from_unix(1_700_000_000);
        assert_eq!(
            d,
            Datime { year: 2023, month: 11, day: 14, hour: 22, minute: 13, second: 20 }
        );
        assert_eq!(Datime::from_unix(0).year, 1970);
    }

    #[test]
    fn test_pack_roundtrip() {
        let d = Datime { year: 2024, month: 2, day: 29, hour: 23, minute: 59, second: 58 };
        assert_eq!(Datime::unpack(d.pack()), d);
    }
}
