//! Wall-clock values on the wire.
//!
//! Workers report timestamps and rusage times as `seconds[.fraction]`
//! with either `.` or `,` as the decimal separator (locale-infected
//! printf on the worker side makes both appear in practice). The
//! fraction denotes decimal fractions of a second and is scaled to
//! microseconds.

use std::fmt;

/// A `(seconds, microseconds)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeval {
    pub sec: i64,
    pub usec: i64,
}

impl Timeval {
    pub const ZERO: Self = Self { sec: 0, usec: 0 };

    pub fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }

    #[inline]
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.usec as f64 / 1_000_000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimevalParseError;

impl fmt::Display for TimevalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed time value")
    }
}

impl std::error::Error for TimevalParseError {}

/// Parse `seconds[.fraction]` / `seconds,fraction`.
///
/// The fraction is optional and scaled to microseconds: `"5.25"` is
/// 5 s 250000 µs, not 25 µs. Digits beyond microsecond precision are
/// dropped. Trailing bytes after the number are ignored. Input that does
/// not start with a digit is an error; callers fall back to
/// [`Timeval::ZERO`].
pub fn parse_timeval(s: &[u8]) -> Result<Timeval, TimevalParseError> {
    let (sec, rest) = take_digits(s);
    let Some(sec) = sec else {
        return Err(TimevalParseError);
    };

    let mut usec: i64 = 0;
    if let Some((&sep, frac)) = rest.split_first() {
        if sep == b'.' || sep == b',' {
            let mut scale = 100_000i64;
            for &b in frac.iter().take_while(|b| b.is_ascii_digit()).take(6) {
                usec += (b - b'0') as i64 * scale;
                scale /= 10;
            }
        }
    }

    Ok(Timeval { sec, usec })
}

/// Consume leading ASCII digits; `None` when there are none.
fn take_digits(s: &[u8]) -> (Option<i64>, &[u8]) {
    let n = s.iter().take_while(|b| b.is_ascii_digit()).count();
    if n == 0 {
        return (None, s);
    }
    let mut val: i64 = 0;
    for &b in &s[..n] {
        val = val.saturating_mul(10).saturating_add((b - b'0') as i64);
    }
    (Some(val), &s[n..])
}
