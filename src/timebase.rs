//! Rational time bases and timestamp rescaling

use std::fmt;

/// RTP clock rate for video payloads (RFC 3551)
pub const RTP_VIDEO_CLOCK_RATE: u32 = 90_000;

/// Duration of one timestamp tick, expressed as `num / den` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// One tick per frame at the given rate
    pub const fn per_frame(frame_rate: u32) -> Self {
        Self::new(1, frame_rate)
    }

    /// The 90 kHz clock RTP video streams are stamped in
    pub const fn rtp_video() -> Self {
        Self::new(1, RTP_VIDEO_CLOCK_RATE)
    }

    /// Converts `value` ticks of `self` into ticks of `target`.
    ///
    /// Rounds to the nearest tick, halves away from zero, so that e.g. one
    /// frame at 7 fps maps to 12857 ticks of the 90 kHz clock.
    pub fn rescale(&self, value: i64, target: TimeBase) -> i64 {
        let numerator = value as i128 * self.num as i128 * target.den as i128;
        let denominator = self.den as i128 * target.num as i128;
        if denominator == 0 {
            return 0;
        }

        let half = denominator / 2;
        let rounded = if numerator >= 0 {
            (numerator + half) / denominator
        } else {
            (numerator - half) / denominator
        };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
