//! Локальное время бота.
//!
//! `time` отказывается читать системный часовой пояс, когда в процессе больше
//! одного потока, поэтому смещение определяется один раз, до старта рантайма.

use anyhow::{anyhow, Result};
use time::{OffsetDateTime, UtcOffset};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    offset: UtcOffset,
}

impl Clock {
    pub fn utc() -> Self {
        Self { offset: UtcOffset::UTC }
    }

    pub fn from_offset_minutes(minutes: i64) -> Result<Self> {
        let seconds = minutes
            .checked_mul(60)
            .and_then(|s| i32::try_from(s).ok())
            .ok_or_else(|| anyhow!("TZ_OFFSET_MINUTES is too large: {minutes}"))?;
        let offset = UtcOffset::from_whole_seconds(seconds)
            .map_err(|err| anyhow!("invalid TZ_OFFSET_MINUTES {minutes}: {err}"))?;
        Ok(Self { offset })
    }

    /// Смещение из конфига, иначе системное, иначе UTC.
    /// Вызывать до создания многопоточного рантайма.
    pub fn detect(configured_minutes: Option<i64>) -> Result<Self> {
        if let Some(minutes) = configured_minutes {
            let clock = Self::from_offset_minutes(minutes)?;
            info!(offset = %clock.offset, "Using configured UTC offset");
            return Ok(clock);
        }
        match UtcOffset::current_local_offset() {
            Ok(offset) => {
                info!(%offset, "Using system UTC offset");
                Ok(Self { offset })
            }
            Err(err) => {
                warn!(error = %err, "System UTC offset unavailable, falling back to UTC");
                Ok(Self::utc())
            }
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn now(&self) -> OffsetDateTime {
        self.at(OffsetDateTime::now_utc())
    }

    pub fn at(&self, instant: OffsetDateTime) -> OffsetDateTime {
        instant.to_offset(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn configured_offset_shifts_wall_clock() {
        let clock = Clock::detect(Some(180)).unwrap();
        assert_eq!(clock.offset(), offset!(+3));
        let local = clock.at(datetime!(2026-09-03 07:00 UTC));
        assert_eq!((local.hour(), local.minute()), (10, 0));
        assert_eq!(local, datetime!(2026-09-03 07:00 UTC));
    }

    #[test]
    fn negative_and_invalid_offsets() {
        let clock = Clock::from_offset_minutes(-330).unwrap();
        assert_eq!(clock.offset(), offset!(-5:30));
        assert!(Clock::from_offset_minutes(26 * 60).is_err());
        assert!(Clock::from_offset_minutes(i64::MAX).is_err());
    }

    #[test]
    fn detect_without_config_never_fails() {
        assert!(Clock::detect(None).is_ok());
        assert_eq!(Clock::utc().at(datetime!(2026-01-01 00:00 UTC)).hour(), 0);
    }
}
