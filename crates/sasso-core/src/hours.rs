//! Business Hours Gate. Decides between the live-dial and voicemail paths.

use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

/// An hourly open window, every day, in a fixed IANA time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
  tz:    Tz,
  /// First open hour, inclusive.
  open:  u32,
  /// First closed hour, exclusive. May be less than `open` for a window that
  /// spans midnight.
  close: u32,
}

impl Default for BusinessHours {
  fn default() -> Self {
    Self { tz: chrono_tz::America::New_York, open: 8, close: 19 }
  }
}

impl BusinessHours {
  pub fn new(timezone: &str, open: u32, close: u32) -> Result<Self> {
    let tz = Tz::from_str(timezone)
      .map_err(|_| Error::UnknownTimeZone(timezone.to_owned()))?;
    if open > 23 || close > 24 || open == close {
      return Err(Error::InvalidHours { open, close });
    }
    Ok(Self { tz, open, close })
  }

  pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
    let hour = at.with_timezone(&self.tz).hour();
    if self.open < self.close {
      (self.open..self.close).contains(&hour)
    } else {
      hour >= self.open || hour < self.close
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn utc(h: u32, m: u32) -> DateTime<Utc> {
    // 2024-01-15 is in EST (UTC-5).
    Utc.with_ymd_and_hms(2024, 1, 15, h, m, 0).unwrap()
  }

  #[test]
  fn default_window_is_eight_to_seven_eastern() {
    let hours = BusinessHours::default();
    assert!(!hours.is_open_at(utc(12, 59))); // 07:59 local
    assert!(hours.is_open_at(utc(13, 0)));   // 08:00
    assert!(hours.is_open_at(utc(23, 59)));  // 18:59
    assert!(!hours.is_open_at(utc(0, 0)));   // 19:00
  }

  #[test]
  fn window_spanning_midnight() {
    let hours = BusinessHours::new("UTC", 22, 6).unwrap();
    assert!(hours.is_open_at(utc(23, 0)));
    assert!(hours.is_open_at(utc(5, 59)));
    assert!(!hours.is_open_at(utc(6, 0)));
    assert!(!hours.is_open_at(utc(21, 59)));
  }

  #[test]
  fn rejects_bad_configuration() {
    assert!(matches!(
      BusinessHours::new("Mars/Olympus", 8, 19),
      Err(Error::UnknownTimeZone(_))
    ));
    assert!(matches!(
      BusinessHours::new("UTC", 9, 9),
      Err(Error::InvalidHours { .. })
    ));
    assert!(BusinessHours::new("UTC", 0, 24).is_ok());
  }
}
