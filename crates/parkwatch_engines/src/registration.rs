#![forbid(unsafe_code)]

use chrono::NaiveDate;
use parkwatch_kernel_contracts::observation::RegistrationPeriod;
use parkwatch_kernel_contracts::Timestamp;

/// Last calendar day a registration for `period` is valid.
pub fn last_valid_day(period: RegistrationPeriod) -> Option<NaiveDate> {
    let (next_year, next_month) = if period.month == 12 {
        (period.year.checked_add(1)?, 1)
    } else {
        (period.year, period.month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// True when the registration ran out before the (UTC) day of the encounter.
///
/// A sticker for the current month is still valid; one for the previous month
/// is expired from the first of this month on.
pub fn is_registration_expired(period: RegistrationPeriod, observed_at: Timestamp) -> bool {
    match last_valid_day(period) {
        Some(last) => last < observed_at.date_naive(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn period(year: i32, month: u32) -> RegistrationPeriod {
        RegistrationPeriod::new(year, month).unwrap()
    }

    #[test]
    fn at_registration_01_current_month_is_not_expired() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 0).unwrap();
        assert!(!is_registration_expired(period(2026, 3), now));
    }

    #[test]
    fn at_registration_02_previous_month_is_expired() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert!(is_registration_expired(period(2026, 2), now));
    }

    #[test]
    fn at_registration_03_year_boundary_and_leap_day() {
        let jan = Utc.with_ymd_and_hms(2027, 1, 15, 12, 0, 0).unwrap();
        assert!(is_registration_expired(period(2026, 12), jan));

        assert_eq!(
            last_valid_day(period(2028, 2)),
            NaiveDate::from_ymd_opt(2028, 2, 29)
        );
        let leap_day = Utc.with_ymd_and_hms(2028, 2, 29, 10, 0, 0).unwrap();
        assert!(!is_registration_expired(period(2028, 2), leap_day));
    }

    #[test]
    fn at_registration_04_future_sticker_is_valid() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        assert!(!is_registration_expired(period(2027, 1), now));
    }
}
