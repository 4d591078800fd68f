//! Fine amounts

use rollcall_api::AttendanceStatus;
use rollcall_config::{FineOverrides, FineSchedule};
use rust_decimal::Decimal;

/// Turns an attendance outcome into a fine amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineCalculator {
    defaults: FineSchedule,
}

impl FineCalculator {
    pub fn new(defaults: FineSchedule) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &FineSchedule {
        &self.defaults
    }

    /// Amount owed for `status`; zero means no fine is issued.
    ///
    /// Late arrivals pay per whole minute, never less than the minimum late
    /// fine. A scan less than a minute outside its window is not charged.
    pub fn calculate(
        &self,
        status: AttendanceStatus,
        minutes_late: u32,
        overrides: &FineOverrides,
    ) -> Decimal {
        match status {
            AttendanceStatus::Absent => self.absent_amount(overrides),
            AttendanceStatus::Late => self.late_amount(minutes_late, overrides),
            AttendanceStatus::Present | AttendanceStatus::Excused => Decimal::ZERO,
        }
    }

    pub fn absent_amount(&self, overrides: &FineOverrides) -> Decimal {
        overrides.absent.unwrap_or(self.defaults.absent)
    }

    pub fn late_amount(&self, minutes_late: u32, overrides: &FineOverrides) -> Decimal {
        if minutes_late == 0 {
            return Decimal::ZERO;
        }

        let rate = overrides
            .late_per_minute
            .unwrap_or(self.defaults.late_per_minute);
        (rate * Decimal::from(minutes_late)).max(self.defaults.minimum_late)
    }
}

impl Default for FineCalculator {
    fn default() -> Self {
        Self::new(FineSchedule::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const NO_OVERRIDES: FineOverrides = FineOverrides {
        absent: None,
        late_per_minute: None,
    };

    #[test]
    fn late_fine_uses_rate_above_minimum() {
        let calc = FineCalculator::default();
        assert_eq!(calc.calculate(AttendanceStatus::Late, 15, &NO_OVERRIDES), dec!(30));
    }

    #[test]
    fn late_fine_never_below_minimum() {
        let calc = FineCalculator::default();
        for minutes in 1..=120 {
            let amount = calc.calculate(AttendanceStatus::Late, minutes, &NO_OVERRIDES);
            assert!(amount >= dec!(20), "{} minutes gave {}", minutes, amount);
        }
        assert_eq!(calc.calculate(AttendanceStatus::Late, 1, &NO_OVERRIDES), dec!(20));
        assert_eq!(calc.calculate(AttendanceStatus::Late, 10, &NO_OVERRIDES), dec!(20));
        assert_eq!(calc.calculate(AttendanceStatus::Late, 11, &NO_OVERRIDES), dec!(22));
    }

    #[test]
    fn sub_minute_lateness_is_free() {
        let calc = FineCalculator::default();
        assert_eq!(calc.calculate(AttendanceStatus::Late, 0, &NO_OVERRIDES), Decimal::ZERO);
    }

    #[test]
    fn absent_uses_override_when_present() {
        let calc = FineCalculator::default();
        let overrides = FineOverrides {
            absent: Some(dec!(250)),
            late_per_minute: None,
        };
        assert_eq!(calc.calculate(AttendanceStatus::Absent, 0, &overrides), dec!(250));
        assert_eq!(calc.calculate(AttendanceStatus::Absent, 42, &overrides), dec!(250));
        assert_eq!(calc.calculate(AttendanceStatus::Absent, 0, &NO_OVERRIDES), dec!(100));
    }

    #[test]
    fn late_override_still_respects_system_minimum() {
        let calc = FineCalculator::default();
        let overrides = FineOverrides {
            absent: None,
            late_per_minute: Some(dec!(5)),
        };
        assert_eq!(calc.calculate(AttendanceStatus::Late, 3, &overrides), dec!(20));
        assert_eq!(calc.calculate(AttendanceStatus::Late, 9, &overrides), dec!(45));
    }

    #[test]
    fn present_and_excused_cost_nothing() {
        let calc = FineCalculator::default();
        let overrides = FineOverrides {
            absent: Some(dec!(500)),
            late_per_minute: Some(dec!(10)),
        };
        for minutes in [0, 5, 60] {
            assert_eq!(calc.calculate(AttendanceStatus::Present, minutes, &overrides), Decimal::ZERO);
            assert_eq!(calc.calculate(AttendanceStatus::Excused, minutes, &overrides), Decimal::ZERO);
        }
    }
}
