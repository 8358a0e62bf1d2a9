// libs/appointment-cell/src/services/pricing.rs
use tracing::debug;

use crate::models::AppointmentError;

pub struct PricingService;

impl PricingService {
    pub fn new() -> Self {
        Self
    }

    /// Price of a consultation in minor units: the hourly rate pro-rated by
    /// the booked duration, rounded half-up to the nearest cent.
    pub fn quote_cents(&self, hourly_rate_cents: i64, duration_minutes: i32) -> Result<i64, AppointmentError> {
        if hourly_rate_cents < 0 {
            return Err(AppointmentError::ValidationError(
                "Hourly rate cannot be negative".to_string(),
            ));
        }
        if duration_minutes <= 0 {
            return Err(AppointmentError::ValidationError(
                "Duration must be a positive number of minutes".to_string(),
            ));
        }

        let amount = hourly_rate_cents
            .checked_mul(i64::from(duration_minutes))
            .and_then(|total| total.checked_add(30))
            .map(|total| total / 60)
            .ok_or_else(|| AppointmentError::ValidationError("Consultation price is out of range".to_string()))?;

        debug!(
            "Quoted {} cents for {} minutes at {} cents/hour",
            amount, duration_minutes, hourly_rate_cents
        );

        Ok(amount)
    }

    /// Major-unit rendering of a minor-unit amount, e.g. `12050` -> `"120.50"`.
    pub fn format_amount(amount_cents: i64) -> String {
        let sign = if amount_cents < 0 { "-" } else { "" };
        let abs = amount_cents.unsigned_abs();
        format!("{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for PricingService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_hour_is_the_hourly_rate() {
        assert_eq!(PricingService::new().quote_cents(12_000, 60).unwrap(), 12_000);
    }

    #[test]
    fn test_partial_hours_are_pro_rated() {
        let pricing = PricingService::new();
        assert_eq!(pricing.quote_cents(12_000, 30).unwrap(), 6_000);
        assert_eq!(pricing.quote_cents(12_000, 90).unwrap(), 18_000);
        // 10000 * 20 / 60 = 3333.33
        assert_eq!(pricing.quote_cents(10_000, 20).unwrap(), 3_333);
        // 10000 * 40 / 60 = 6666.67
        assert_eq!(pricing.quote_cents(10_000, 40).unwrap(), 6_667);
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let pricing = PricingService::new();
        assert!(pricing.quote_cents(-1, 60).is_err());
        assert!(pricing.quote_cents(12_000, 0).is_err());
        assert!(pricing.quote_cents(i64::MAX, 60).is_err());
    }

    #[test]
    fn test_formats_major_units() {
        assert_eq!(PricingService::format_amount(12_000), "120.00");
        assert_eq!(PricingService::format_amount(12_050), "120.50");
        assert_eq!(PricingService::format_amount(5), "0.05");
    }
}
