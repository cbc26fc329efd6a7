/// Seconds in one Julian day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Julian day number of the Unix epoch day (days start at noon).
const UNIX_EPOCH_DAY_NUMBER: i64 = 2_440_587;

/// Unix midnight falls half way through Julian day `UNIX_EPOCH_DAY_NUMBER`.
const UNIX_EPOCH_SECONDS_OF_DAY: f64 = 43_200.0;

/// Clock time as a (Julian day number, seconds into that day) pair.
///
/// The pair is kept split rather than collapsed into one `f64` so that a
/// shared clock time reproduces exactly, down to the second fraction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JulianDate {
    pub day_number: i64,
    pub seconds_of_day: f64,
}

impl JulianDate {
    /// Builds a normalized date: `0 <= seconds_of_day < 86400`.
    pub fn new(day_number: i64, seconds_of_day: f64) -> Self {
        let whole_days = (seconds_of_day / SECONDS_PER_DAY).floor();
        Self {
            day_number: day_number + whole_days as i64,
            seconds_of_day: seconds_of_day - whole_days * SECONDS_PER_DAY,
        }
    }

    pub fn from_unix_seconds(seconds: f64) -> Self {
        Self::new(UNIX_EPOCH_DAY_NUMBER, UNIX_EPOCH_SECONDS_OF_DAY + seconds)
    }

    pub fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self::from_unix_seconds(secs)
    }
}
