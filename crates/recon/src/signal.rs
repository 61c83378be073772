//! Weak classification signals derived from raw record fields.

const YEAR_MIN: i32 = 1900;
const YEAR_MAX: i32 = 2100;

/// Extract a birth year from a raw date string by reading a 4-digit prefix.
///
/// Accepts `"2015-03-02"`, `"2015"`, `"2015/3/2"`. Returns `None` for
/// anything else; callers must treat `None` as "excluded", never as zero
/// or a wildcard.
pub fn birth_year(raw: &str) -> Option<i32> {
    let mut digits = raw.trim().chars();
    let mut year = 0i32;
    for _ in 0..4 {
        year = year * 10 + digits.next()?.to_digit(10)? as i32;
    }
    (YEAR_MIN..=YEAR_MAX).contains(&year).then_some(year)
}

/// Age signal for grade inference: reference year minus birth year.
pub fn age_signal(birth_date: Option<&str>, reference_year: i32) -> Option<i32> {
    let year = birth_date.and_then(birth_year)?;
    Some(reference_year - year)
}
