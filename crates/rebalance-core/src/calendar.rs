//! Quarter arithmetic and the NYSE trading calendar.
//!
//! Rebalancing happens on the first NYSE trading day of each calendar
//! quarter. Only full-day closures are modelled; early closes are trading
//! days.

use crate::{RebalanceError, Result};
use chrono::{Datelike, Days, Months, NaiveDate, Weekday};

/// Number of calendar days after a quarter start searched for a trading day.
const QUARTER_START_SEARCH_DAYS: u64 = 14;

/// Number of quarters searched backwards for the most recent rebalance date.
const MAX_QUARTERS_BACK: usize = 8;

/// First calendar day of the quarter containing `date`.
pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let month = ((date.month() - 1) / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}

/// Quarter label such as `2024Q2`.
pub fn quarter_label(date: NaiveDate) -> String {
    let quarter = (date.month() - 1) / 3 + 1;
    format!("{}Q{}", date.year(), quarter)
}

/// Last calendar day of the given month.
pub fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// Parse a period label.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM` and `YYYYMM`; the month-only forms map to
/// the last day of the month.
pub fn parse_period_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }

    let (year, month) = match raw.split_once('-') {
        Some((year, month)) => (year, month),
        None if raw.len() == 6 && raw.bytes().all(|b| b.is_ascii_digit()) => raw.split_at(4),
        None => ("", ""),
    };

    year.parse::<i32>()
        .ok()
        .zip(month.parse::<u32>().ok())
        .and_then(|(year, month)| month_end(year, month))
        .ok_or_else(|| RebalanceError::Calendar(format!("unrecognised period label: {raw}")))
}

/// Start of the trailing window that ends at `end`.
///
/// Month arithmetic clamps to the end of the month, so Feb 29 minus one year
/// is Feb 28.
pub fn lookback_start(end: NaiveDate, years: u32) -> Result<NaiveDate> {
    years
        .checked_mul(12)
        .and_then(|months| end.checked_sub_months(Months::new(months)))
        .ok_or_else(|| RebalanceError::Calendar(format!("{years}-year lookback from {end} underflows")))
}

/// Move a fixed-date holiday falling on a weekend to the nearest weekday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date.pred_opt().unwrap_or(date),
        Weekday::Sun => date.succ_opt().unwrap_or(date),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let mut date = month_end(year, month)?;
    while date.weekday() != weekday {
        date = date.pred_opt()?;
    }
    Some(date)
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}

/// Full-day NYSE holidays observed in `year`.
pub fn nyse_holidays(year: i32) -> Vec<NaiveDate> {
    let mut holidays = Vec::with_capacity(10);

    // A Saturday New Year's Day is not made up on the preceding Friday.
    if let Some(new_year) = NaiveDate::from_ymd_opt(year, 1, 1) {
        match new_year.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => holidays.extend(new_year.succ_opt()),
            _ => holidays.push(new_year),
        }
    }
    if year >= 1998 {
        holidays.extend(nth_weekday(year, 1, Weekday::Mon, 3));
    }
    holidays.extend(nth_weekday(year, 2, Weekday::Mon, 3));
    holidays.extend(
        easter_sunday(year).and_then(|easter| easter.checked_sub_days(Days::new(2))),
    );
    holidays.extend(last_weekday(year, 5, Weekday::Mon));
    if year >= 2022 {
        holidays.extend(NaiveDate::from_ymd_opt(year, 6, 19).map(observed));
    }
    holidays.extend(NaiveDate::from_ymd_opt(year, 7, 4).map(observed));
    holidays.extend(nth_weekday(year, 9, Weekday::Mon, 1));
    holidays.extend(nth_weekday(year, 11, Weekday::Thu, 4));
    holidays.extend(NaiveDate::from_ymd_opt(year, 12, 25).map(observed));

    holidays
}

/// True when the NYSE is open for a full or partial session on `date`.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
        && !nyse_holidays(date.year()).contains(&date)
}

/// First NYSE trading day of the quarter containing `date`.
pub fn first_trading_day_of_quarter(date: NaiveDate) -> Result<NaiveDate> {
    let start = quarter_start(date);
    (0..=QUARTER_START_SEARCH_DAYS)
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .find(|candidate| is_trading_day(*candidate))
        .ok_or_else(|| {
            RebalanceError::Calendar(format!(
                "could not determine first trading day for quarter {}",
                quarter_label(start)
            ))
        })
}

/// Latest quarterly rebalance date on or before `today`.
pub fn most_recent_rebalance_date(today: NaiveDate) -> Result<NaiveDate> {
    let mut candidate = today;
    for _ in 0..MAX_QUARTERS_BACK {
        let rebalance = first_trading_day_of_quarter(candidate)?;
        if rebalance <= today {
            return Ok(rebalance);
        }
        candidate = quarter_start(candidate)
            .checked_sub_months(Months::new(3))
            .ok_or_else(|| RebalanceError::Calendar(format!("no quarter before {candidate}")))?;
    }
    Err(RebalanceError::Calendar(format!(
        "unable to determine recent rebalance date for {today}"
    )))
}
