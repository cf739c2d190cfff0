use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, Duration, OffsetDateTime};

time::serde::format_description!(pub(crate) iso_date, Date, "[year]-[month]-[day]");

/// Contact record in the database; `user_id` is the owner.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    #[serde(with = "iso_date")]
    pub birthday: Date,
    pub additional_info: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewContact {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub birthday: Date,
    pub additional_info: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ContactChanges {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthday: Option<Date>,
    pub additional_info: Option<String>,
}

/// Case-insensitive substring filters; `None` means unrestricted.
#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

/// Inclusive month/day range, compared independently of birth year.
///
/// The range never crosses December 31: a window that would run into the next
/// year is cut at the end of the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthdayWindow {
    pub start: u16,
    pub end: u16,
}

impl BirthdayWindow {
    pub fn starting(today: Date, days: u32) -> Self {
        let end = today
            .checked_add(Duration::days(i64::from(days)))
            .filter(|d| d.year() == today.year())
            .map(month_day_key)
            .unwrap_or(12 * 100 + 31);
        Self {
            start: month_day_key(today),
            end,
        }
    }

    pub fn contains(&self, birthday: Date) -> bool {
        (self.start..=self.end).contains(&month_day_key(birthday))
    }
}

/// `MMDD` as a number, e.g. March 5th is 305.
pub fn month_day_key(d: Date) -> u16 {
    u16::from(u8::from(d.month())) * 100 + u16::from(d.day())
}
