use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::auth::services::is_valid_email;
use crate::contacts::repo_types::{iso_date, Contact, ContactChanges, ContactFilter, NewContact, Page};
use crate::error::{AppError, AppResult};

const MAX_NAME: usize = 50;
const MAX_EMAIL: usize = 50;
const MAX_PHONE: usize = 15;
const MAX_INFO: usize = 255;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ContactCreate {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    #[serde(with = "iso_date")]
    pub birthday: Date,
    #[serde(default)]
    pub additional_info: Option<String>,
}

/// Every field is optional; absent fields are left as stored.
#[derive(Debug, Default, Deserialize)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub birthday: Option<Date>,
    pub additional_info: Option<String>,
}

/// Contact as returned to clients and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactResponse {
    pub id: i64,
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

impl From<Contact> for ContactResponse {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id,
            name: c.name,
            surname: c.surname,
            email: c.email,
            phone: c.phone,
            birthday: c.birthday,
            additional_info: c.additional_info,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
}
fn default_limit() -> i64 {
    10
}

impl ListQuery {
    pub fn into_parts(self) -> AppResult<(Page, ContactFilter)> {
        if self.skip < 0 {
            return Err(AppError::validation("skip must be non-negative"));
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(AppError::validation(format!("limit must be between 1 and {MAX_LIMIT}")));
        }
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        Ok((
            Page {
                offset: self.skip,
                limit: self.limit,
            },
            ContactFilter {
                name: non_empty(self.name),
                surname: non_empty(self.surname),
                email: non_empty(self.email),
            },
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct BirthdaysQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}
fn default_days() -> u32 {
    7
}

fn check_field(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > max {
        return Err(AppError::validation(format!("{field} must be at most {max} characters")));
    }
    Ok(())
}

fn check_email(email: &str) -> AppResult<()> {
    check_field("email", email, MAX_EMAIL)?;
    if !is_valid_email(email) {
        return Err(AppError::validation("Invalid email"));
    }
    Ok(())
}

fn check_info(info: Option<&str>) -> AppResult<()> {
    match info {
        Some(v) if v.chars().count() > MAX_INFO => Err(AppError::validation(format!(
            "additional_info must be at most {MAX_INFO} characters"
        ))),
        _ => Ok(()),
    }
}

impl ContactCreate {
    pub fn validate(self) -> AppResult<NewContact> {
        check_field("name", &self.name, MAX_NAME)?;
        check_field("surname", &self.surname, MAX_NAME)?;
        check_email(&self.email)?;
        check_field("phone", &self.phone, MAX_PHONE)?;
        check_info(self.additional_info.as_deref())?;
        Ok(NewContact {
            name: self.name,
            surname: self.surname,
            email: self.email,
            phone: self.phone,
            birthday: self.birthday,
            additional_info: self.additional_info,
        })
    }
}

impl ContactUpdate {
    pub fn validate(self) -> AppResult<ContactChanges> {
        if let Some(v) = &self.name {
            check_field("name", v, MAX_NAME)?;
        }
        if let Some(v) = &self.surname {
            check_field("surname", v, MAX_NAME)?;
        }
        if let Some(v) = &self.email {
            check_email(v)?;
        }
        if let Some(v) = &self.phone {
            check_field("phone", v, MAX_PHONE)?;
        }
        check_info(self.additional_info.as_deref())?;
        Ok(ContactChanges {
            name: self.name,
            surname: self.surname,
            email: self.email,
            phone: self.phone,
            birthday: self.birthday,
            additional_info: self.additional_info,
        })
    }
}
