use async_trait::async_trait;
use sqlx::PgPool;

use crate::contacts::repo_types::{BirthdayWindow, Contact, ContactChanges, ContactFilter, NewContact, Page};
use crate::db::StoreError;

const CONTACT_COLUMNS: &str =
    "id, user_id, name, surname, email, phone, birthday, additional_info, created_at, updated_at";

/// Contact persistence. Every method is scoped to `owner`; a row belonging to
/// anybody else behaves exactly like a missing row.
#[async_trait]
pub trait ContactRepo: Send + Sync {
    async fn list(&self, owner: i64, page: Page, filter: &ContactFilter) -> Result<Vec<Contact>, StoreError>;
    async fn get_by_id(&self, id: i64, owner: i64) -> Result<Option<Contact>, StoreError>;
    async fn get_by_email(&self, email: &str, owner: i64) -> Result<Option<Contact>, StoreError>;
    async fn create(&self, owner: i64, new: &NewContact) -> Result<Contact, StoreError>;
    async fn update(&self, id: i64, owner: i64, changes: &ContactChanges) -> Result<Contact, StoreError>;
    /// Returns the row as it was just before deletion.
    async fn remove(&self, id: i64, owner: i64) -> Result<Contact, StoreError>;
    async fn upcoming_birthdays(&self, owner: i64, window: BirthdayWindow) -> Result<Vec<Contact>, StoreError>;
}

#[derive(Clone)]
pub struct PgContactRepo {
    db: PgPool,
}

impl PgContactRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// `%value%` for ILIKE with the wildcard characters of `value` escaped.
pub(crate) fn like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('%');
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[async_trait]
impl ContactRepo for PgContactRepo {
    async fn list(&self, owner: i64, page: Page, filter: &ContactFilter) -> Result<Vec<Contact>, StoreError> {
        let rows = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
            FROM contacts
            WHERE user_id = $1
              AND ($2::text IS NULL OR name ILIKE $2)
              AND ($3::text IS NULL OR surname ILIKE $3)
              AND ($4::text IS NULL OR email ILIKE $4)
            ORDER BY id
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(owner)
        .bind(filter.name.as_deref().map(like_pattern))
        .bind(filter.surname.as_deref().map(like_pattern))
        .bind(filter.email.as_deref().map(like_pattern))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_by_id(&self, id: i64, owner: i64) -> Result<Option<Contact>, StoreError> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn get_by_email(&self, email: &str, owner: i64) -> Result<Option<Contact>, StoreError> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE email = $1 AND user_id = $2"
        ))
        .bind(email)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn create(&self, owner: i64, new: &NewContact) -> Result<Contact, StoreError> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            r#"
            INSERT INTO contacts (user_id, name, surname, email, phone, birthday, additional_info)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(&new.name)
        .bind(&new.surname)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.birthday)
        .bind(&new.additional_info)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(&self, id: i64, owner: i64, changes: &ContactChanges) -> Result<Contact, StoreError> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            r#"
            UPDATE contacts SET
                name            = COALESCE($3, name),
                surname         = COALESCE($4, surname),
                email           = COALESCE($5, email),
                phone           = COALESCE($6, phone),
                birthday        = COALESCE($7, birthday),
                additional_info = COALESCE($8, additional_info),
                updated_at      = GREATEST(clock_timestamp(), updated_at + interval '1 microsecond')
            WHERE id = $1 AND user_id = $2
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner)
        .bind(&changes.name)
        .bind(&changes.surname)
        .bind(&changes.email)
        .bind(&changes.phone)
        .bind(changes.birthday)
        .bind(&changes.additional_info)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row)
    }

    async fn remove(&self, id: i64, owner: i64) -> Result<Contact, StoreError> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            "DELETE FROM contacts WHERE id = $1 AND user_id = $2 RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row)
    }

    async fn upcoming_birthdays(&self, owner: i64, window: BirthdayWindow) -> Result<Vec<Contact>, StoreError> {
        let rows = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
            FROM contacts
            WHERE user_id = $1
              AND (EXTRACT(MONTH FROM birthday)::int * 100 + EXTRACT(DAY FROM birthday)::int)
                  BETWEEN $2 AND $3
            ORDER BY EXTRACT(MONTH FROM birthday), EXTRACT(DAY FROM birthday), id
            "#
        ))
        .bind(owner)
        .bind(i32::from(window.start))
        .bind(i32::from(window.end))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
