use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    auth::repo_types::User,
    contacts::{
        repo::ContactRepo,
        repo_types::{BirthdayWindow, Contact, ContactChanges, ContactFilter, NewContact, Page},
    },
    db::StoreError,
    error::{AppError, AppResult},
};

fn not_found() -> AppError {
    AppError::NotFound("Contact not found".into())
}

fn duplicate_email() -> AppError {
    AppError::Conflict("Contact with this email already exists".into())
}

fn store(e: StoreError) -> AppError {
    match e {
        StoreError::NotFound => not_found(),
        StoreError::Conflict => duplicate_email(),
        StoreError::Backend(e) => AppError::Internal(e),
    }
}

pub async fn list(repo: &dyn ContactRepo, owner: &User, page: Page, filter: &ContactFilter) -> AppResult<Vec<Contact>> {
    repo.list(owner.id, page, filter).await.map_err(store)
}

pub async fn get(repo: &dyn ContactRepo, owner: &User, id: i64) -> AppResult<Contact> {
    repo.get_by_id(id, owner.id).await.map_err(store)?.ok_or_else(not_found)
}

pub async fn create(repo: &dyn ContactRepo, owner: &User, new: NewContact) -> AppResult<Contact> {
    if repo.get_by_email(&new.email, owner.id).await.map_err(store)?.is_some() {
        warn!(user_id = owner.id, "duplicate contact email");
        return Err(duplicate_email());
    }
    let contact = repo.create(owner.id, &new).await.map_err(store)?;
    info!(user_id = owner.id, contact_id = contact.id, "contact created");
    Ok(contact)
}

pub async fn update(repo: &dyn ContactRepo, owner: &User, id: i64, changes: ContactChanges) -> AppResult<Contact> {
    if let Some(email) = &changes.email {
        if let Some(other) = repo.get_by_email(email, owner.id).await.map_err(store)? {
            if other.id != id {
                return Err(duplicate_email());
            }
        }
    }
    let contact = repo.update(id, owner.id, &changes).await.map_err(store)?;
    info!(user_id = owner.id, contact_id = id, "contact updated");
    Ok(contact)
}

pub async fn remove(repo: &dyn ContactRepo, owner: &User, id: i64) -> AppResult<Contact> {
    let contact = repo.remove(id, owner.id).await.map_err(store)?;
    info!(user_id = owner.id, contact_id = id, "contact removed");
    Ok(contact)
}

pub async fn upcoming_birthdays(repo: &dyn ContactRepo, owner: &User, days: u32) -> AppResult<Vec<Contact>> {
    upcoming_birthdays_from(repo, owner, OffsetDateTime::now_utc().date(), days).await
}

pub async fn upcoming_birthdays_from(
    repo: &dyn ContactRepo,
    owner: &User,
    today: time::Date,
    days: u32,
) -> AppResult<Vec<Contact>> {
    let window = BirthdayWindow::starting(today, days);
    repo.upcoming_birthdays(owner.id, window).await.map_err(store)
}
