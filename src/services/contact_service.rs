//! Contact service - emergency contacts per user

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::db::contacts::{self, ContactChanges, ContactRow};
use crate::db::Database;
use crate::error::WelltickError;

use super::auth_service::AuthUser;

/// Body of a create-contact request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

/// Body of a partial contact update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContactInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub relationship: Option<Option<String>>,
    #[serde(default)]
    pub is_primary: Option<bool>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn required(field: &str, value: Option<&str>) -> Result<String, WelltickError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(WelltickError::InvalidInput(format!("{} is required", field))),
    }
}

fn not_found() -> WelltickError {
    WelltickError::NotFound("Emergency contact not found".into())
}

/// Contact service
pub struct ContactService {
    db: Arc<Database>,
}

impl ContactService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Contacts for `owner`, primary first
    pub fn list(&self, owner: &AuthUser) -> Result<Vec<ContactRow>, WelltickError> {
        self.db.with_conn(|conn| contacts::list_contacts(conn, &owner.id))
    }

    /// Add a contact
    pub fn create(&self, owner: &AuthUser, input: CreateContactInput) -> Result<ContactRow, WelltickError> {
        let new = contacts::NewContact {
            owner_id: owner.id.clone(),
            name: required("Name", input.name.as_deref())?,
            phone: required("Phone", input.phone.as_deref())?,
            relationship: input.relationship,
            is_primary: input.is_primary,
        };

        let contact = self.db.with_conn_mut(|conn| contacts::insert_contact(conn, new))?;
        info!(id = %contact.id, primary = contact.is_primary, "Added emergency contact");
        Ok(contact)
    }

    /// Apply a partial update
    pub fn update(
        &self,
        owner: &AuthUser,
        id: &str,
        input: UpdateContactInput,
    ) -> Result<ContactRow, WelltickError> {
        let changes = ContactChanges {
            name: input
                .name
                .as_deref()
                .map(|n| required("Name", Some(n)))
                .transpose()?,
            phone: input
                .phone
                .as_deref()
                .map(|p| required("Phone", Some(p)))
                .transpose()?,
            relationship: input.relationship,
            is_primary: input.is_primary,
        };

        self.db
            .with_conn_mut(|conn| contacts::update_contact(conn, &owner.id, id, &changes))?
            .ok_or_else(not_found)
    }

    /// Remove a contact
    pub fn delete(&self, owner: &AuthUser, id: &str) -> Result<(), WelltickError> {
        if !self.db.with_conn(|conn| contacts::delete_contact(conn, &owner.id, id))? {
            return Err(not_found());
        }
        info!(id = %id, "Removed emergency contact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users;

    fn setup() -> (ContactService, AuthUser) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = db
            .with_conn(|c| users::create_user(c, "c@example.com", "h"))
            .unwrap();
        (
            ContactService::new(db),
            AuthUser {
                id: user.id,
                email: user.email,
            },
        )
    }

    #[test]
    fn test_create_requires_name_and_phone() {
        let (service, user) = setup();
        let missing_phone = CreateContactInput {
            name: Some("Ana".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.create(&user, missing_phone),
            Err(WelltickError::InvalidInput(_))
        ));
        assert!(service.list(&user).unwrap().is_empty());
    }

    #[test]
    fn test_update_from_json() {
        let (service, user) = setup();
        let contact = service
            .create(
                &user,
                serde_json::from_value(serde_json::json!({
                    "name": "Ana",
                    "phone": "555-0100",
                    "relationship": "sister",
                    "isPrimary": true
                }))
                .unwrap(),
            )
            .unwrap();
        assert!(contact.is_primary);

        let input: UpdateContactInput =
            serde_json::from_value(serde_json::json!({ "relationship": null, "phone": "555-0199" }))
                .unwrap();
        let updated = service.update(&user, &contact.id, input).unwrap();
        assert_eq!(updated.relationship, None);
        assert_eq!(updated.phone, "555-0199");
        assert!(updated.is_primary);

        assert!(matches!(
            service.update(&user, "missing", UpdateContactInput::default()),
            Err(WelltickError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let (service, user) = setup();
        assert!(matches!(service.delete(&user, "nope"), Err(WelltickError::NotFound(_))));
    }
}
