//! Emergency contacts
//!
//! An owner has at most one primary contact. Promoting a contact demotes the
//! previous primary inside the same transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;

use super::{from_db_time, to_db_time};
use crate::error::WelltickError;

/// Contact row from database
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRow {
    pub id: String,
    #[serde(skip)]
    pub owner_id: String,
    pub name: String,
    pub phone: String,
    pub relationship: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            name: row.get("name")?,
            phone: row.get("phone")?,
            relationship: row.get("relationship")?,
            is_primary: row.get::<_, i64>("is_primary")? != 0,
            created_at: from_db_time(row, "created_at")?,
            updated_at: from_db_time(row, "updated_at")?,
        })
    }
}

/// Input for adding a contact
#[derive(Debug, Clone)]
pub struct NewContact {
    pub owner_id: String,
    pub name: String,
    pub phone: String,
    pub relationship: Option<String>,
    pub is_primary: bool,
}

/// Partial update; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct ContactChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub relationship: Option<Option<String>>,
    pub is_primary: Option<bool>,
}

fn demote_primary(tx: &Transaction, owner_id: &str) -> Result<(), WelltickError> {
    tx.execute(
        "UPDATE emergency_contacts SET is_primary = 0 WHERE owner_id = ?1 AND is_primary = 1",
        params![owner_id],
    )?;
    Ok(())
}

fn fetch(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<ContactRow>, WelltickError> {
    Ok(conn
        .query_row(
            "SELECT * FROM emergency_contacts WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
            ContactRow::from_row,
        )
        .optional()?)
}

/// Add a contact
pub fn insert_contact(conn: &mut Connection, input: NewContact) -> Result<ContactRow, WelltickError> {
    let now = Utc::now();
    let row = ContactRow {
        id: uuid::Uuid::new_v4().to_string(),
        owner_id: input.owner_id,
        name: input.name,
        phone: input.phone,
        relationship: input.relationship,
        is_primary: input.is_primary,
        created_at: now,
        updated_at: now,
    };

    let tx = conn.transaction()?;
    if row.is_primary {
        demote_primary(&tx, &row.owner_id)?;
    }
    tx.execute(
        r#"
        INSERT INTO emergency_contacts (
            id, owner_id, name, phone, relationship, is_primary, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        "#,
        params![
            row.id,
            row.owner_id,
            row.name,
            row.phone,
            row.relationship,
            row.is_primary as i64,
            to_db_time(&now),
        ],
    )?;
    tx.commit()?;

    Ok(row)
}

/// List an owner's contacts, primary first
pub fn list_contacts(conn: &Connection, owner_id: &str) -> Result<Vec<ContactRow>, WelltickError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM emergency_contacts
        WHERE owner_id = ?1
        ORDER BY is_primary DESC, created_at ASC, rowid ASC
        "#,
    )?;

    let rows = stmt
        .query_map(params![owner_id], ContactRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Apply a partial update. Returns `None` when the owner has no such contact.
pub fn update_contact(
    conn: &mut Connection,
    owner_id: &str,
    id: &str,
    changes: &ContactChanges,
) -> Result<Option<ContactRow>, WelltickError> {
    let tx = conn.transaction()?;

    let Some(mut contact) = fetch(&tx, owner_id, id)? else {
        return Ok(None);
    };

    if let Some(name) = &changes.name {
        contact.name = name.clone();
    }
    if let Some(phone) = &changes.phone {
        contact.phone = phone.clone();
    }
    if let Some(relationship) = &changes.relationship {
        contact.relationship = relationship.clone();
    }
    if let Some(is_primary) = changes.is_primary {
        if is_primary && !contact.is_primary {
            demote_primary(&tx, owner_id)?;
        }
        contact.is_primary = is_primary;
    }
    contact.updated_at = Utc::now();

    tx.execute(
        r#"
        UPDATE emergency_contacts
        SET name = ?1, phone = ?2, relationship = ?3, is_primary = ?4, updated_at = ?5
        WHERE id = ?6 AND owner_id = ?7
        "#,
        params![
            contact.name,
            contact.phone,
            contact.relationship,
            contact.is_primary as i64,
            to_db_time(&contact.updated_at),
            id,
            owner_id,
        ],
    )?;
    tx.commit()?;

    Ok(Some(contact))
}

/// Delete a contact. Returns whether a row owned by `owner_id` was removed.
pub fn delete_contact(conn: &Connection, owner_id: &str, id: &str) -> Result<bool, WelltickError> {
    let deleted = conn.execute(
        "DELETE FROM emergency_contacts WHERE id = ?1 AND owner_id = ?2",
        params![id, owner_id],
    )?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{users, Database};

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let user = db.with_conn(|c| users::create_user(c, "c@example.com", "h")).unwrap();
        (db, user.id)
    }

    fn add(db: &Database, owner: &str, name: &str, is_primary: bool) -> ContactRow {
        db.with_conn_mut(|c| {
            insert_contact(
                c,
                NewContact {
                    owner_id: owner.to_string(),
                    name: name.to_string(),
                    phone: "+1 555 0100".into(),
                    relationship: None,
                    is_primary,
                },
            )
        })
        .unwrap()
    }

    #[test]
    fn test_single_primary_on_insert() {
        let (db, owner) = setup();
        add(&db, &owner, "Ana", true);
        add(&db, &owner, "Ben", false);
        let carl = add(&db, &owner, "Carl", true);

        let contacts = db.with_conn(|c| list_contacts(c, &owner)).unwrap();
        assert_eq!(contacts.len(), 3);
        assert_eq!(contacts[0].id, carl.id);
        assert_eq!(contacts.iter().filter(|c| c.is_primary).count(), 1);
    }

    #[test]
    fn test_promote_on_update() {
        let (db, owner) = setup();
        let ana = add(&db, &owner, "Ana", true);
        let ben = add(&db, &owner, "Ben", false);

        let changes = ContactChanges {
            is_primary: Some(true),
            relationship: Some(Some("brother".into())),
            ..Default::default()
        };
        let updated = db
            .with_conn_mut(|c| update_contact(c, &owner, &ben.id, &changes))
            .unwrap()
            .unwrap();
        assert!(updated.is_primary);
        assert_eq!(updated.relationship.as_deref(), Some("brother"));

        let ana_now = db.with_conn(|c| fetch(c, &owner, &ana.id)).unwrap().unwrap();
        assert!(!ana_now.is_primary);
    }

    #[test]
    fn test_missing_or_foreign_contact() {
        let (db, owner) = setup();
        let ana = add(&db, &owner, "Ana", false);

        assert!(db
            .with_conn_mut(|c| update_contact(c, "someone-else", &ana.id, &ContactChanges::default()))
            .unwrap()
            .is_none());
        assert!(!db.with_conn(|c| delete_contact(c, "someone-else", &ana.id)).unwrap());
        assert!(db.with_conn(|c| delete_contact(c, &owner, &ana.id)).unwrap());
        assert!(db.with_conn(|c| list_contacts(c, &owner)).unwrap().is_empty());
    }
}
