//! CRUD operations for [`Contact`] records.
//!
//! Contacts are upserted opportunistically whenever a name is observed and
//! fully replaced on write; they only gain information over time, so no
//! merge logic is needed.

use rusqlite::{params, Row};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Contact;

impl Database {
    /// Replace-on-write contact upsert.
    pub fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO contacts (jid, full_name, push_name)
             VALUES (?1, ?2, ?3)",
            params![contact.jid, contact.full_name, contact.push_name],
        )?;
        Ok(())
    }

    pub fn get_contact(&self, jid: &str) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT jid, full_name, push_name FROM contacts WHERE jid = ?1",
                params![jid],
                row_to_contact,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT jid, full_name, push_name FROM contacts ORDER BY full_name ASC",
        )?;

        let rows = stmt.query_map([], row_to_contact)?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Case-insensitive substring search over both name fields.
    pub fn search_contacts(&self, query: &str) -> Result<Vec<Contact>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT jid, full_name, push_name
             FROM contacts
             WHERE full_name LIKE '%' || ?1 || '%'
                OR push_name LIKE '%' || ?1 || '%'
             ORDER BY full_name ASC",
        )?;

        let rows = stmt.query_map(params![query], row_to_contact)?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }
}

fn row_to_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        jid: row.get(0)?,
        full_name: row.get(1)?,
        push_name: row.get(2)?,
    })
}
