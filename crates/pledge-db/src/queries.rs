use crate::Database;
use crate::models::{CampaignFields, CampaignRow, IdentityUser, MessageRow, ProfileChanges, UserRow};
use anyhow::Result;
use pledge_types::models::Donation;
use rusqlite::{Connection, OptionalExtension, Row, params};

const USER_COLUMNS: &str = "id, name, email, password, profile_picture, google_id, created_at";
const CAMPAIGN_COLUMNS: &str =
    "id, user_id, title, description, goal, deadline, poster, created_at, donations";

impl Database {
    // -- Users --

    /// Insert a password user. Returns `false` if the email is already taken.
    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(email) DO NOTHING",
                params![id, name, email, password_hash, created_at],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Return the user registered under `user.email`, creating it first if
    /// this is the first time the identity provider has vouched for them.
    pub fn find_or_create_identity_user(
        &self,
        user: &IdentityUser<'_>,
        created_at: &str,
    ) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, profile_picture, google_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(email) DO NOTHING",
                params![
                    user.id,
                    user.name,
                    user.email,
                    user.profile_picture,
                    user.google_id,
                    created_at
                ],
            )?;
            query_user(conn, "email", user.email)?
                .ok_or_else(|| anyhow::anyhow!("identity user vanished: {}", user.email))
        })
    }

    /// Apply profile changes. Returns the updated row, or `None` if no such user.
    pub fn update_profile(&self, id: &str, changes: &ProfileChanges<'_>) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    password = COALESCE(?3, password),
                    profile_picture = COALESCE(?4, profile_picture)
                 WHERE id = ?1",
                params![id, changes.name, changes.password_hash, changes.profile_picture],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_user(conn, "id", id)
        })
    }

    // -- Campaigns --

    pub fn insert_campaign(
        &self,
        id: &str,
        owner_id: &str,
        fields: &CampaignFields<'_>,
        poster: &[u8],
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO campaigns (id, user_id, title, description, goal, deadline, poster, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    owner_id,
                    fields.title,
                    fields.description,
                    fields.goal,
                    fields.deadline,
                    poster,
                    created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn list_campaigns(&self) -> Result<Vec<CampaignRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY rowid"
            ))?;
            let rows = stmt
                .query_map([], campaign_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Edit a campaign owned by `owner_id`. The poster is only replaced when
    /// one is supplied. Returns `false` if no campaign matched id and owner.
    pub fn update_campaign(
        &self,
        id: &str,
        owner_id: &str,
        fields: &CampaignFields<'_>,
        poster: Option<&[u8]>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE campaigns SET
                    title = ?3, description = ?4, goal = ?5, deadline = ?6,
                    poster = COALESCE(?7, poster)
                 WHERE id = ?1 AND user_id = ?2",
                params![
                    id,
                    owner_id,
                    fields.title,
                    fields.description,
                    fields.goal,
                    fields.deadline,
                    poster
                ],
            )?;
            Ok(updated == 1)
        })
    }

    /// Returns `false` if no campaign matched id and owner.
    pub fn delete_campaign(&self, id: &str, owner_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM campaigns WHERE id = ?1 AND user_id = ?2",
                [id, owner_id],
            )?;
            Ok(deleted == 1)
        })
    }

    /// Append a donation to the campaign's embedded list in one statement.
    /// Returns `false` if the campaign does not exist.
    pub fn append_donation(&self, campaign_id: &str, donation: &Donation) -> Result<bool> {
        let json = serde_json::to_string(donation)?;
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE campaigns SET donations = json_insert(donations, '$[#]', json(?2))
                 WHERE id = ?1",
                params![campaign_id, json],
            )?;
            Ok(updated == 1)
        })
    }

    /// Donations of a campaign, visible to its owner only.
    pub fn get_owned_donations(&self, id: &str, owner_id: &str) -> Result<Option<Vec<Donation>>> {
        let raw: Option<String> = self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    "SELECT donations FROM campaigns WHERE id = ?1 AND user_id = ?2",
                    [id, owner_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw)
        })?;

        let donations = raw
            .map(|json| serde_json::from_str::<Vec<Donation>>(&json))
            .transpose()?;
        Ok(donations)
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        text: &str,
        sender: &str,
        user_id: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, text, sender, user_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, text, sender, user_id, created_at],
            )?;
            Ok(())
        })
    }

    /// Every stored message in insertion order. No pagination.
    pub fn list_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, text, sender, user_id, created_at FROM messages ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        sender: row.get(2)?,
                        user_id: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our own literals, never user input
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                profile_picture: row.get(4)?,
                google_id: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<CampaignRow> {
    Ok(CampaignRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        goal: row.get(4)?,
        deadline: row.get(5)?,
        poster: row.get(6)?,
        created_at: row.get(7)?,
        donations: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    const NOW: &str = "2026-01-01T00:00:00+00:00";

    fn fields() -> CampaignFields<'static> {
        CampaignFields {
            title: "Wells for Kibera",
            description: "Clean water",
            goal: 5000.0,
            deadline: "2030-01-01T00:00:00+00:00",
        }
    }

    fn donation(amount: f64) -> Donation {
        Donation {
            user_id: Uuid::new_v4(),
            amount,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user("u1", "Ana", "ana@example.com", "hash", NOW).unwrap());
        assert!(!db.create_user("u2", "Other", "ana@example.com", "hash", NOW).unwrap());

        let user = db.get_user_by_email("ana@example.com").unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.password.as_deref(), Some("hash"));
    }

    #[test]
    fn identity_user_is_created_once() {
        let db = Database::open_in_memory().unwrap();
        let identity = IdentityUser {
            id: "g1",
            name: "Ana",
            email: "ana@example.com",
            google_id: "sub-123",
            profile_picture: Some("https://pics/ana.png"),
        };
        let first = db.find_or_create_identity_user(&identity, NOW).unwrap();
        let again = db
            .find_or_create_identity_user(&IdentityUser { id: "g2", ..identity }, NOW)
            .unwrap();

        assert_eq!(first.id, "g1");
        assert_eq!(again.id, "g1");
        assert!(first.password.is_none());
        assert_eq!(first.google_id.as_deref(), Some("sub-123"));
    }

    #[test]
    fn profile_update_only_touches_supplied_fields() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "Ana", "ana@example.com", "hash", NOW).unwrap();

        let updated = db
            .update_profile(
                "u1",
                &ProfileChanges {
                    profile_picture: Some("http://host/uploads/a.png"),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Ana");
        assert_eq!(updated.password.as_deref(), Some("hash"));
        assert_eq!(updated.profile_picture.as_deref(), Some("http://host/uploads/a.png"));

        assert!(db.update_profile("nobody", &ProfileChanges::default()).unwrap().is_none());
    }

    #[test]
    fn campaign_edits_require_the_owner() {
        let db = Database::open_in_memory().unwrap();
        db.insert_campaign("c1", "owner", &fields(), b"png", NOW).unwrap();

        let edit = CampaignFields { title: "Renamed", ..fields() };
        assert!(!db.update_campaign("c1", "intruder", &edit, None).unwrap());
        assert!(db.update_campaign("c1", "owner", &edit, None).unwrap());

        let rows = db.list_campaigns().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Renamed");
        assert_eq!(rows[0].poster, b"png");

        assert!(!db.delete_campaign("c1", "intruder").unwrap());
        assert!(db.delete_campaign("c1", "owner").unwrap());
        assert!(db.list_campaigns().unwrap().is_empty());
    }

    #[test]
    fn donation_appends_exactly_one_record() {
        let db = Database::open_in_memory().unwrap();
        db.insert_campaign("c1", "owner", &fields(), b"png", NOW).unwrap();

        let d = donation(100.0);
        assert!(db.append_donation("c1", &d).unwrap());
        assert!(!db.append_donation("missing", &d).unwrap());

        let donations = db.get_owned_donations("c1", "owner").unwrap().unwrap();
        assert_eq!(donations, vec![d]);
        assert!(db.get_owned_donations("c1", "someone-else").unwrap().is_none());
    }

    #[test]
    fn concurrent_donations_are_not_lost() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.insert_campaign("c1", "owner", &fields(), b"png", NOW).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.append_donation("c1", &donation(50.0)).unwrap())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }

        let donations = db.get_owned_donations("c1", "owner").unwrap().unwrap();
        assert_eq!(donations.len(), 8);
        assert!(donations.iter().all(|d| d.amount == 50.0));
    }

    #[test]
    fn messages_come_back_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message("m2", "first", "Ana", Some("u1"), NOW).unwrap();
        db.insert_message("m1", "second", "Anonymous", None, NOW).unwrap();

        let texts: Vec<_> = db.list_messages().unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["first", "second"]);
    }
}
