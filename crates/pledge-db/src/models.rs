//! Database row types. These map directly to SQLite rows and stay separate
//! from the pledge-types wire models so the storage layer can change alone.

use pledge_types::models::Donation;

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    /// `None` for accounts created through the identity provider.
    pub password: Option<String>,
    pub profile_picture: Option<String>,
    pub google_id: Option<String>,
    pub created_at: String,
}

pub struct CampaignRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub goal: f64,
    pub deadline: String,
    pub poster: Vec<u8>,
    pub created_at: String,
    /// Raw JSON array of donations.
    pub donations: String,
}

impl CampaignRow {
    pub fn parsed_donations(&self) -> anyhow::Result<Vec<Donation>> {
        Ok(serde_json::from_str(&self.donations)?)
    }
}

pub struct MessageRow {
    pub id: String,
    pub text: String,
    pub sender: String,
    pub user_id: Option<String>,
    pub created_at: String,
}

/// Fields written by campaign create and edit.
pub struct CampaignFields<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub goal: f64,
    pub deadline: &'a str,
}

/// Profile changes; `None` leaves the column untouched.
#[derive(Default)]
pub struct ProfileChanges<'a> {
    pub name: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub profile_picture: Option<&'a str>,
}

/// A user created on first sign-in through the identity provider.
pub struct IdentityUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub google_id: &'a str,
    pub profile_picture: Option<&'a str>,
}
