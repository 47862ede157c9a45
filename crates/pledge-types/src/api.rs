use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// Bearer token claims. Shared by the REST middleware and the gateway's
/// optional socket authentication so both decode the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentityAuthRequest {
    #[serde(default)]
    pub credential: String,
}

/// Public subset of a user returned by sign-in and profile endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub name: String,
    pub email: String,
    /// Empty string when the user has no picture.
    pub profile_picture: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileUpdateResponse {
    pub message: String,
    pub user: UserSummary,
}

// -- Generic acknowledgements --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CampaignCreatedResponse {
    pub message: String,
    pub id: Uuid,
}

// -- Donations --

/// Donation amounts arrive either as JSON numbers or as the raw text of a
/// form input.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl AmountInput {
    /// Positive, finite amount or `None`.
    pub fn to_positive(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        (value.is_finite() && value > 0.0).then_some(value)
    }
}

#[derive(Debug, Deserialize)]
pub struct DonateRequest {
    pub amount: Option<AmountInput>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    #[serde(default)]
    pub text: String,
}
