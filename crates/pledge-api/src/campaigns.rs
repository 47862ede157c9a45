use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use pledge_db::models::{CampaignFields, CampaignRow};
use pledge_types::api::{CampaignCreatedResponse, Claims, DonateRequest, MessageResponse};
use pledge_types::models::{Campaign, Donation};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::uploads::MultipartForm;

/// Validated text fields of a campaign form.
#[derive(Debug)]
struct CampaignInput {
    title: String,
    description: String,
    goal: f64,
    deadline: DateTime<Utc>,
}

impl CampaignInput {
    fn parse(form: &MultipartForm, now: DateTime<Utc>) -> ApiResult<Self> {
        let (Some(title), Some(description), Some(goal), Some(deadline)) = (
            form.text("title"),
            form.text("description"),
            form.text("goal"),
            form.text("deadline"),
        ) else {
            return Err(ApiError::BadRequest("Missing required fields"));
        };

        let goal = goal
            .parse::<f64>()
            .ok()
            .filter(|g| g.is_finite() && *g > 0.0)
            .ok_or(ApiError::BadRequest("Invalid goal amount"))?;
        let deadline = parse_deadline(deadline).ok_or(ApiError::BadRequest("Invalid deadline date"))?;
        if deadline <= now {
            return Err(ApiError::BadRequest("Deadline must be in the future"));
        }

        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            goal,
            deadline,
        })
    }

    fn fields<'a>(&'a self, deadline: &'a str) -> CampaignFields<'a> {
        CampaignFields {
            title: &self.title,
            description: &self.description,
            goal: self.goal,
            deadline,
        }
    }
}

/// Accepts RFC 3339, `datetime-local` input values and bare dates (UTC midnight).
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Unknown and malformed ids are both "not found".
fn campaign_id(raw: &str) -> ApiResult<String> {
    raw.parse::<Uuid>()
        .map(|id| id.to_string())
        .map_err(|_| ApiError::NotFound("Campaign"))
}

/// GET /api/campaigns: every campaign, public and unfiltered.
pub async fn list_campaigns(State(state): State<AppState>) -> ApiResult<Json<Vec<Campaign>>> {
    let rows = state.db_call(|db| db.list_campaigns()).await?;
    let campaigns = rows.into_iter().map(campaign_from_row).collect();
    Ok(Json(campaigns))
}

/// POST /api/campaigns: multipart `title, description, goal, deadline, poster`.
pub async fn create_campaign(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut form = MultipartForm::read(multipart).await?;
    let now = Utc::now();
    let input = CampaignInput::parse(&form, now)?;
    let poster = form
        .take_file("poster")
        .ok_or(ApiError::BadRequest("No poster image uploaded"))?;

    let id = Uuid::new_v4();
    let owner = claims.sub.to_string();
    state
        .db_call(move |db| {
            let deadline = input.deadline.to_rfc3339();
            db.insert_campaign(
                &id.to_string(),
                &owner,
                &input.fields(&deadline),
                &poster.bytes,
                &now.to_rfc3339(),
            )
        })
        .await?;
    info!("Campaign {} created by {}", id, claims.sub);

    Ok((
        StatusCode::CREATED,
        Json(CampaignCreatedResponse {
            message: "Campaign created successfully".into(),
            id,
        }),
    ))
}

/// PUT /api/campaigns/{id}: owner only; the poster is optional.
pub async fn update_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> ApiResult<Json<MessageResponse>> {
    let id = campaign_id(&id)?;
    let mut form = MultipartForm::read(multipart).await?;
    let input = CampaignInput::parse(&form, Utc::now())?;
    let poster = form.take_file("poster");

    let owner = claims.sub.to_string();
    let updated = state
        .db_call(move |db| {
            let deadline = input.deadline.to_rfc3339();
            db.update_campaign(
                &id,
                &owner,
                &input.fields(&deadline),
                poster.as_ref().map(|p| p.bytes.as_ref()),
            )
        })
        .await?;
    if !updated {
        return Err(ApiError::NotFound("Campaign"));
    }

    Ok(Json(MessageResponse::new("Campaign updated successfully")))
}

/// DELETE /api/campaigns/{id}: owner only.
pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    let id = campaign_id(&id)?;
    let owner = claims.sub.to_string();
    let deleted = state
        .db_call(move |db| db.delete_campaign(&id, &owner))
        .await?;
    if !deleted {
        return Err(ApiError::NotFound("Campaign"));
    }

    Ok(Json(MessageResponse::new("Campaign deleted successfully")))
}

/// POST /api/campaigns/{id}/donate
///
/// Records whatever positive amount the caller asserts. Nothing here checks
/// that a payment actually settled.
pub async fn donate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DonateRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let id = campaign_id(&id)?;
    let amount = req
        .amount
        .as_ref()
        .and_then(|a| a.to_positive())
        .ok_or(ApiError::BadRequest("Missing required fields"))?;

    let donation = Donation {
        user_id: claims.sub,
        amount,
        created_at: Utc::now(),
    };
    let appended = state
        .db_call(move |db| db.append_donation(&id, &donation))
        .await?;
    if !appended {
        return Err(ApiError::NotFound("Campaign"));
    }

    Ok(Json(MessageResponse::new("Donation successful")))
}

/// GET /api/campaigns/{id}/donations: owner only.
pub async fn list_donations(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Donation>>> {
    let id = campaign_id(&id)?;
    let owner = claims.sub.to_string();
    let donations = state
        .db_call(move |db| db.get_owned_donations(&id, &owner))
        .await?
        .ok_or(ApiError::NotFound("Campaign"))?;

    Ok(Json(donations))
}

fn campaign_from_row(row: CampaignRow) -> Campaign {
    let donations = row.parsed_donations().unwrap_or_else(|e| {
        warn!("Corrupt donations on campaign '{}': {}", row.id, e);
        Vec::new()
    });
    let raised = donations.iter().map(|d| d.amount).sum();

    Campaign {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt campaign id '{}': {}", row.id, e);
            Uuid::default()
        }),
        user_id: row.user_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt user_id '{}' on campaign '{}': {}", row.user_id, row.id, e);
            Uuid::default()
        }),
        title: row.title,
        description: row.description,
        goal: row.goal,
        deadline: parse_timestamp(&row.deadline, &row.id),
        poster: B64.encode(&row.poster),
        created_at: parse_timestamp(&row.created_at, &row.id),
        donations,
        raised,
    }
}

fn parse_timestamp(raw: &str, campaign_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on campaign '{}': {}", raw, campaign_id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn deadline_accepts_common_shapes() {
        let expected = Utc.with_ymd_and_hms(2030, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_deadline("2030-05-01"), Some(expected));
        assert_eq!(parse_deadline("2030-05-01T00:00"), Some(expected));
        assert_eq!(parse_deadline("2030-05-01T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_deadline("next tuesday"), None);
    }

    #[test]
    fn malformed_campaign_id_is_not_found() {
        assert!(matches!(campaign_id("not-a-uuid"), Err(ApiError::NotFound(_))));
        let id = Uuid::new_v4();
        assert_eq!(campaign_id(&id.to_string()).unwrap(), id.to_string());
    }

    #[test]
    fn raised_is_summed_from_donations() {
        let donations = vec![
            Donation { user_id: Uuid::new_v4(), amount: 40.0, created_at: Utc::now() },
            Donation { user_id: Uuid::new_v4(), amount: 2.5, created_at: Utc::now() },
        ];
        let row = CampaignRow {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            title: "t".into(),
            description: "d".into(),
            goal: 100.0,
            deadline: "2030-01-01T00:00:00+00:00".into(),
            poster: b"img".to_vec(),
            created_at: "2026-01-01T00:00:00+00:00".into(),
            donations: serde_json::to_string(&donations).unwrap(),
        };

        let campaign = campaign_from_row(row);
        assert_eq!(campaign.raised, 42.5);
        assert_eq!(campaign.poster, B64.encode(b"img"));
        assert_eq!(campaign.donations, donations);
    }
}
