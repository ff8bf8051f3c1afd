use axum::{extract::State, Extension, Json};

use crate::{
    error::{AppError, Result},
    models::{
        SyncProfileRequest, SyncProfileResponse, UpdateProfileRequest, UserProfile, UserRole,
    },
    queries::user_queries::{self, NewProfile},
    utils::jwt::Claims,
    AppState,
};

const GST_LEN: usize = 15;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProfile>> {
    let profile = user_queries::find_by_uid(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    Ok(Json(profile))
}

/// Called after every sign-in: creates the profile the first time, records
/// the login afterwards.
pub async fn sync_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SyncProfileRequest>,
) -> Result<Json<SyncProfileResponse>> {
    if user_queries::find_by_uid(&state.db, &claims.sub)
        .await?
        .is_some()
    {
        let profile = user_queries::record_login(
            &state.db,
            &claims.sub,
            &claims.email,
            payload.email_verified,
            payload.phone_verified,
        )
        .await?;

        return Ok(Json(SyncProfileResponse {
            profile,
            created: false,
        }));
    }

    let role = signup_role(&claims, payload.role)?;
    let company_name = non_empty(payload.company_name);
    let gst_number = normalize_gst(payload.gst_number)?;
    let phone_number = non_empty(payload.phone_number);
    let full_name = payload.full_name.unwrap_or_default();

    validate_business_fields(role, company_name.as_deref(), gst_number.as_deref())?;

    let new_profile = NewProfile {
        uid: &claims.sub,
        email: &claims.email,
        full_name: full_name.trim(),
        role,
        company_name: company_name.as_deref(),
        gst_number: gst_number.as_deref(),
        phone_number: phone_number.as_deref(),
        email_verified: payload.email_verified.unwrap_or(false),
        phone_verified: payload.phone_verified.unwrap_or(false),
    };

    let response = match user_queries::create_profile(&state.db, &new_profile).await? {
        Some(profile) => {
            tracing::info!("Profile created for {} as {:?}", profile.uid, profile.role);
            SyncProfileResponse {
                profile,
                created: true,
            }
        }
        // A concurrent sign-in created it first.
        None => SyncProfileResponse {
            profile: user_queries::record_login(
                &state.db,
                &claims.sub,
                &claims.email,
                payload.email_verified,
                payload.phone_verified,
            )
            .await?,
            created: false,
        },
    };

    Ok(Json(response))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    let existing = user_queries::find_by_uid(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    let update = UpdateProfileRequest {
        full_name: payload.full_name.map(|n| n.trim().to_string()),
        company_name: non_empty(payload.company_name),
        gst_number: normalize_gst(payload.gst_number)?,
        phone_number: non_empty(payload.phone_number),
    };

    validate_business_fields(
        existing.role,
        update
            .company_name
            .as_deref()
            .or(existing.company_name.as_deref()),
        update.gst_number.as_deref().or(existing.gst_number.as_deref()),
    )?;

    let profile = user_queries::update_profile(&state.db, &claims.sub, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    Ok(Json(profile))
}

/// Customers choose between retail and business accounts. Admin comes only
/// from the identity platform.
fn signup_role(claims: &Claims, requested: Option<UserRole>) -> Result<UserRole> {
    if claims.role == UserRole::Admin {
        return Ok(UserRole::Admin);
    }

    match requested.unwrap_or_default() {
        UserRole::Admin => Err(AppError::Forbidden(
            "Admin role cannot be self-assigned".to_string(),
        )),
        role => Ok(role),
    }
}

pub(crate) fn validate_business_fields(
    role: UserRole,
    company_name: Option<&str>,
    gst_number: Option<&str>,
) -> Result<()> {
    if role == UserRole::B2bBuyer && (company_name.is_none() || gst_number.is_none()) {
        return Err(AppError::BadRequest(
            "Business accounts need a company name and GST number".to_string(),
        ));
    }

    Ok(())
}

fn normalize_gst(gst: Option<String>) -> Result<Option<String>> {
    let Some(gst) = non_empty(gst) else {
        return Ok(None);
    };

    let gst = gst.to_ascii_uppercase();
    if gst.len() != GST_LEN || !gst.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(format!(
            "GST number must be {} letters or digits",
            GST_LEN
        )));
    }

    Ok(Some(gst))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: UserRole) -> Claims {
        Claims {
            sub: "uid-7".to_string(),
            email: "weaver@example.com".to_string(),
            role,
            iat: 0,
            exp: 0,
            iss: None,
            aud: None,
        }
    }

    #[test]
    fn test_signup_role_defaults_to_customer() {
        assert_eq!(
            signup_role(&claims(UserRole::Customer), None).unwrap(),
            UserRole::Customer
        );
        assert_eq!(
            signup_role(&claims(UserRole::Customer), Some(UserRole::B2bBuyer)).unwrap(),
            UserRole::B2bBuyer
        );
    }

    #[test]
    fn test_admin_cannot_be_self_assigned() {
        assert!(matches!(
            signup_role(&claims(UserRole::Customer), Some(UserRole::Admin)),
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(
            signup_role(&claims(UserRole::Admin), Some(UserRole::Customer)).unwrap(),
            UserRole::Admin
        );
    }

    #[test]
    fn test_gst_normalized() {
        assert_eq!(
            normalize_gst(Some(" 27aapfu0939f1zv ".to_string())).unwrap(),
            Some("27AAPFU0939F1ZV".to_string())
        );
        assert_eq!(normalize_gst(Some("   ".to_string())).unwrap(), None);
        assert!(normalize_gst(Some("27AAPFU0939F1Z".to_string())).is_err());
        assert!(normalize_gst(Some("27AAPFU0939F1Z-".to_string())).is_err());
    }

    #[test]
    fn test_business_fields_required_for_b2b() {
        assert!(validate_business_fields(UserRole::B2bBuyer, Some("Loom Co"), None).is_err());
        assert!(validate_business_fields(UserRole::B2bBuyer, None, Some("27AAPFU0939F1ZV")).is_err());
        assert!(
            validate_business_fields(UserRole::B2bBuyer, Some("Loom Co"), Some("27AAPFU0939F1ZV"))
                .is_ok()
        );
        assert!(validate_business_fields(UserRole::Customer, None, None).is_ok());
    }
}
