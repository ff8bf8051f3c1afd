use sqlx::PgPool;

use crate::{
    error::Result,
    models::{UpdateProfileRequest, UserProfile, UserQuery, UserRole, UserSearchResponse},
    queries::page,
};

/// Fields of a profile created on first sign-in.
#[derive(Debug)]
pub struct NewProfile<'a> {
    pub uid: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub role: UserRole,
    pub company_name: Option<&'a str>,
    pub gst_number: Option<&'a str>,
    pub phone_number: Option<&'a str>,
    pub email_verified: bool,
    pub phone_verified: bool,
}

pub async fn find_by_uid(pool: &PgPool, uid: &str) -> Result<Option<UserProfile>> {
    let profile = sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE uid = $1")
        .bind(uid)
        .fetch_optional(pool)
        .await?;

    Ok(profile)
}

/// Inserts the profile unless another request created it first; in that
/// case `None` is returned.
pub async fn create_profile(pool: &PgPool, profile: &NewProfile<'_>) -> Result<Option<UserProfile>> {
    let created = sqlx::query_as::<_, UserProfile>(
        r#"
        INSERT INTO user_profiles (
            uid, email, full_name, role, company_name, gst_number, phone_number,
            email_verified, phone_verified
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (uid) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(profile.uid)
    .bind(profile.email)
    .bind(profile.full_name)
    .bind(profile.role)
    .bind(profile.company_name)
    .bind(profile.gst_number)
    .bind(profile.phone_number)
    .bind(profile.email_verified)
    .bind(profile.phone_verified)
    .fetch_optional(pool)
    .await?;

    Ok(created)
}

/// Records a sign-in. Verification flags only ever move from false to true.
pub async fn record_login(
    pool: &PgPool,
    uid: &str,
    email: &str,
    email_verified: Option<bool>,
    phone_verified: Option<bool>,
) -> Result<UserProfile> {
    let profile = sqlx::query_as::<_, UserProfile>(
        r#"
        UPDATE user_profiles
        SET
            email = CASE WHEN $2 = '' THEN email ELSE $2 END,
            email_verified = email_verified OR COALESCE($3, FALSE),
            phone_verified = phone_verified OR COALESCE($4, FALSE),
            last_login_at = NOW(),
            updated_at = NOW()
        WHERE uid = $1
        RETURNING *
        "#,
    )
    .bind(uid)
    .bind(email)
    .bind(email_verified)
    .bind(phone_verified)
    .fetch_one(pool)
    .await?;

    Ok(profile)
}

pub async fn update_profile(
    pool: &PgPool,
    uid: &str,
    req: &UpdateProfileRequest,
) -> Result<Option<UserProfile>> {
    let profile = sqlx::query_as::<_, UserProfile>(
        r#"
        UPDATE user_profiles
        SET
            full_name = COALESCE($2, full_name),
            company_name = COALESCE($3, company_name),
            gst_number = COALESCE($4, gst_number),
            phone_number = COALESCE($5, phone_number),
            updated_at = NOW()
        WHERE uid = $1
        RETURNING *
        "#,
    )
    .bind(uid)
    .bind(&req.full_name)
    .bind(&req.company_name)
    .bind(&req.gst_number)
    .bind(&req.phone_number)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

pub async fn update_role(pool: &PgPool, uid: &str, role: UserRole) -> Result<Option<UserProfile>> {
    let profile = sqlx::query_as::<_, UserProfile>(
        "UPDATE user_profiles SET role = $2, updated_at = NOW() WHERE uid = $1 RETURNING *",
    )
    .bind(uid)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

pub async fn search_users(pool: &PgPool, params: UserQuery) -> Result<UserSearchResponse> {
    let (limit, offset) = page(params.limit, params.offset);

    let mut query_builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
        "SELECT *, COUNT(*) OVER() AS total_count FROM user_profiles WHERE 1=1",
    );

    if let Some(ref email) = params.email {
        query_builder.push(" AND email ILIKE ");
        query_builder.push_bind(format!("%{}%", email));
    }

    if let Some(role) = params.role {
        query_builder.push(" AND role = ");
        query_builder.push_bind(role);
    }

    query_builder.push(" ORDER BY created_at DESC");
    query_builder.push(" LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    #[derive(sqlx::FromRow)]
    struct SearchResult {
        #[sqlx(flatten)]
        user: UserProfile,
        total_count: i64,
    }

    let results = query_builder
        .build_query_as::<SearchResult>()
        .fetch_all(pool)
        .await?;

    let total = results.first().map(|r| r.total_count).unwrap_or(0);
    let users = results.into_iter().map(|r| r.user).collect();

    Ok(UserSearchResponse {
        users,
        total,
        limit,
        offset,
    })
}
