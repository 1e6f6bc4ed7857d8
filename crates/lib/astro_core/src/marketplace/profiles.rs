//! Astrologer profiles: apply, admin verification, self-activation, pricing.

use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

use super::MarketplaceError;
use crate::auth::queries::ensure_role;
use crate::models::auth::Role;
use crate::models::marketplace::AstrologerProfile;

const PROFILE_COLUMNS: &str = "astrologer_id, display_name, bio, experience_years, languages_csv, \
                               specializations_csv, price_per_minute, platform_fee_pct, status, \
                               created_at, verified_at";

const MAX_DISPLAY_NAME_LEN: usize = 120;
const MAX_BIO_LEN: usize = 4000;

/// Highest per-minute price. A full-length session at this price still fits
/// the ledger's `NUMERIC(14, 2)` amount column.
pub const MAX_PRICE_PER_MINUTE: Decimal = Decimal::from_parts(9_999_999, 0, 0, false, 2);

/// Profile details submitted when applying.
#[derive(Debug, Clone)]
pub struct ProfileApplication {
    pub display_name: String,
    pub bio: Option<String>,
    pub experience_years: i32,
    pub languages: Vec<String>,
    pub specializations: Vec<String>,
    pub price_per_minute: Decimal,
}

impl ProfileApplication {
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        let name = self.display_name.trim();
        if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(MarketplaceError::Validation("invalid_display_name"));
        }
        if self.bio.as_deref().is_some_and(|b| b.chars().count() > MAX_BIO_LEN) {
            return Err(MarketplaceError::Validation("invalid_bio"));
        }
        if !(0..=80).contains(&self.experience_years) {
            return Err(MarketplaceError::Validation("invalid_experience_years"));
        }
        validate_price(self.price_per_minute)
    }
}

/// Positive, at most two decimal places, and no higher than
/// [`MAX_PRICE_PER_MINUTE`].
pub fn validate_price(price_per_minute: Decimal) -> Result<(), MarketplaceError> {
    if price_per_minute <= Decimal::ZERO
        || price_per_minute > MAX_PRICE_PER_MINUTE
        || price_per_minute.normalize().scale() > 2
    {
        return Err(MarketplaceError::Validation("invalid_price"));
    }
    Ok(())
}

/// Comma-joined list of trimmed, non-empty items.
fn to_csv(items: &[String]) -> String {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Create a profile in `applied` status.
pub async fn apply(
    pool: &PgPool,
    user_id: Uuid,
    application: &ProfileApplication,
) -> Result<AstrologerProfile, MarketplaceError> {
    application.validate()?;
    let profile = sqlx::query_as::<_, AstrologerProfile>(&format!(
        r#"
        INSERT INTO astrologer_profiles
            (astrologer_id, display_name, bio, experience_years, languages_csv,
             specializations_csv, price_per_minute)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (astrologer_id) DO NOTHING
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(application.display_name.trim())
    .bind(application.bio.as_deref().map(str::trim))
    .bind(application.experience_years)
    .bind(to_csv(&application.languages))
    .bind(to_csv(&application.specializations))
    .bind(application.price_per_minute)
    .fetch_optional(pool)
    .await?;
    let profile = profile.ok_or(MarketplaceError::AlreadyApplied)?;
    info!(astrologer_id = %user_id, "astrologer application received");
    Ok(profile)
}

pub async fn get_profile<'e>(
    db: impl PgExecutor<'e>,
    astrologer_id: Uuid,
) -> Result<Option<AstrologerProfile>, MarketplaceError> {
    let profile = sqlx::query_as::<_, AstrologerProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM astrologer_profiles WHERE astrologer_id = $1"
    ))
    .bind(astrologer_id)
    .fetch_optional(db)
    .await?;
    Ok(profile)
}

/// Admin action: `applied -> verified`, granting the astrologer role in the
/// same transaction. The role reaches the user's token on their next refresh.
pub async fn verify(
    pool: &PgPool,
    astrologer_id: Uuid,
) -> Result<AstrologerProfile, MarketplaceError> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, AstrologerProfile>(&format!(
        r#"
        UPDATE astrologer_profiles
        SET status = 'verified', verified_at = now()
        WHERE astrologer_id = $1 AND status = 'applied'
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(astrologer_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(profile) = updated else {
        let current = get_profile(&mut *tx, astrologer_id).await?;
        return Err(match current {
            None => MarketplaceError::ProfileNotFound,
            Some(p) => MarketplaceError::InvalidStatus(p.status),
        });
    };

    ensure_role(&mut *tx, astrologer_id, Role::Astrologer).await?;
    tx.commit().await?;

    info!(%astrologer_id, "astrologer verified");
    Ok(profile)
}

/// Self-service: `verified | active -> active`.
pub async fn activate(
    pool: &PgPool,
    astrologer_id: Uuid,
) -> Result<AstrologerProfile, MarketplaceError> {
    let updated = sqlx::query_as::<_, AstrologerProfile>(&format!(
        r#"
        UPDATE astrologer_profiles
        SET status = 'active'
        WHERE astrologer_id = $1 AND status IN ('verified', 'active')
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(astrologer_id)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(profile) => Ok(profile),
        None => match get_profile(pool, astrologer_id).await? {
            None => Err(MarketplaceError::ProfileNotFound),
            Some(_) => Err(MarketplaceError::NotVerified),
        },
    }
}

/// Change the per-minute price. Existing sessions keep their snapshot.
pub async fn update_price(
    pool: &PgPool,
    astrologer_id: Uuid,
    price_per_minute: Decimal,
) -> Result<AstrologerProfile, MarketplaceError> {
    validate_price(price_per_minute)?;
    sqlx::query_as::<_, AstrologerProfile>(&format!(
        r#"
        UPDATE astrologer_profiles SET price_per_minute = $2
        WHERE astrologer_id = $1
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(astrologer_id)
    .bind(price_per_minute)
    .fetch_optional(pool)
    .await?
    .ok_or(MarketplaceError::ProfileNotFound)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::models::marketplace::AstrologerStatus;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn application(price: &str) -> ProfileApplication {
        ProfileApplication {
            display_name: "Meera".into(),
            bio: None,
            experience_years: 12,
            languages: vec![" Hindi ".into(), String::new(), "English".into()],
            specializations: vec![],
            price_per_minute: Decimal::from_str(price).unwrap(),
        }
    }

    #[test]
    fn price_must_be_positive_with_two_decimals() {
        assert!(application("10.00").validate().is_ok());
        assert!(application("0").validate().is_err());
        assert!(application("-5").validate().is_err());
        assert!(application("1.005").validate().is_err());
        assert!(application("10.500").validate().is_ok());
    }

    #[test]
    fn price_is_capped() {
        assert!(validate_price(dec("99999.99")).is_ok());
        for price in ["100000.00", "9000000000.00", "100000000000000000000"] {
            assert!(
                matches!(validate_price(dec(price)), Err(MarketplaceError::Validation("invalid_price"))),
                "{price} should be rejected"
            );
        }
    }

    #[test]
    fn capped_price_settles_within_ledger_precision() {
        let ledger_max = dec("999999999999.99");
        let total = MAX_PRICE_PER_MINUTE * Decimal::from(crate::chat::booking::MAX_DURATION_MINUTES);
        assert!(total <= ledger_max);
    }

    #[test]
    fn blank_display_name_is_rejected() {
        let mut app = application("10");
        app.display_name = "   ".into();
        assert!(matches!(
            app.validate(),
            Err(MarketplaceError::Validation("invalid_display_name"))
        ));
    }

    #[test]
    fn csv_drops_blank_items() {
        assert_eq!(to_csv(&application("1").languages), "Hindi,English");
    }

    #[test]
    fn only_verified_and_active_are_bookable() {
        assert!(!AstrologerStatus::Applied.accepts_bookings());
        assert!(AstrologerStatus::Verified.accepts_bookings());
        assert!(AstrologerStatus::Active.accepts_bookings());
        assert!(!AstrologerStatus::Suspended.accepts_bookings());
    }
}
