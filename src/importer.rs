use crate::config::Config;
use crate::errors::AppError;
use crate::models::{parse_owner_name, Homeowner};
use bigdecimal::BigDecimal;
use moka::future::Cache;
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Source tag stamped on every imported lead.
const SOURCE_TAG: &str = "property-search-pipeline";

/// Outcome of one upsert attempt. A duplicate address is an expected
/// outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(Uuid),
    Skipped,
}

/// Idempotent writer into the destination store. Address is the sole
/// natural key within a workspace: an existing lead at the same address is
/// skipped, never overwritten, so two distinct owners at one address
/// collapse to a single import.
pub struct LeadImporter {
    pool: PgPool,
    workspace_id: Uuid,
    assigned_user_id: Option<Uuid>,
    /// Memoizes addresses known to exist, including ones this run inserted.
    address_cache: Cache<String, ()>,
}

impl LeadImporter {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            workspace_id: config.workspace_id,
            assigned_user_id: config.assigned_user_id,
            address_cache: Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .max_capacity(50_000)
                .build(),
        }
    }

    /// Existence-check-then-create for one record. Each call is its own
    /// unit: a crash between check and create can at worst skip one record
    /// on retry, never double-create it.
    pub async fn upsert(&self, h: &Homeowner) -> Result<ImportOutcome, AppError> {
        let address_key = h.full_address.trim().to_lowercase();
        if address_key.is_empty() {
            return Err(AppError::Validation(
                "record has no address, cannot import".to_string(),
            ));
        }

        if self.address_cache.get(&address_key).await.is_some() {
            tracing::debug!("Skipping {} (cached duplicate)", h.full_address);
            return Ok(ImportOutcome::Skipped);
        }

        let existing: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM crm.leads
            WHERE workspace_id = $1 AND LOWER(TRIM(address)) = $2
            LIMIT 1
            "#,
        )
        .bind(self.workspace_id)
        .bind(&address_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        if existing.is_some() {
            self.address_cache.insert(address_key, ()).await;
            tracing::debug!("Skipping {} (already in store)", h.full_address);
            return Ok(ImportOutcome::Skipped);
        }

        let (first_name, last_name, is_business) = parse_owner_name(&h.owner_name);
        // Corporate names stay whole in full_name; parsed fields stay empty.
        let full_name = if h.owner_name.trim().is_empty() {
            "Unknown Owner".to_string()
        } else {
            h.owner_name.trim().to_string()
        };

        let estimated_value = h
            .estimated_value
            .and_then(|v| BigDecimal::from_str(&format!("{v:.2}")).ok());

        let lead_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO crm.leads (
                workspace_id, first_name, last_name, full_name, is_business,
                phone, email, address, city, state, zip,
                estimated_value, source, assigned_to, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(self.workspace_id)
        .bind(&first_name)
        .bind(&last_name)
        .bind(&full_name)
        .bind(is_business)
        .bind(&h.phone)
        .bind(&h.email)
        .bind(&h.address)
        .bind(&h.city)
        .bind(&h.state)
        .bind(&h.zip)
        .bind(estimated_value)
        .bind(SOURCE_TAG)
        .bind(self.assigned_user_id)
        .bind(build_notes(h))
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        self.address_cache.insert(address_key, ()).await;
        tracing::info!("Imported {} as lead {}", h.full_address, lead_id);
        Ok(ImportOutcome::Imported(lead_id))
    }
}

/// Free-text summary of the property and contact data, stored on the lead
/// so reps see the pitch context without leaving the CRM.
pub fn build_notes(h: &Homeowner) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(score) = h.score {
        let priority = h
            .priority
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!("Score: {score}/100 ({priority} priority)"));
    }
    if let Some(value) = h.estimated_value {
        lines.push(format!("Est. value: ${value:.0}"));
    }
    if let Some(lot) = h.lot_sqft {
        lines.push(format!("Lot: {lot:.0} sqft"));
    }
    if let (Some(beds), Some(baths)) = (h.bedrooms, h.bathrooms) {
        lines.push(format!("{beds} bed / {baths} bath"));
    }
    if let Some(year) = h.year_built {
        lines.push(format!("Built {year}"));
    }
    if let Some(phone) = &h.phone {
        let line_type = h.phone_line_type.as_deref().unwrap_or("unverified");
        lines.push(format!("Phone: {phone} ({line_type})"));
    }
    if let Some(email) = &h.email {
        lines.push(format!("Email: {email}"));
    }

    lines.join("\n")
}
