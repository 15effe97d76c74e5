use std::env;
use uuid::Uuid;

use rust_leadgen_pipeline::config::Config;
use rust_leadgen_pipeline::db::Database;
use rust_leadgen_pipeline::importer::{ImportOutcome, LeadImporter};
use rust_leadgen_pipeline::models::Homeowner;

fn integration_config(workspace_id: Uuid) -> Config {
    Config {
        database_url: "postgresql://unused".to_string(),
        property_api_base_url: "http://unused".to_string(),
        property_api_key: "unused".to_string(),
        skip_trace_base_url: "http://unused".to_string(),
        skip_trace_api_key: "unused".to_string(),
        carrier_lookup_base_url: None,
        carrier_lookup_sid: None,
        carrier_lookup_token: None,
        workspace_id,
        assigned_user_id: None,
        allowed_area_codes: vec!["480".to_string()],
    }
}

/// Integration smoke test for the idempotent lead upsert.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn upsert_is_idempotent_per_address() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let workspace_id = env::var("TEST_WORKSPACE_ID")
        .ok()
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .unwrap_or_else(Uuid::new_v4);
    let importer = LeadImporter::new(db.pool.clone(), &integration_config(workspace_id));

    // Unique street number so repeated runs never collide with old data.
    let street = format!("{} E Idempotence Ct", Uuid::new_v4().as_u128() % 100_000);
    let homeowner = Homeowner {
        property_id: "test-prop".to_string(),
        address: street.clone(),
        city: "Scottsdale".to_string(),
        state: "AZ".to_string(),
        zip: "85251".to_string(),
        full_address: format!("{street}, Scottsdale, AZ 85251"),
        owner_name: "Pat Example".to_string(),
        phone: Some("4805550100".to_string()),
        score: Some(80),
        ..Default::default()
    };

    // First call creates exactly one record.
    let first = importer.upsert(&homeowner).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let lead_id = match first {
        ImportOutcome::Imported(id) => id,
        ImportOutcome::Skipped => anyhow::bail!("first upsert unexpectedly skipped"),
    };
    assert_ne!(lead_id, Uuid::nil());

    // Second call with the identical input reports skipped.
    let second = importer.upsert(&homeowner).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(second, ImportOutcome::Skipped);

    // A different owner at the same address also collapses to a skip:
    // address is the sole natural key within the workspace.
    let mut second_owner = homeowner.clone();
    second_owner.owner_name = "Chris Example".to_string();
    let third = importer.upsert(&second_owner).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(third, ImportOutcome::Skipped);

    Ok(())
}
