use serde::Deserialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Area codes accepted by default when `AREA_CODES` is not set: the
/// Phoenix-metro prefixes the sales team actually dials.
pub const DEFAULT_AREA_CODES: [&str; 5] = ["480", "602", "623", "520", "928"];

/// Environment-driven configuration: credentials, endpoints, and tenant
/// identity. Run-level knobs live in [`RunOptions`] instead.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub property_api_base_url: String,
    pub property_api_key: String,
    pub skip_trace_base_url: String,
    pub skip_trace_api_key: String,
    /// Carrier lookup is optional; verification becomes a no-op passthrough
    /// when either credential is absent.
    pub carrier_lookup_base_url: Option<String>,
    pub carrier_lookup_sid: Option<String>,
    pub carrier_lookup_token: Option<String>,
    /// Tenant partition every import is scoped to.
    pub workspace_id: Uuid,
    /// User the imported leads are assigned to.
    pub assigned_user_id: Option<Uuid>,
    pub allowed_area_codes: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            property_api_base_url: require_http_url("PROPERTY_API_BASE_URL")?,
            property_api_key: require_non_empty("PROPERTY_API_KEY")?,
            skip_trace_base_url: require_http_url("SKIP_TRACE_BASE_URL")?,
            skip_trace_api_key: require_non_empty("SKIP_TRACE_API_KEY")?,
            carrier_lookup_base_url: std::env::var("CARRIER_LOOKUP_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            carrier_lookup_sid: std::env::var("CARRIER_LOOKUP_SID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            carrier_lookup_token: std::env::var("CARRIER_LOOKUP_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            workspace_id: std::env::var("WORKSPACE_ID")
                .map_err(|_| anyhow::anyhow!("WORKSPACE_ID environment variable required"))
                .and_then(|raw| {
                    Uuid::parse_str(raw.trim())
                        .map_err(|_| anyhow::anyhow!("WORKSPACE_ID must be a valid UUID"))
                })?,
            assigned_user_id: match std::env::var("ASSIGNED_USER_ID") {
                Ok(raw) if !raw.trim().is_empty() => Some(
                    Uuid::parse_str(raw.trim())
                        .map_err(|_| anyhow::anyhow!("ASSIGNED_USER_ID must be a valid UUID"))?,
                ),
                _ => None,
            },
            allowed_area_codes: std::env::var("AREA_CODES")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| {
                    DEFAULT_AREA_CODES.iter().map(|s| s.to_string()).collect()
                }),
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Property API base URL: {}", config.property_api_base_url);
        tracing::debug!("Skip-trace base URL: {}", config.skip_trace_base_url);
        if config.carrier_lookup_enabled() {
            tracing::info!("Carrier lookup configured; phone verification active");
        } else {
            tracing::info!("Carrier lookup not configured; phone verification is a passthrough");
        }
        tracing::debug!("Allowed area codes: {:?}", config.allowed_area_codes);

        Ok(config)
    }

    /// Verification runs for real only when both lookup credentials exist.
    pub fn carrier_lookup_enabled(&self) -> bool {
        self.carrier_lookup_sid.is_some() && self.carrier_lookup_token.is_some()
    }
}

fn require_non_empty(var: &str) -> anyhow::Result<String> {
    std::env::var(var)
        .map_err(|_| anyhow::anyhow!("{var} environment variable required"))
        .and_then(|val| {
            if val.trim().is_empty() {
                anyhow::bail!("{var} cannot be empty");
            }
            Ok(val)
        })
}

fn require_http_url(var: &str) -> anyhow::Result<String> {
    require_non_empty(var).and_then(|url| {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("{var} must start with http:// or https://");
        }
        Ok(url)
    })
}

/// Run-level options, one instance per pipeline execution. This struct's
/// shape is the CLI contract: the binary's argument parser produces it, the
/// orchestrator consumes it.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub city: String,
    pub state: String,
    /// Hard cap on records fetched from the search provider.
    pub max_results: usize,
    /// Records scoring below this are dropped before persistence.
    pub min_score: u32,
    pub min_lot_sqft: Option<f64>,
    pub min_value: Option<f64>,
    /// Skip all destination-store writes but still produce the report.
    pub dry_run: bool,
    /// Page offset handed to the search provider on resume.
    pub resume_offset: usize,
    /// When false, the region phone filter stage is bypassed.
    pub region_filter: bool,
    pub checkpoint_path: PathBuf,
    pub export_path: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            city: "Scottsdale".to_string(),
            state: "AZ".to_string(),
            max_results: 250,
            min_score: 0,
            min_lot_sqft: Some(10_000.0),
            min_value: Some(750_000.0),
            dry_run: false,
            resume_offset: 0,
            region_filter: true,
            checkpoint_path: PathBuf::from("pipeline_progress.json"),
            export_path: PathBuf::from("qualified_leads.csv"),
        }
    }
}
