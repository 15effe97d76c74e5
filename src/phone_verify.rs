use crate::config::Config;
use crate::models::Homeowner;
use phonenumber::country::Id as CountryId;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Lookups issued concurrently per batch.
const VERIFY_BATCH: usize = 10;
/// Pause between batches, only when a real lookup backend is active.
const VERIFY_DELAY: Duration = Duration::from_secs(1);

/// Normalize a phone to E.164-like form: strip non-digits, prepend country
/// code 1 to bare 10-digit numbers, prepend `+`. Returns `None` when the
/// digit count falls outside 10-15.
pub fn normalize_e164(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 {
        digits.insert(0, '1');
    }
    if digits.len() < 10 || digits.len() > 15 {
        return None;
    }
    Some(format!("+{digits}"))
}

/// Sanity-check a number against the US numbering plan before spending a
/// lookup credit on it.
pub fn is_plausible_us_phone(raw: &str) -> bool {
    match phonenumber::parse(Some(CountryId::US), raw) {
        Ok(number) => phonenumber::is_valid(&number),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
struct LookupCreds {
    base_url: String,
    sid: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    carrier: Option<CarrierInfo>,
    #[serde(default)]
    national_format: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CarrierInfo {
    #[serde(rename = "type", default)]
    carrier_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Optional carrier-lookup stage. Without credentials it is a no-op
/// passthrough; with them it annotates mobile vs. landline per record,
/// marking individual failures unverified rather than dropping anything.
pub struct PhoneVerificationClient {
    client: Client,
    creds: Option<LookupCreds>,
}

impl PhoneVerificationClient {
    pub fn new(config: &Config) -> Self {
        let creds = match (
            &config.carrier_lookup_sid,
            &config.carrier_lookup_token,
        ) {
            (Some(sid), Some(token)) => Some(LookupCreds {
                base_url: config
                    .carrier_lookup_base_url
                    .clone()
                    .unwrap_or_else(|| "https://lookups.twilio.com".to_string()),
                sid: sid.clone(),
                token: token.clone(),
            }),
            _ => None,
        };
        Self {
            client: Client::new(),
            creds,
        }
    }

    pub fn is_active(&self) -> bool {
        self.creds.is_some()
    }

    /// Verify every record's selected phone in concurrent batches.
    pub async fn verify_all(&self, homeowners: Vec<Homeowner>) -> Vec<Homeowner> {
        let Some(creds) = &self.creds else {
            tracing::info!("Carrier lookup not configured, skipping phone verification");
            return homeowners;
        };

        let total = homeowners.len();
        tracing::info!(
            "Verifying {} phone numbers in concurrent batches of {}",
            total,
            VERIFY_BATCH
        );

        let mut output: Vec<Homeowner> = Vec::with_capacity(total);
        let mut verified_count = 0usize;
        let mut batches = homeowners.into_iter().peekable();

        while batches.peek().is_some() {
            let batch: Vec<Homeowner> = batches.by_ref().take(VERIFY_BATCH).collect();

            let mut handles = Vec::with_capacity(batch.len());
            for h in batch {
                let client = self.client.clone();
                let creds = creds.clone();
                handles.push(tokio::spawn(async move {
                    verify_one(client, creds, h).await
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok(h) => {
                        if h.phone_verified {
                            verified_count += 1;
                        }
                        output.push(h);
                    }
                    Err(e) => {
                        // A panicked task loses its record's annotations but
                        // must not sink the run; this should never happen.
                        tracing::error!("Phone verification task failed: {}", e);
                    }
                }
            }

            if batches.peek().is_some() {
                tokio::time::sleep(VERIFY_DELAY).await;
            }
        }

        tracing::info!("Phone verification: {}/{} verified", verified_count, total);
        output
    }
}

/// Verify a single record's selected phone. Any failure leaves the record
/// unverified; the record itself always comes back.
async fn verify_one(client: Client, creds: LookupCreds, mut h: Homeowner) -> Homeowner {
    let Some(phone) = h.phone.clone() else {
        return h;
    };

    let Some(e164) = normalize_e164(&phone) else {
        tracing::debug!("Unverifiable phone (bad length): {}", phone);
        return h;
    };

    if !is_plausible_us_phone(&e164) {
        tracing::debug!("Skipping lookup for implausible US number: {}", e164);
        return h;
    }

    let url = format!(
        "{}/v1/PhoneNumbers/{}?Type=carrier",
        creds.base_url, e164
    );

    let response = client
        .get(&url)
        .basic_auth(&creds.sid, Some(&creds.token))
        .send()
        .await;

    match response {
        Ok(resp) if resp.status().is_success() => match resp.json::<LookupResponse>().await {
            Ok(lookup) => {
                let line_type = lookup
                    .carrier
                    .as_ref()
                    .and_then(|c| c.carrier_type.clone());
                if let Some(carrier) = &lookup.carrier {
                    tracing::debug!(
                        "Carrier lookup {}: type={:?} name={:?}",
                        e164,
                        carrier.carrier_type,
                        carrier.name
                    );
                }
                h.phone_verified = true;
                h.phone_confidence = Some(if line_type.is_some() { 1.0 } else { 0.5 });
                h.phone_line_type = Some(line_type.unwrap_or_else(|| "unknown".to_string()));
                if let Some(formatted) = lookup.national_format {
                    h.phone = Some(formatted);
                }
                h
            }
            Err(e) => {
                tracing::warn!("Failed to parse carrier lookup for {}: {}", e164, e);
                h
            }
        },
        Ok(resp) => {
            tracing::warn!(
                "Carrier lookup for {} returned status {}",
                e164,
                resp.status()
            );
            h
        }
        Err(e) => {
            tracing::warn!("Carrier lookup request for {} failed: {}", e164, e);
            h
        }
    }
}
