use crate::circuit_breaker::{create_skip_trace_circuit_breaker, SkipTraceBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Homeowner, PhoneCandidate};
use failsafe::CircuitBreaker;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Properties per bulk skip-trace request.
const BATCH_SIZE: usize = 50;
/// Fixed pause between batch requests.
const BATCH_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct SkipTraceRequest {
    requests: Vec<TraceItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TraceItem {
    request_id: String,
    property_address: TraceAddress,
}

#[derive(Debug, Serialize)]
struct TraceAddress {
    street: String,
    city: String,
    state: String,
    zip: String,
}

#[derive(Debug, Deserialize)]
struct SkipTraceResponse {
    #[serde(default)]
    results: Option<TraceResults>,
}

#[derive(Debug, Deserialize)]
struct TraceResults {
    #[serde(default)]
    persons: Option<Vec<PersonRecord>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonRecord {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    name: Option<PersonName>,
    #[serde(default)]
    phone_numbers: Option<Vec<WirePhone>>,
    #[serde(default)]
    emails: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct PersonName {
    #[serde(default)]
    first: Option<String>,
    #[serde(default)]
    last: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePhone {
    #[serde(default)]
    number: Option<String>,
    #[serde(rename = "type", default)]
    phone_type: Option<String>,
    #[serde(default)]
    dnc: Option<bool>,
    #[serde(default)]
    reachable: Option<bool>,
    #[serde(default)]
    score: Option<i64>,
}

/// Batched client for the skip-trace provider. Attaches phone/email
/// candidates to already-fetched properties; on any batch failure the batch
/// passes through unenriched; records are never dropped here.
pub struct SkipTraceClient {
    client: Client,
    base_url: String,
    api_key: String,
    breaker: SkipTraceBreaker,
}

impl SkipTraceClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.skip_trace_base_url.clone(),
            api_key: config.skip_trace_api_key.clone(),
            breaker: create_skip_trace_circuit_breaker(),
        }
    }

    /// Enrich all homeowners in fixed-size batches, preserving input order.
    pub async fn skip_trace(&self, homeowners: Vec<Homeowner>) -> Vec<Homeowner> {
        let total = homeowners.len();
        if total == 0 {
            return homeowners;
        }
        tracing::info!(
            "Skip tracing {} records in batches of {}",
            total,
            BATCH_SIZE
        );

        let mut output: Vec<Homeowner> = Vec::with_capacity(total);
        let mut batches = homeowners.into_iter().peekable();
        let mut batch_idx = 0usize;

        while batches.peek().is_some() {
            let batch: Vec<Homeowner> = batches.by_ref().take(BATCH_SIZE).collect();
            batch_idx += 1;

            if !self.breaker.is_call_permitted() {
                tracing::warn!(
                    "Skip-trace circuit open, passing batch {} through unenriched ({} records)",
                    batch_idx,
                    batch.len()
                );
                output.extend(batch);
                continue;
            }

            let items: Vec<TraceItem> = batch
                .iter()
                .map(|h| TraceItem {
                    request_id: Uuid::new_v4().to_string(),
                    property_address: TraceAddress {
                        street: h.address.clone(),
                        city: h.city.clone(),
                        state: h.state.clone(),
                        zip: h.zip.clone(),
                    },
                })
                .collect();
            let ids: Vec<String> = items.iter().map(|i| i.request_id.clone()).collect();

            let outcome = self.request_batch(items).await;
            // Feed the already-awaited result through the breaker so it
            // tracks consecutive batch failures.
            let outcome = self.breaker.call(|| outcome);

            match outcome {
                Ok(persons) => {
                    tracing::debug!(
                        "Batch {}: {} persons returned for {} requests",
                        batch_idx,
                        persons.len(),
                        batch.len()
                    );
                    output.extend(apply_batch(batch, persons, &ids));
                }
                Err(failsafe::Error::Inner(e)) => {
                    tracing::warn!(
                        "Skip-trace batch {} failed, passing {} records through unenriched: {}",
                        batch_idx,
                        batch.len(),
                        e
                    );
                    output.extend(batch);
                }
                Err(failsafe::Error::Rejected) => {
                    // Breaker tripped between the permit check and the call.
                    tracing::warn!(
                        "Skip-trace circuit rejected batch {}, passing {} records through unenriched",
                        batch_idx,
                        batch.len()
                    );
                    output.extend(batch);
                }
            }

            if batches.peek().is_some() {
                tokio::time::sleep(BATCH_DELAY).await;
            }
        }

        let with_phone = output.iter().filter(|h| h.has_phone()).count();
        tracing::info!(
            "Skip trace complete: {}/{} records have at least one phone",
            with_phone,
            total
        );
        output
    }

    async fn request_batch(&self, items: Vec<TraceItem>) -> Result<Vec<PersonRecord>, AppError> {
        let url = format!("{}/v1/SkipTraceBatch", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&SkipTraceRequest { requests: items })
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("skip-trace request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApi(format!(
                "skip-trace returned status {}: {}",
                status, error_text
            )));
        }

        let parsed: SkipTraceResponse = response.json().await.map_err(|e| {
            AppError::ExternalApi(format!("failed to parse skip-trace response: {e}"))
        })?;

        Ok(parsed
            .results
            .and_then(|r| r.persons)
            .unwrap_or_default())
    }
}

/// Map a batch's persons back onto its homeowners.
///
/// The provider's contract is positional, but when a person echoes the
/// request id we correlate by id instead: a truncated or reordered
/// response then leaves uncovered inputs unenriched rather than shifting
/// every subsequent pair.
fn apply_batch(
    mut batch: Vec<Homeowner>,
    persons: Vec<PersonRecord>,
    request_ids: &[String],
) -> Vec<Homeowner> {
    let id_to_index: HashMap<&str, usize> = request_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    for (pos, person) in persons.into_iter().enumerate() {
        let target = match person.request_id.as_deref().and_then(|id| id_to_index.get(id)) {
            Some(&idx) => Some(idx),
            None => {
                if person.request_id.is_some() {
                    tracing::warn!(
                        "Skip-trace person at position {} carries an unknown request id, \
                         falling back to positional match",
                        pos
                    );
                }
                (pos < batch.len()).then_some(pos)
            }
        };

        let Some(idx) = target else {
            tracing::warn!(
                "Skip-trace returned more persons than requests (position {}), ignoring extra",
                pos
            );
            continue;
        };

        enrich_homeowner(&mut batch[idx], person);
    }

    batch
}

fn enrich_homeowner(h: &mut Homeowner, person: PersonRecord) {
    if let Some(name) = person.name {
        if h.first_name.is_none() {
            h.first_name = name.first.filter(|s| !s.trim().is_empty());
        }
        if h.last_name.is_none() {
            h.last_name = name.last.filter(|s| !s.trim().is_empty());
        }
        if h.owner_name.trim().is_empty() {
            h.owner_name = match (&h.first_name, &h.last_name) {
                (Some(f), Some(l)) => format!("{f} {l}"),
                (Some(f), None) => f.clone(),
                (None, Some(l)) => l.clone(),
                (None, None) => String::new(),
            };
        }
    }

    let candidates: Vec<PhoneCandidate> = person
        .phone_numbers
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| {
            let number = p.number?.trim().to_string();
            if number.is_empty() {
                return None;
            }
            Some(PhoneCandidate {
                number,
                phone_type: p.phone_type,
                reachable: p.reachable.unwrap_or(false),
                dnc: p.dnc.unwrap_or(false),
                score: p.score,
            })
        })
        .collect();

    if h.phone.is_none() {
        h.phone = select_best_phone(&candidates).map(|c| c.number.clone());
    }
    h.phones.extend(candidates);

    for raw in person.emails.unwrap_or_default() {
        let email = raw
            .as_str()
            .map(str::to_string)
            .or_else(|| {
                raw.get("email")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            });
        if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
            if h.email.is_none() {
                h.email = Some(email.clone());
            }
            h.emails.push(email);
        }
    }
}

/// Pick the contact number to dial. DNC numbers are discarded from
/// consideration first; within the remainder: reachable mobile, then any
/// reachable, then anything left. The raw first candidate is the final
/// fallback when every number is flagged DNC.
pub fn select_best_phone(candidates: &[PhoneCandidate]) -> Option<&PhoneCandidate> {
    let dialable: Vec<&PhoneCandidate> = candidates.iter().filter(|c| !c.dnc).collect();

    dialable
        .iter()
        .find(|c| c.reachable && c.is_mobile())
        .or_else(|| dialable.iter().find(|c| c.reachable))
        .or_else(|| dialable.first())
        .copied()
        .or_else(|| candidates.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(number: &str, phone_type: &str, reachable: bool, dnc: bool) -> PhoneCandidate {
        PhoneCandidate {
            number: number.to_string(),
            phone_type: Some(phone_type.to_string()),
            reachable,
            dnc,
            score: None,
        }
    }

    #[test]
    fn reachable_mobile_wins() {
        let candidates = vec![
            candidate("6025550001", "landline", true, false),
            candidate("4805550002", "mobile", true, false),
            candidate("4805550003", "mobile", false, false),
        ];
        assert_eq!(
            select_best_phone(&candidates).unwrap().number,
            "4805550002"
        );
    }

    #[test]
    fn dnc_discarded_before_selection() {
        let candidates = vec![
            candidate("4805550001", "mobile", true, true),
            candidate("6025550002", "landline", true, false),
        ];
        // The DNC mobile loses to the reachable landline.
        assert_eq!(
            select_best_phone(&candidates).unwrap().number,
            "6025550002"
        );
    }

    #[test]
    fn all_dnc_falls_back_to_first_raw_candidate() {
        let candidates = vec![
            candidate("4805550001", "mobile", true, true),
            candidate("6025550002", "landline", false, true),
        ];
        assert_eq!(
            select_best_phone(&candidates).unwrap().number,
            "4805550001"
        );
    }

    #[test]
    fn unreachable_non_dnc_beats_nothing() {
        let candidates = vec![candidate("4805550009", "landline", false, false)];
        assert_eq!(
            select_best_phone(&candidates).unwrap().number,
            "4805550009"
        );
    }

    #[test]
    fn empty_candidates_yield_none() {
        assert!(select_best_phone(&[]).is_none());
    }

    #[test]
    fn truncated_response_leaves_tail_unenriched() {
        let batch = vec![
            Homeowner {
                address: "1 First St".into(),
                ..Default::default()
            },
            Homeowner {
                address: "2 Second St".into(),
                ..Default::default()
            },
            Homeowner {
                address: "3 Third St".into(),
                ..Default::default()
            },
        ];
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        // Provider truncation: only two persons for three requests.
        let persons = vec![
            PersonRecord {
                request_id: Some("a".into()),
                name: None,
                phone_numbers: Some(vec![WirePhone {
                    number: Some("4805550100".into()),
                    phone_type: Some("mobile".into()),
                    dnc: Some(false),
                    reachable: Some(true),
                    score: Some(90),
                }]),
                emails: None,
            },
            PersonRecord {
                request_id: Some("b".into()),
                name: None,
                phone_numbers: Some(vec![WirePhone {
                    number: Some("6025550200".into()),
                    phone_type: Some("landline".into()),
                    dnc: Some(false),
                    reachable: Some(true),
                    score: None,
                }]),
                emails: None,
            },
        ];

        let out = apply_batch(batch, persons, &ids);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].phone.as_deref(), Some("4805550100"));
        assert_eq!(out[1].phone.as_deref(), Some("6025550200"));
        assert!(out[2].phone.is_none());
        assert!(out[2].phones.is_empty());
    }

    #[test]
    fn unknown_request_id_falls_back_to_position() {
        let batch = vec![Homeowner::default(), Homeowner::default()];
        let ids = vec!["a".to_string(), "b".to_string()];
        let persons = vec![PersonRecord {
            request_id: Some("mystery".into()),
            name: Some(PersonName {
                first: Some("Pat".into()),
                last: Some("Lee".into()),
            }),
            phone_numbers: None,
            emails: None,
        }];

        let out = apply_batch(batch, persons, &ids);
        assert_eq!(out[0].first_name.as_deref(), Some("Pat"));
        assert!(out[1].first_name.is_none());
    }

    #[test]
    fn email_objects_and_strings_both_accepted() {
        let mut h = Homeowner::default();
        enrich_homeowner(
            &mut h,
            PersonRecord {
                request_id: None,
                name: None,
                phone_numbers: None,
                emails: Some(vec![
                    serde_json::json!({"email": "owner@example.com"}),
                    serde_json::json!("second@example.com"),
                ]),
            },
        );
        assert_eq!(h.email.as_deref(), Some("owner@example.com"));
        assert_eq!(h.emails.len(), 2);
    }
}
