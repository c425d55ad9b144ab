/// Outbound effect dispatcher
///
/// The engine decides what to do; collaborators do it. Webhook effects are
/// the one kind this process performs itself, as fire-and-forget HTTP
/// calls: the interpreter loop never blocks on the call, and the outcome
/// is only traced (a collaborator that wants to branch on the result
/// reports it back as a variable write through the session API).
/// Everything user-facing is returned to the API caller for the transport
/// layer to deliver.

use crate::runtime::executor::Effect;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EffectDispatcher {
    http: reqwest::Client,
}

impl Default for EffectDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectDispatcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Dispatch the side-effecting subset of a tick's effects
    ///
    /// Returns immediately; HTTP calls run on spawned tasks.
    pub fn dispatch(&self, session_id: Uuid, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::WebhookCall { method, url, body } => {
                    self.fire_webhook(session_id, method, url, body.clone());
                }
                Effect::Notify { message } => {
                    tracing::info!("🔔 Admin notification (session {}): {}", session_id, message);
                }
                Effect::Payment { amount, product, .. } => {
                    tracing::info!(
                        "💳 Payment effect dispatched (session {}): {} for {:?}",
                        session_id,
                        amount,
                        product
                    );
                }
                Effect::Delivery { product, .. } => {
                    tracing::info!(
                        "📦 Delivery effect dispatched (session {}): {:?}",
                        session_id,
                        product
                    );
                }
                Effect::Remarketing { delay_seconds, .. } => {
                    tracing::info!(
                        "📣 Remarketing effect dispatched (session {}): follow-up in {}s",
                        session_id,
                        delay_seconds
                    );
                }
                // User-facing effects are delivered by the transport layer
                _ => {}
            }
        }
    }

    /// Fire-and-continue: spawn the call and only trace the outcome
    fn fire_webhook(&self, session_id: Uuid, method: &str, url: &str, body: Option<String>) {
        let client = self.http.clone();
        let method = method.to_uppercase();
        let url = url.to_string();

        tokio::spawn(async move {
            let request = match method.as_str() {
                "GET" => client.get(&url),
                "PUT" => client.put(&url),
                "DELETE" => client.delete(&url),
                "PATCH" => client.patch(&url),
                _ => client.post(&url),
            };
            let request = match body {
                Some(body) => request
                    .header("content-type", "application/json")
                    .body(body),
                None => request,
            };

            match request.send().await {
                Ok(response) => {
                    tracing::info!(
                        "🌐 Webhook {} {} (session {}) -> {}",
                        method,
                        url,
                        session_id,
                        response.status()
                    );
                }
                Err(e) => {
                    // Resource errors belong to the collaborator; the engine
                    // only records that dispatch happened
                    tracing::warn!(
                        "🌐 Webhook {} {} (session {}) failed: {}",
                        method,
                        url,
                        session_id,
                        e
                    );
                }
            }
        });
    }
}
