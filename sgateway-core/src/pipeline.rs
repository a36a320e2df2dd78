//! Two-phase middleware pipeline.
//!
//! Ingress and egress run in the *same* declaration order — egress is not
//! reversed, which is unusual for an interceptor chain but is what this
//! gateway's callers observe and depend on. The asymmetry is in how a
//! returned response is treated, not in traversal order:
//!
//! - Ingress: the first non-null response wins, but every middleware still
//!   runs (for side effects on the envelope); later winners are discarded.
//! - Egress: any middleware may replace the current response; later
//!   middlewares see the replacement.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::envelope::{Envelope, GatewayResponse};
use crate::error::GatewayError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A pipeline stage. Both hooks default to a no-op so a middleware only
/// implements the phase it cares about.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this middleware still runs for webhook methods. Defaults to
    /// `false`, matching the original's conservative default.
    fn webhook_friendly(&self) -> bool {
        false
    }

    fn process_request<'a>(&'a self, envelope: &'a mut Envelope) -> BoxFuture<'a, Result<Option<GatewayResponse>, GatewayError>> {
        Box::pin(async { Ok(None) })
    }

    fn process_response<'a>(
        &'a self,
        envelope: &'a mut Envelope,
        response: Option<GatewayResponse>,
        error: Option<&'a GatewayError>,
    ) -> BoxFuture<'a, Result<Option<GatewayResponse>, GatewayError>> {
        let _ = (envelope, response, error);
        Box::pin(async { Ok(None) })
    }
}

pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    fn applicable(&self, envelope: &Envelope) -> impl Iterator<Item = &Arc<dyn Middleware>> {
        let is_webhook = envelope.is_webhook;
        self.middlewares.iter().filter(move |mw| !is_webhook || mw.webhook_friendly())
    }

    /// Runs ingress. On success returns the winning response, if any — the
    /// service method only runs when this is `None`. On the first
    /// middleware error, ingress aborts immediately and the error flows to
    /// egress as `(None, Some(error))`, per §4.3.
    pub async fn run_ingress(&self, envelope: &mut Envelope) -> (Option<GatewayResponse>, Option<GatewayError>) {
        let mut winner: Option<GatewayResponse> = None;
        let middlewares: Vec<Arc<dyn Middleware>> = self.applicable(envelope).cloned().collect();
        for mw in middlewares {
            match mw.process_request(envelope).await {
                Ok(Some(response)) => {
                    if winner.is_none() {
                        winner = Some(response);
                    }
                }
                Ok(None) => {}
                Err(err) => return (None, Some(err)),
            }
        }
        (winner, None)
    }

    /// Runs egress unconditionally, even when `error` is already set. Each
    /// middleware sees the most recently replaced response.
    pub async fn run_egress(
        &self,
        envelope: &mut Envelope,
        mut response: Option<GatewayResponse>,
        mut error: Option<GatewayError>,
    ) -> (Option<GatewayResponse>, Option<GatewayError>) {
        let middlewares: Vec<Arc<dyn Middleware>> = self.applicable(envelope).cloned().collect();
        for mw in middlewares {
            match mw.process_response(envelope, response.clone(), error.as_ref()).await {
                Ok(Some(replacement)) => response = Some(replacement),
                Ok(None) => {}
                Err(err) => error = Some(err),
            }
        }
        (response, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{MethodDescriptor, ServiceDescriptor};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn envelope(is_webhook: bool) -> Envelope {
        let transport = crate::envelope::TransportRequest {
            headers: HashMap::new(),
            query: HashMap::new(),
            body: None,
            remote_addr: None,
            path: "/email/v1/send".into(),
            http_method: "POST",
            scheme: "https",
        };
        let service = ServiceDescriptor::new("email", 1, "Email");
        let method = MethodDescriptor::new("send", "POST", is_webhook);
        Envelope::new(transport, service, method)
    }

    struct Recording {
        name: &'static str,
        webhook_friendly: bool,
        ingress_response: Option<GatewayResponse>,
        egress_response: Option<GatewayResponse>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn webhook_friendly(&self) -> bool {
            self.webhook_friendly
        }

        fn process_request<'a>(&'a self, envelope: &'a mut Envelope) -> crate::pipeline::BoxFuture<'a, Result<Option<GatewayResponse>, GatewayError>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{}:ingress", self.name));
                envelope.add_loggable_property(format!("{}_ran", self.name), Value::Bool(true));
                Ok(self.ingress_response.clone())
            })
        }

        fn process_response<'a>(
            &'a self,
            _envelope: &'a mut Envelope,
            _response: Option<GatewayResponse>,
            _error: Option<&'a GatewayError>,
        ) -> crate::pipeline::BoxFuture<'a, Result<Option<GatewayResponse>, GatewayError>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{}:egress", self.name));
                Ok(self.egress_response.clone())
            })
        }
    }

    #[tokio::test]
    async fn ingress_first_winner_wins_but_all_middlewares_still_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let m1 = Arc::new(Recording {
            name: "M1",
            webhook_friendly: true,
            ingress_response: Some(GatewayResponse::json(Value::from("m1"))),
            egress_response: None,
            log: log.clone(),
        });
        let m2 = Arc::new(Recording {
            name: "M2",
            webhook_friendly: true,
            ingress_response: Some(GatewayResponse::json(Value::from("m2"))),
            egress_response: None,
            log: log.clone(),
        });
        let pipeline = Pipeline::new(vec![m1, m2]);
        let mut env = envelope(false);
        let (winner, err) = pipeline.run_ingress(&mut env).await;
        assert!(err.is_none());
        assert_eq!(winner.unwrap().response_data, Value::from("m1"));
        assert_eq!(*log.lock().unwrap(), vec!["M1:ingress", "M2:ingress"]);
    }

    #[tokio::test]
    async fn egress_runs_in_declaration_order_not_reversed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let m1 = Arc::new(Recording { name: "M1", webhook_friendly: true, ingress_response: None, egress_response: None, log: log.clone() });
        let m2 = Arc::new(Recording { name: "M2", webhook_friendly: true, ingress_response: None, egress_response: None, log: log.clone() });
        let pipeline = Pipeline::new(vec![m1, m2]);
        let mut env = envelope(false);
        pipeline.run_egress(&mut env, None, None).await;
        assert_eq!(*log.lock().unwrap(), vec!["M1:egress", "M2:egress"]);
    }

    #[tokio::test]
    async fn egress_later_middleware_replaces_response_seen_by_the_next() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let m1 = Arc::new(Recording {
            name: "M1",
            webhook_friendly: true,
            ingress_response: None,
            egress_response: Some(GatewayResponse::json(Value::from("from-m1"))),
            log: log.clone(),
        });
        let m2 = Arc::new(Recording { name: "M2", webhook_friendly: true, ingress_response: None, egress_response: None, log: log.clone() });
        let pipeline = Pipeline::new(vec![m1, m2]);
        let mut env = envelope(false);
        let (response, _) = pipeline.run_egress(&mut env, None, None).await;
        assert_eq!(response.unwrap().response_data, Value::from("from-m1"));
    }

    #[tokio::test]
    async fn egress_runs_even_when_an_error_is_present() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let m1 = Arc::new(Recording { name: "M1", webhook_friendly: true, ingress_response: None, egress_response: None, log: log.clone() });
        let pipeline = Pipeline::new(vec![m1]);
        let mut env = envelope(false);
        let error = Some(GatewayError::ServiceInternal { message: "boom".into() });
        pipeline.run_egress(&mut env, None, error).await;
        assert_eq!(*log.lock().unwrap(), vec!["M1:egress"]);
    }

    #[tokio::test]
    async fn webhook_requests_skip_non_webhook_friendly_middlewares() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let friendly = Arc::new(Recording { name: "Friendly", webhook_friendly: true, ingress_response: None, egress_response: None, log: log.clone() });
        let unfriendly = Arc::new(Recording { name: "Unfriendly", webhook_friendly: false, ingress_response: None, egress_response: None, log: log.clone() });
        let pipeline = Pipeline::new(vec![friendly, unfriendly]);
        let mut env = envelope(true);
        pipeline.run_ingress(&mut env).await;
        assert_eq!(*log.lock().unwrap(), vec!["Friendly:ingress"]);
    }
}
