//! Alerting on high-severity events.
//!
//! An event alerts when it meets any threshold: severity at least high,
//! escalation score at or above the configured minimum, more than ten
//! killed, or a CBRN-class weapon. Alerts are per-event and deduplicated
//! by event id within a cycle; delivery goes to pluggable sinks.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::config::AlertSettings;
use crate::error::{Error, Result};
use crate::extract::is_cbrn;
use crate::model::{Event, Severity};

/// One alert payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub event_id: String,
    pub headline: String,
    pub severity: Severity,
    pub escalation_score: u8,
    pub country: Option<String>,
    /// Which thresholds fired
    pub reasons: Vec<String>,
}

impl Alert {
    fn from_event(event: &Event, reasons: Vec<String>) -> Self {
        Self {
            event_id: event.id.clone(),
            headline: event.enhanced_headline.clone(),
            severity: event.severity,
            escalation_score: event.escalation_score,
            country: event.location.as_ref().map(|l| l.country.clone()),
            reasons,
        }
    }
}

/// Injected alert delivery capability.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<()>;

    /// Identifier used in diagnostics.
    fn name(&self) -> &str;
}

/// Sink that writes alerts to the log.
#[derive(Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        tracing::warn!(
            event_id = %alert.event_id,
            severity = %alert.severity,
            escalation = alert.escalation_score,
            reasons = ?alert.reasons,
            "ALERT: {}",
            alert.headline
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Sink that POSTs the alert JSON to a webhook.
pub struct WebhookSink {
    http: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| Error::transient_fetch("alert_webhook", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transient_fetch(
                "alert_webhook",
                format!("HTTP {}", status),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Evaluates thresholds and fans alerts out to the configured sinks.
pub struct AlertEmitter {
    settings: AlertSettings,
    sinks: Vec<Arc<dyn AlertSink>>,
    seen: Mutex<HashSet<String>>,
}

impl AlertEmitter {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            settings,
            sinks: Vec::new(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Threshold check. Returns the reasons that fired, or `None` when
    /// the event does not alert.
    pub fn should_alert(&self, event: &Event) -> Option<Vec<String>> {
        let mut reasons = Vec::new();

        if event.severity >= Severity::High {
            reasons.push(format!("severity {}", event.severity));
        }
        if event.escalation_score >= self.settings.min_score {
            reasons.push(format!("escalation {}", event.escalation_score));
        }
        if event.casualties.killed.unwrap_or(0) > self.settings.killed_over {
            reasons.push(format!("killed {}", event.casualties.killed.unwrap_or(0)));
        }
        if event.weapon_types.iter().any(|w| is_cbrn(w)) {
            reasons.push("cbrn weapon".to_string());
        }

        if reasons.is_empty() {
            None
        } else {
            Some(reasons)
        }
    }

    /// Emit an alert for the event if thresholds fire and it has not
    /// already alerted this cycle. Returns whether an alert was sent.
    pub async fn emit(&self, event: &Event) -> bool {
        let Some(reasons) = self.should_alert(event) else {
            return false;
        };

        {
            let mut seen = self.seen.lock().expect("alert dedup poisoned");
            if !seen.insert(event.id.clone()) {
                return false;
            }
        }

        let alert = Alert::from_event(event, reasons);
        for sink in &self.sinks {
            if let Err(err) = sink.deliver(&alert).await {
                tracing::warn!(sink = sink.name(), "alert delivery failed: {}", err);
            }
        }
        true
    }

    /// Clear the per-cycle dedup set.
    pub fn reset(&self) {
        self.seen.lock().expect("alert dedup poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Casualties, EventType, TimestampConfidence};
    use chrono::Utc;

    struct CountingSink(Mutex<Vec<Alert>>);

    #[async_trait]
    impl AlertSink for CountingSink {
        async fn deliver(&self, alert: &Alert) -> Result<()> {
            self.0.lock().unwrap().push(alert.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn event(escalation: u8, killed: Option<u32>, weapons: &[&str]) -> Event {
        let mut event = Event {
            id: Event::new_id(),
            title: "t".into(),
            enhanced_headline: "h".into(),
            timestamp: Utc::now(),
            timestamp_confidence: TimestampConfidence::Low,
            location: None,
            event_type: EventType::ArmedConflict,
            severity: Severity::Low,
            escalation_score: 1,
            casualties: Casualties {
                killed,
                wounded: None,
                missing: None,
            },
            primary_actors: vec![],
            weapon_types: weapons.iter().map(|w| w.to_string()).collect(),
            article_ids: vec!["a".into()],
            reliability: 0.5,
            tags: vec![],
            group_id: None,
        };
        event.set_escalation(escalation);
        event
    }

    #[test]
    fn test_thresholds() {
        let emitter = AlertEmitter::new(AlertSettings::default());

        // Low-severity, no casualties, conventional weapons: quiet.
        assert!(emitter.should_alert(&event(3, None, &["rifle"])).is_none());

        // Escalation at the minimum fires (and 7 is also severity high).
        assert!(emitter.should_alert(&event(7, None, &[])).is_some());

        // Killed over the threshold fires regardless of score.
        assert!(emitter.should_alert(&event(3, Some(11), &[])).is_some());
        assert!(emitter.should_alert(&event(3, Some(10), &[])).is_none());

        // CBRN weapon always fires.
        assert!(emitter
            .should_alert(&event(2, None, &["chlorine gas"]))
            .is_some());
    }

    #[tokio::test]
    async fn test_emit_deduplicates_by_event_id() {
        let sink = Arc::new(CountingSink(Mutex::new(Vec::new())));
        let emitter = AlertEmitter::new(AlertSettings::default()).with_sink(sink.clone());

        let alerting = event(9, Some(50), &[]);
        assert!(emitter.emit(&alerting).await);
        assert!(!emitter.emit(&alerting).await);
        assert_eq!(sink.0.lock().unwrap().len(), 1);

        // A new cycle clears the dedup set.
        emitter.reset();
        assert!(emitter.emit(&alerting).await);
    }

    #[tokio::test]
    async fn test_quiet_event_not_delivered() {
        let sink = Arc::new(CountingSink(Mutex::new(Vec::new())));
        let emitter = AlertEmitter::new(AlertSettings::default()).with_sink(sink.clone());

        assert!(!emitter.emit(&event(2, None, &[])).await);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_propagate() {
        struct FailingSink;

        #[async_trait]
        impl AlertSink for FailingSink {
            async fn deliver(&self, _alert: &Alert) -> Result<()> {
                Err(Error::transient_fetch("alert_webhook", "HTTP 500"))
            }

            fn name(&self) -> &str {
                "failing"
            }
        }

        let emitter = AlertEmitter::new(AlertSettings::default()).with_sink(Arc::new(FailingSink));
        // Delivery failure still counts as an emitted alert.
        assert!(emitter.emit(&event(9, None, &[])).await);
    }
}
