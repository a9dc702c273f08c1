//! Natural-language report queries.
//!
//! One prompt produces one tabular report. There is no history and no
//! conversation; the query text shares the outbound draft with voice input.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use concierge_core::{DraftText, EventBus, ReportResult, SessionEvent};
use concierge_gateway::BackendGateway;

use crate::error::ChatError;
use crate::guard::OnDrop;

const EMPTY_QUERY_MESSAGE: &str = "Por favor, escribe o dicta tu consulta";
const FALLBACK_ERROR_MESSAGE: &str = "Error al generar el reporte";

/// What the reports page renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSnapshot {
    pub pending: bool,
    pub result: Option<ReportResult>,
    pub error: Option<String>,
}

struct Inner {
    gateway: Arc<dyn BackendGateway>,
    state: Mutex<ReportSnapshot>,
    snapshots: watch::Sender<ReportSnapshot>,
    events: EventBus,
    draft: DraftText,
}

impl Inner {
    fn update<R>(&self, f: impl FnOnce(&mut ReportSnapshot) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        self.snapshots.send_replace(state.clone());
        result
    }

    fn lock(&self) -> MutexGuard<'_, ReportSnapshot> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Single-in-flight report generator.
#[derive(Clone)]
pub struct ReportQuery {
    inner: Arc<Inner>,
}

impl ReportQuery {
    /// `events` is normally the session's bus, so report outcomes reach the
    /// same observers as chat events.
    pub fn new(gateway: Arc<dyn BackendGateway>, draft: DraftText, events: EventBus) -> Self {
        let (snapshots, _) = watch::channel(ReportSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                gateway,
                state: Mutex::new(ReportSnapshot::default()),
                snapshots,
                events,
                draft,
            }),
        }
    }

    pub fn snapshot(&self) -> ReportSnapshot {
        self.inner.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReportSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn draft(&self) -> DraftText {
        self.inner.draft.clone()
    }

    /// Generate a report for `query`.
    ///
    /// The previous result and error are cleared before the backend is asked.
    /// Failures are stored as a human-readable error on the snapshot as well
    /// as returned.
    pub async fn generate(&self, query: &str) -> Result<ReportResult, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            self.inner
                .update(|s| s.error = Some(EMPTY_QUERY_MESSAGE.to_string()));
            return Err(ChatError::EmptyMessage);
        }

        let started = self.inner.update(|s| {
            if s.pending {
                return false;
            }
            s.pending = true;
            s.result = None;
            s.error = None;
            true
        });
        if !started {
            debug!("Report already in flight; ignored");
            return Err(ChatError::ReportInFlight);
        }
        let inner = &self.inner;
        let guard = OnDrop::new(|| inner.update(|s| s.pending = false));

        debug!(query, "Generating report");
        let result = inner.gateway.generate_report(query).await;
        match result {
            Ok(report) => {
                let row_count = report.data.len();
                inner.update(|s| {
                    s.result = Some(report.clone());
                    s.pending = false;
                });
                guard.disarm();
                info!(row_count, "Report generated");
                inner.events.publish(SessionEvent::ReportGenerated {
                    query: query.to_string(),
                    row_count,
                    timestamp: Utc::now(),
                });
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind, "Report generation failed");
                let message = if e.message.trim().is_empty() {
                    FALLBACK_ERROR_MESSAGE.to_string()
                } else {
                    e.message.clone()
                };
                inner.update(|s| {
                    s.error = Some(message.clone());
                    s.pending = false;
                });
                guard.disarm();
                inner.events.publish(SessionEvent::ReportFailed {
                    reason: message,
                    timestamp: Utc::now(),
                });
                Err(ChatError::Gateway(e))
            }
        }
    }

    /// Generate from whatever the draft holds; the draft is kept so the
    /// query stays editable.
    pub async fn generate_draft(&self) -> Result<ReportResult, ChatError> {
        let query = self.inner.draft.get();
        self.generate(&query).await
    }

    /// An example query chip: fill the draft and generate.
    pub async fn quick_query(&self, query: &str) -> Result<ReportResult, ChatError> {
        self.inner.draft.set(query);
        self.generate(query).await
    }

    pub fn clear_error(&self) {
        self.inner.update(|s| s.error = None);
    }
}
