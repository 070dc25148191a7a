//! Generation lifecycle notifications.
//!
//! Presentation layers subscribe through an [`EventSink`] to show progress
//! ("waiting 3 s for quota", "switched to gpt-4o-mini"). Sinks are
//! synchronous and must not block: the rate-limit notice is fired from
//! inside the tracker's wait hook.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`GenerationEvent`] | Typed lifecycle event |
//! | [`EventSink`] | Trait for event destinations |
//! | [`NoopEventSink`] | Default sink, drops everything |
//! | [`InMemoryEventSink`] | Bounded in-memory sink for tests |
//! | [`TracingEventSink`] | Mirrors events into `tracing` |
//! | [`CompositeEventSink`] | Fans out to several sinks |

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// How a `generate` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// First thing a `generate` call emits.
    Started {
        context: Option<String>,
        name_hint: Option<String>,
    },
    /// Last thing a `generate` call emits, on every exit path.
    Finished {
        context: Option<String>,
        name_hint: Option<String>,
        outcome: GenerationOutcome,
    },
    /// A candidate other than the first attempted produced the result.
    FallbackOccurred {
        original_model: String,
        used_model: String,
        /// Classification name of the original model's failure.
        reason: String,
    },
    /// The call is about to sleep before dispatching to `model`.
    RateLimitWait { model: String, wait_ms: u64 },
}

impl GenerationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "generation-start",
            Self::Finished { .. } => "generation-end",
            Self::FallbackOccurred { .. } => "fallback-occurred",
            Self::RateLimitWait { .. } => "rate-limit-wait",
        }
    }
}

/// Destination for lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GenerationEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: GenerationEvent) {}
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoopEventSink)
}

/// In-memory sink for testing. Keeps the newest `max_events`.
pub struct InMemoryEventSink {
    events: RwLock<Vec<GenerationEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events: max,
        }
    }
    pub fn events(&self) -> Vec<GenerationEvent> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(GenerationEvent::kind).collect()
    }
    pub fn count(&self, kind: &str) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }
    pub fn clear(&self) {
        self.events.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: GenerationEvent) {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        events.push(event);
        if events.len() > self.max_events {
            events.remove(0);
        }
    }
}

/// Logs each event at `info` (waits at `debug`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: GenerationEvent) {
        match &event {
            GenerationEvent::Started { context, name_hint } => tracing::info!(
                event = event.kind(),
                context = context.as_deref().unwrap_or(""),
                name_hint = name_hint.as_deref().unwrap_or(""),
                "generation started"
            ),
            GenerationEvent::Finished {
                context,
                name_hint,
                outcome,
            } => tracing::info!(
                event = event.kind(),
                context = context.as_deref().unwrap_or(""),
                name_hint = name_hint.as_deref().unwrap_or(""),
                outcome = ?outcome,
                "generation finished"
            ),
            GenerationEvent::FallbackOccurred {
                original_model,
                used_model,
                reason,
            } => tracing::info!(
                event = event.kind(),
                original_model = %original_model,
                used_model = %used_model,
                reason = %reason,
                "fell back to another model"
            ),
            GenerationEvent::RateLimitWait { model, wait_ms } => tracing::debug!(
                event = event.kind(),
                model = %model,
                wait_ms = *wait_ms,
                "waiting for rate limit slot"
            ),
        }
    }
}

/// Sends every event to all inner sinks, in order.
#[derive(Default, Clone)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
    pub fn len(&self) -> usize {
        self.sinks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for CompositeEventSink {
    fn emit(&self, event: GenerationEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> GenerationEvent {
        GenerationEvent::Started {
            context: Some("appreciation".into()),
            name_hint: Some("Alice".into()),
        }
    }

    #[test]
    fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryEventSink::new(2);
        sink.emit(started());
        sink.emit(GenerationEvent::RateLimitWait {
            model: "m".into(),
            wait_ms: 10,
        });
        sink.emit(GenerationEvent::Finished {
            context: None,
            name_hint: None,
            outcome: GenerationOutcome::Succeeded,
        });
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.kinds(), vec!["rate-limit-wait", "generation-end"]);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_composite_fans_out() {
        let a = Arc::new(InMemoryEventSink::default());
        let b = Arc::new(InMemoryEventSink::default());
        let composite = CompositeEventSink::new()
            .add_sink(a.clone())
            .add_sink(b.clone())
            .add_sink(Arc::new(TracingEventSink))
            .add_sink(noop_sink());
        assert_eq!(composite.len(), 4);
        composite.emit(started());
        assert_eq!(a.count("generation-start"), 1);
        assert_eq!(b.events(), vec![started()]);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = GenerationEvent::FallbackOccurred {
            original_model: "gemini-2.0-flash".into(),
            used_model: "gpt-4o-mini".into(),
            reason: "quota".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "fallback_occurred");
        assert_eq!(json["used_model"], "gpt-4o-mini");
    }
}
