use std::collections::HashMap;

use common::{decode_event, EventError, EventKind, StreamEvent, CONNECTED_EVENT};
use tracing::{debug, warn};

use crate::transport::SseFrame;

pub type Handler = Box<dyn FnMut(&StreamEvent) + Send>;

/// Outcome of routing one frame.
#[derive(Debug)]
pub enum Dispatch {
    Delivered(EventKind),
    /// Decoded fine but nobody registered for this kind.
    Unhandled(EventKind),
    /// Stream-level control message such as `connected`.
    Control(String),
    Dropped(EventError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub dropped: u64,
    pub unknown: u64,
}

/// Handler map keyed by event kind. At most one handler per kind; a second
/// registration replaces the first. Delivery is synchronous and in call order.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Handler>,
    observer: Option<Handler>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handler that was replaced, if any.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> Option<Handler>
    where
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        self.handlers.insert(kind, Box::new(handler))
    }

    /// Sees every decoded event after its typed handler.
    pub fn on_any<F>(&mut self, observer: F) -> Option<Handler>
    where
        F: FnMut(&StreamEvent) + Send + 'static,
    {
        self.observer.replace(Box::new(observer))
    }

    pub fn off(&mut self, kind: EventKind) -> Option<Handler> {
        self.handlers.remove(&kind)
    }

    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn dispatch(&mut self, frame: &SseFrame) -> Dispatch {
        if frame.name() == CONNECTED_EVENT {
            return Dispatch::Control(CONNECTED_EVENT.to_string());
        }
        match decode_event(frame.event.as_deref(), &frame.data) {
            Ok(event) => self.deliver(&event),
            Err(err) => {
                match &err {
                    EventError::UnknownTag(tag) => {
                        self.stats.unknown += 1;
                        debug!(tag = %tag, "dropping event with unknown tag");
                    }
                    other => {
                        self.stats.dropped += 1;
                        warn!(event = %frame.name(), error = %other, "dropping malformed event");
                    }
                }
                Dispatch::Dropped(err)
            }
        }
    }

    pub fn deliver(&mut self, event: &StreamEvent) -> Dispatch {
        let kind = event.kind();
        let handled = match self.handlers.get_mut(&kind) {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        };
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
        if handled {
            self.stats.delivered += 1;
            Dispatch::Delivered(kind)
        } else {
            debug!(kind = %kind, "no handler registered");
            Dispatch::Unhandled(kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame::named(event, data)
    }

    #[test]
    fn routes_by_kind_in_arrival_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::new();
        for kind in [EventKind::CallCreated, EventKind::ScamBlocked] {
            let seen = seen.clone();
            d.on(kind, move |ev| seen.lock().unwrap().push(ev.kind()));
        }
        let frames = [
            frame("call_created", r#"{"type":"call_created","data":{"call_id":"c1","caller_number":"+1"}}"#),
            frame("scam_blocked", r#"{"type":"scam_blocked","data":{"call_sid":"c1","confidence":0.9,"scam_type":"irs"}}"#),
            frame("call_created", r#"{"type":"call_created","data":{"call_id":"c2","caller_number":"+2"}}"#),
        ];
        for f in &frames {
            assert!(matches!(d.dispatch(f), Dispatch::Delivered(_)));
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::CallCreated, EventKind::ScamBlocked, EventKind::CallCreated]
        );
        assert_eq!(d.stats().delivered, 3);
    }

    #[test]
    fn last_registration_wins() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::new();
        let h1 = hits.clone();
        assert!(d.on(EventKind::AiThinking, move |_| h1.lock().unwrap().push("first")).is_none());
        let h2 = hits.clone();
        assert!(d.on(EventKind::AiThinking, move |_| h2.lock().unwrap().push("second")).is_some());
        d.dispatch(&frame("ai_thinking", r#"{"data":{"agent":"a","thought":"t"}}"#));
        assert_eq!(*hits.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn bad_frames_are_dropped_without_stopping_delivery() {
        let count = Arc::new(Mutex::new(0));
        let mut d = Dispatcher::new();
        let c = count.clone();
        d.on(EventKind::CallCreated, move |_| *c.lock().unwrap() += 1);

        assert!(matches!(d.dispatch(&frame("mystery", "{}")), Dispatch::Dropped(EventError::UnknownTag(_))));
        assert!(matches!(d.dispatch(&frame("call_created", "{not json")), Dispatch::Dropped(_)));
        assert!(matches!(
            d.dispatch(&frame("call_created", r#"{"data":{"caller_number":"+1"}}"#)),
            Dispatch::Dropped(_)
        ));
        d.dispatch(&frame("call_created", r#"{"data":{"call_id":"ok","caller_number":"+1"}}"#));

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(d.stats(), DispatchStats { delivered: 1, dropped: 2, unknown: 1 });
    }

    #[test]
    fn connected_is_a_control_frame() {
        let mut d = Dispatcher::new();
        let out = d.dispatch(&frame("connected", r#"{"type":"connected","data":{"user_id":"u"}}"#));
        assert!(matches!(out, Dispatch::Control(ref name) if name == "connected"));
    }

    #[test]
    fn observer_sees_unhandled_kinds() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut d = Dispatcher::new();
        let s = seen.clone();
        d.on_any(move |ev| s.lock().unwrap().push(ev.kind()));
        let out = d.dispatch(&frame("tool_executed", r#"{"data":{"tool":"lookup","result":{}}}"#));
        assert!(matches!(out, Dispatch::Unhandled(EventKind::ToolExecuted)));
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::ToolExecuted]);
        assert!(!d.has_handler(EventKind::ToolExecuted));
    }
}
