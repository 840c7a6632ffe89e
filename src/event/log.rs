use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::{Event, Role, Segment, ToolCallSegment, ToolResultSegment};
use crate::util::unix_now_millis;

/// Ordered, append-only list of Events for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Append a finalized Event.
    ///
    /// Tool results that answer no earlier call are logged as consistency
    /// violations but still appended.
    pub fn push(&mut self, event: Event) {
        for result in event.tool_results() {
            if !self.has_call_before(&event, &result.id) {
                tracing::warn!(
                    event_id = %event.id,
                    tool_call_id = %result.id,
                    "tool_result without a matching tool_call"
                );
            }
        }
        self.events.push(event);
    }

    fn has_call_before(&self, incoming: &Event, call_id: &str) -> bool {
        if self
            .events
            .iter()
            .any(|event| event.tool_calls().any(|call| call.id == call_id))
        {
            return true;
        }
        for segment in &incoming.segments {
            match segment {
                Segment::ToolCall(call) if call.id == call_id => return true,
                Segment::ToolResult(result) if result.id == call_id => return false,
                _ => {}
            }
        }
        false
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Text of the leading system Event, if the log starts with one.
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        self.events
            .first()
            .filter(|event| event.role == Role::System)
            .map(Event::text_content)
    }

    /// Events after the leading system Event.
    #[must_use]
    pub fn conversation_events(&self) -> &[Event] {
        match self.events.first() {
            Some(first) if first.role == Role::System => &self.events[1..],
            _ => &self.events,
        }
    }

    /// Every `tool_call` with no matching `tool_result` later in the log.
    ///
    /// The scan runs backwards so that "later" covers results further down
    /// the same Event as well as any subsequent Event. Calls are returned in
    /// log order; a repeated unresolved id is reported once.
    #[must_use]
    pub fn unresolved_tool_calls(&self) -> Vec<&ToolCallSegment> {
        let mut answered: FxHashSet<&str> = FxHashSet::default();
        let mut reported: FxHashSet<&str> = FxHashSet::default();
        let mut unresolved = Vec::new();

        for event in self.events.iter().rev() {
            for segment in event.segments.iter().rev() {
                match segment {
                    Segment::ToolResult(result) => {
                        answered.insert(result.id.as_str());
                    }
                    Segment::ToolCall(call) if !answered.contains(call.id.as_str()) => {
                        if reported.insert(call.id.as_str()) {
                            unresolved.push(call);
                        } else {
                            tracing::warn!(
                                tool_call_id = %call.id,
                                "duplicate unresolved tool_call id"
                            );
                        }
                    }
                    _ => {}
                }
            }
        }

        unresolved.reverse();
        unresolved
    }

    /// Tool results with no matching call anywhere earlier in the log.
    #[must_use]
    pub fn orphan_tool_results(&self) -> Vec<&ToolResultSegment> {
        let mut seen_calls: FxHashSet<&str> = FxHashSet::default();
        let mut orphans = Vec::new();
        for event in &self.events {
            for segment in &event.segments {
                match segment {
                    Segment::ToolCall(call) => {
                        seen_calls.insert(call.id.as_str());
                    }
                    Segment::ToolResult(result) if !seen_calls.contains(result.id.as_str()) => {
                        orphans.push(result);
                    }
                    _ => {}
                }
            }
        }
        orphans
    }

    /// Logical timestamp for the next Event; never lower than the last one.
    #[must_use]
    pub fn next_ts(&self) -> u64 {
        let now = unix_now_millis();
        self.events
            .last()
            .map_or(now, |last| now.max(last.ts))
    }
}

impl From<Vec<Event>> for EventLog {
    fn from(events: Vec<Event>) -> Self {
        Self::from_events(events)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ToolResultSegment;
    use serde_json::{json, Map};

    fn call(id: &str) -> Segment {
        Segment::ToolCall(ToolCallSegment::new(id, "get_weather", Map::new()))
    }

    fn result(id: &str) -> Segment {
        Segment::ToolResult(ToolResultSegment {
            id: id.to_string(),
            output: json!({"ok": true}),
            error: None,
        })
    }

    fn event(role: Role, segments: Vec<Segment>) -> Event {
        let mut event = Event::new(role);
        event.segments = segments;
        event
    }

    #[test]
    fn test_unresolved_empty_when_result_follows() {
        let mut log = EventLog::new();
        log.push(event(Role::Assistant, vec![call("x")]));
        log.push(event(Role::Tool, vec![result("x")]));
        assert!(log.unresolved_tool_calls().is_empty());
    }

    #[test]
    fn test_unresolved_reports_call_without_result() {
        let mut log = EventLog::new();
        log.push(event(Role::Assistant, vec![call("x")]));
        log.push(event(Role::Tool, vec![]));
        let unresolved = log.unresolved_tool_calls();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].id, "x");
    }

    #[test]
    fn test_result_before_call_does_not_resolve_it() {
        let log = EventLog::from_events(vec![event(Role::Assistant, vec![result("x"), call("x")])]);
        assert_eq!(log.unresolved_tool_calls().len(), 1);
        assert_eq!(log.orphan_tool_results().len(), 1);
    }

    #[test]
    fn test_result_in_same_event_resolves() {
        let log = EventLog::from_events(vec![event(Role::Assistant, vec![call("x"), result("x")])]);
        assert!(log.unresolved_tool_calls().is_empty());
        assert!(log.orphan_tool_results().is_empty());
    }

    #[test]
    fn test_unresolved_preserves_log_order() {
        let log = EventLog::from_events(vec![
            event(Role::Assistant, vec![call("a"), call("b")]),
            event(Role::Tool, vec![result("a")]),
            event(Role::Assistant, vec![call("c")]),
        ]);
        let ids: Vec<_> = log
            .unresolved_tool_calls()
            .into_iter()
            .map(|call| call.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_system_prompt_only_from_leading_event() {
        let log = EventLog::from_events(vec![
            Event::text(Role::System, "Be brief."),
            Event::text(Role::User, "hi"),
        ]);
        assert_eq!(log.system_prompt().as_deref(), Some("Be brief."));
        assert_eq!(log.conversation_events().len(), 1);

        let no_system = EventLog::from_events(vec![Event::text(Role::User, "hi")]);
        assert!(no_system.system_prompt().is_none());
    }

    #[test]
    fn test_next_ts_is_non_decreasing() {
        let mut future = Event::text(Role::User, "hi");
        future.ts = u64::MAX - 1;
        let log = EventLog::from_events(vec![future]);
        assert_eq!(log.next_ts(), u64::MAX - 1);
    }

    #[test]
    fn test_serializes_as_array() {
        let log = EventLog::from_events(vec![Event::text(Role::User, "hi")]);
        let value = serde_json::to_value(&log).unwrap();
        assert!(value.is_array());
        let back: EventLog = serde_json::from_value(value).unwrap();
        assert_eq!(back, log);
    }
}
