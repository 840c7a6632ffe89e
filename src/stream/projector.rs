use super::envelope::Envelope;
use crate::event::{Event, Segment};

/// Projects successive builder snapshots of one Event into envelopes.
///
/// The first snapshot produces `event_start`; later snapshots produce one
/// `segment` envelope per index whose content changed or is new.
#[derive(Debug, Default)]
pub struct EnvelopeProjector {
    event_id: Option<String>,
    last: Vec<Segment>,
}

impl EnvelopeProjector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current_event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    fn start_into(&mut self, snapshot: &Event, out: &mut Vec<Envelope>) {
        self.event_id = Some(snapshot.id.clone());
        self.last = snapshot.segments.clone();
        out.push(Envelope::event_start(snapshot.clone()));
    }

    /// Append the envelopes needed to move the client to `snapshot`.
    pub fn project_into(&mut self, snapshot: &Event, out: &mut Vec<Envelope>) {
        if self.event_id.as_deref() != Some(snapshot.id.as_str()) {
            self.start_into(snapshot, out);
            return;
        }
        for (index, segment) in snapshot.segments.iter().enumerate() {
            if self.last.get(index) != Some(segment) {
                out.push(Envelope::segment(&snapshot.id, index, segment.clone()));
            }
        }
        self.last.clone_from(&snapshot.segments);
    }

    #[must_use]
    pub fn project(&mut self, snapshot: &Event) -> Vec<Envelope> {
        let mut out = Vec::new();
        self.project_into(snapshot, &mut out);
        out
    }

    /// Close the current Event. Emits `event_start` first if the Event was
    /// never projected.
    pub fn complete_into(&mut self, event: &Event, out: &mut Vec<Envelope>) {
        if self.event_id.as_deref() != Some(event.id.as_str()) {
            let shell = Event {
                segments: Vec::new(),
                ..event.clone()
            };
            out.push(Envelope::event_start(shell));
        }
        out.push(Envelope::event_complete(event.clone()));
        self.event_id = None;
        self.last.clear();
    }

    #[must_use]
    pub fn complete(&mut self, event: &Event) -> Vec<Envelope> {
        let mut out = Vec::new();
        self.complete_into(event, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Role;
    use crate::stream::envelope::EnvelopeKind;

    #[test]
    fn test_first_snapshot_starts_event() {
        let mut projector = EnvelopeProjector::new();
        let event = Event::with_id("evt_1", Role::Assistant, 1);
        let envelopes = projector.project(&event);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].kind_name(), "event_start");
        assert_eq!(projector.current_event_id(), Some("evt_1"));
    }

    #[test]
    fn test_only_changed_segments_are_sent() {
        let mut projector = EnvelopeProjector::new();
        let mut event = Event::with_id("evt_1", Role::Assistant, 1);
        event.segments.push(Segment::text("Let me"));
        let _ = projector.project(&event);

        event.segments[0] = Segment::text("Let me check.");
        event.segments.push(Segment::text("more"));
        let envelopes = projector.project(&event);
        let indices: Vec<usize> = envelopes
            .iter()
            .filter_map(|e| match &e.kind {
                EnvelopeKind::Segment { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 1]);

        assert!(projector.project(&event).is_empty());
    }

    #[test]
    fn test_complete_without_start_emits_shell() {
        let mut projector = EnvelopeProjector::new();
        let event = Event::text(Role::Assistant, "done");
        let envelopes = projector.complete(&event);
        assert_eq!(envelopes.len(), 2);
        assert!(matches!(&envelopes[0].kind, EnvelopeKind::EventStart { event: e } if e.segments.is_empty()));
        assert_eq!(envelopes[1].kind_name(), "event_complete");
        assert!(projector.current_event_id().is_none());
    }
}
