//! Directed, pending/resolved request bus.

use crate::clock::{Clock, Timestamp};
use crate::types::{Request, RequestId, RequestStatus, SpeakerId, Value};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct RequestBus {
    pending: VecDeque<Request>,
    resolved: Vec<Request>,
    next_id: RequestId,
}

impl RequestBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        from: SpeakerId,
        to: SpeakerId,
        action: impl Into<String>,
        data: Option<Value>,
        expires_at: Option<Timestamp>,
        clock: &dyn Clock,
    ) -> Request {
        let request_id = self.next_id;
        self.next_id += 1;
        let request = Request {
            request_id,
            from_speaker: from,
            to_speaker: to,
            action: action.into(),
            data,
            status: RequestStatus::Pending,
            created_at: clock.now(),
            expires_at,
            response_data: None,
        };
        self.pending.push_back(request.clone());
        request
    }

    pub fn get(&self, request_id: RequestId) -> Option<Request> {
        self.pending
            .iter()
            .find(|r| r.request_id == request_id)
            .or_else(|| self.resolved.iter().find(|r| r.request_id == request_id))
            .cloned()
    }

    /// Fails if: no such request, the request is no longer pending, or the
    /// responder is not the request's target.
    pub fn respond(
        &mut self,
        request_id: RequestId,
        responder: SpeakerId,
        accept: bool,
        response_data: Option<Value>,
    ) -> Result<Request, RespondError> {
        let idx = self
            .pending
            .iter()
            .position(|r| r.request_id == request_id)
            .ok_or(RespondError::NotFound)?;

        if self.pending[idx].status != RequestStatus::Pending {
            return Err(RespondError::NotPending);
        }
        if self.pending[idx].to_speaker != responder {
            return Err(RespondError::NotTarget);
        }

        let mut request = self.pending.remove(idx).expect("index checked above");
        request.status = if accept {
            RequestStatus::Accepted
        } else {
            RequestStatus::Refused
        };
        request.response_data = response_data;
        self.resolved.push(request.clone());
        Ok(request)
    }

    pub fn pending_for(&self, speaker: SpeakerId) -> Vec<Request> {
        self.pending
            .iter()
            .filter(|r| r.to_speaker == speaker)
            .cloned()
            .collect()
    }

    pub fn pending_from(&self, speaker: SpeakerId) -> Vec<Request> {
        self.pending
            .iter()
            .filter(|r| r.from_speaker == speaker)
            .cloned()
            .collect()
    }

    /// Moves every pending request with `expires_at <= now` into resolved
    /// with status `Expired`. O(pending). Returns the expired set.
    pub fn check_timeouts(&mut self, clock: &dyn Clock) -> Vec<Request> {
        let now = clock.now();
        let mut expired = Vec::new();
        let mut remaining = VecDeque::new();
        for mut request in self.pending.drain(..) {
            if request.expires_at.map_or(false, |e| e <= now) {
                request.status = RequestStatus::Expired;
                expired.push(request.clone());
                self.resolved.push(request);
            } else {
                remaining.push_back(request);
            }
        }
        self.pending = remaining;
        expired
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondError {
    NotFound,
    NotPending,
    NotTarget,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;

    #[test]
    fn respond_requires_matching_target() {
        let mut bus = RequestBus::new();
        let clock = SimulatedClock::new();
        let req = bus.create(1, 2, "do-thing", None, None, &clock);
        let err = bus.respond(req.request_id, 99, true, None).unwrap_err();
        assert_eq!(err, RespondError::NotTarget);
    }

    #[test]
    fn respond_moves_pending_to_resolved() {
        let mut bus = RequestBus::new();
        let clock = SimulatedClock::new();
        let req = bus.create(1, 2, "do-thing", None, None, &clock);
        assert_eq!(bus.pending_for(2).len(), 1);
        bus.respond(req.request_id, 2, true, None).unwrap();
        assert_eq!(bus.pending_for(2).len(), 0);
        assert_eq!(bus.get(req.request_id).unwrap().status, RequestStatus::Accepted);
    }

    #[test]
    fn timeouts_expire_regardless_of_ordering() {
        let mut bus = RequestBus::new();
        let clock = SimulatedClock::new();
        bus.create(1, 2, "late", None, Some(0), &clock);
        bus.create(1, 2, "later", None, Some(100), &clock);
        let expired = bus.check_timeouts(&clock);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].action, "late");
        assert_eq!(bus.pending_for(2).len(), 1);
    }

    #[test]
    fn fifo_ordering_of_pending() {
        let mut bus = RequestBus::new();
        let clock = SimulatedClock::new();
        bus.create(1, 2, "first", None, None, &clock);
        bus.create(1, 2, "second", None, None, &clock);
        let pending = bus.pending_for(2);
        assert_eq!(pending[0].action, "first");
        assert_eq!(pending[1].action, "second");
    }
}
