//! Correlation of outgoing requests with their responses.
//!
//! [`RequestTracker`] owns every request that reached the transport and has
//! not been resolved yet. An entry leaves the table exactly once: through a
//! matching response, its deadline, or a bulk drain when the connection is
//! lost or the session closes. What "resolving" means is up to the owner; the
//! tracker only hands the completion back.

use crate::error::DocLinkError;
use crate::models::Request;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// A request that was written to the transport and awaits its response.
#[derive(Debug)]
pub(crate) struct PendingRequest<C> {
    pub request_id: String,
    pub completion: C,
    pub issued_at: Instant,
    /// `None` waits forever
    pub timeout_at: Option<Instant>,
    seq: u64,
}

#[derive(Debug)]
pub(crate) struct RequestTracker<C> {
    pending: HashMap<String, PendingRequest<C>>,
    next_seq: u64,
}

impl<C> Default for RequestTracker<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RequestTracker<C> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Serialize `request`, hand the frame to `write` and track it.
    ///
    /// The request must already carry its id. On failure the completion is
    /// handed back untouched so the caller can resolve it with the error.
    pub fn send<W>(
        &mut self,
        request: &Request,
        completion: C,
        timeout: Option<Duration>,
        now: Instant,
        write: W,
    ) -> Result<(), (DocLinkError, C)>
    where
        W: FnOnce(Bytes) -> crate::error::Result<()>,
    {
        if request.request_id.is_empty() {
            return Err((
                DocLinkError::InvalidRequest("Request has no id".to_string()),
                completion,
            ));
        }
        if self.pending.contains_key(&request.request_id) {
            return Err((
                DocLinkError::InvalidRequest(format!(
                    "Request id '{}' is already in flight",
                    request.request_id
                )),
                completion,
            ));
        }

        let frame = match request.to_frame() {
            Ok(frame) => Bytes::from(frame),
            Err(e) => return Err((e.into(), completion)),
        };
        if let Err(e) = write(frame) {
            return Err((e, completion));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            request.request_id.clone(),
            PendingRequest {
                request_id: request.request_id.clone(),
                completion,
                issued_at: now,
                timeout_at: timeout.map(|d| now + d),
                seq,
            },
        );
        Ok(())
    }

    /// Remove and return the entry matching a response.
    ///
    /// `None` means the response is late (already timed out) or unsolicited.
    pub fn resolve(&mut self, request_id: &str) -> Option<PendingRequest<C>> {
        self.pending.remove(request_id)
    }

    /// Remove every entry whose deadline is at or before `now`, oldest deadline first.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingRequest<C>> {
        let expired: Vec<String> = self
            .pending
            .values()
            .filter(|p| p.timeout_at.map_or(false, |at| at <= now))
            .map(|p| p.request_id.clone())
            .collect();
        let mut out: Vec<PendingRequest<C>> = expired
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .collect();
        out.sort_by_key(|p| (p.timeout_at, p.seq));
        out
    }

    /// Remove every entry, in send order.
    pub fn drain(&mut self) -> Vec<PendingRequest<C>> {
        let mut out: Vec<PendingRequest<C>> = self.pending.drain().map(|(_, p)| p).collect();
        out.sort_by_key(|p| p.seq);
        out
    }

    /// Earliest deadline among tracked requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().filter_map(|p| p.timeout_at).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::cell::RefCell;

    fn request(id: &str) -> Request {
        let mut request = Request::new("document", "get");
        request.request_id = id.to_string();
        request
    }

    fn ok_write(_: Bytes) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_send_writes_frame_and_tracks() {
        let mut tracker = RequestTracker::new();
        let written = RefCell::new(Vec::new());
        let now = Instant::now();
        tracker
            .send(&request("r1"), 1u8, None, now, |frame| {
                written.borrow_mut().push(frame);
                Ok(())
            })
            .unwrap();
        assert_eq!(tracker.len(), 1);
        let frame = written.borrow()[0].clone();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["requestId"], "r1");
    }

    #[test]
    fn test_duplicate_id_is_rejected_without_writing() {
        let mut tracker = RequestTracker::new();
        let now = Instant::now();
        tracker.send(&request("r1"), 1u8, None, now, ok_write).unwrap();

        let mut wrote = false;
        let (err, completion) = tracker
            .send(&request("r1"), 2u8, None, now, |_| {
                wrote = true;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, DocLinkError::InvalidRequest(_)));
        assert_eq!(completion, 2);
        assert!(!wrote);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_write_failure_returns_completion() {
        let mut tracker: RequestTracker<u8> = RequestTracker::new();
        let (err, completion) = tracker
            .send(&request("r1"), 7, None, Instant::now(), |_| {
                Err(DocLinkError::TransportError("broken pipe".into()))
            })
            .unwrap_err();
        assert_eq!(err, DocLinkError::TransportError("broken pipe".into()));
        assert_eq!(completion, 7);
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn test_resolve_exactly_once() {
        let mut tracker = RequestTracker::new();
        tracker
            .send(&request("r1"), "a", None, Instant::now(), ok_write)
            .unwrap();
        assert_eq!(tracker.resolve("r1").map(|p| p.completion), Some("a"));
        assert!(tracker.resolve("r1").is_none());
    }

    #[test]
    fn test_expire_then_late_response_is_unknown() {
        let mut tracker = RequestTracker::new();
        let now = Instant::now();
        tracker
            .send(&request("slow"), 1u8, Some(Duration::from_secs(5)), now, ok_write)
            .unwrap();
        tracker
            .send(&request("fast"), 2u8, Some(Duration::from_secs(1)), now, ok_write)
            .unwrap();
        tracker.send(&request("forever"), 3u8, None, now, ok_write).unwrap();

        assert_eq!(tracker.next_deadline(), Some(now + Duration::from_secs(1)));
        assert!(tracker.expire(now).is_empty());

        let expired = tracker.expire(now + Duration::from_secs(10));
        let ids: Vec<_> = expired.iter().map(|p| p.request_id.as_str()).collect();
        assert_eq!(ids, vec!["fast", "slow"]);
        assert!(tracker.resolve("slow").is_none());
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.next_deadline(), None);
        assert_eq!(tracker.resolve("forever").map(|p| p.completion), Some(3));
    }

    #[test]
    fn test_drain_preserves_send_order() {
        let mut tracker = RequestTracker::new();
        let now = Instant::now();
        for id in ["c", "a", "b"] {
            tracker.send(&request(id), id, None, now, ok_write).unwrap();
        }
        let order: Vec<_> = tracker.drain().into_iter().map(|p| p.completion).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(tracker.len(), 0);
    }
}
