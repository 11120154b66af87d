//! Response-correlation policies.
//!
//! A policy decides which inbound message types count as replies to a
//! request, and how many replies make the request complete. The transport
//! owns one [`ResponseTracker`] per outstanding request and consults it after
//! every classified reply.
//!
//! # Example
//!
//! ```
//! use photons_protocol::messages::{message, MessageType};
//! use photons_protocol::multi::{Expected, Max, MultiOptions, ResponseTracker};
//! use photons_protocol::protocol::Packet;
//!
//! let get = message(707, [])
//!     .unwrap()
//!     .with_multi(MultiOptions::new(
//!         |_: &Packet, kind: &MessageType| kind.pkt_type() == 711,
//!         Max::new(5).adjuster(),
//!     ))
//!     .build("Get");
//! let state = message(711, []).unwrap().build("State");
//!
//! let mut tracker = ResponseTracker::new(get.create(), &get);
//! assert!(tracker.accepts(&state));
//! for _ in 0..4 {
//!     assert_eq!(tracker.record(state.create()), Expected::Unknown);
//! }
//! assert_eq!(tracker.record(state.create()), Expected::Exactly(5));
//! assert!(tracker.is_complete());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::messages::MessageType;
use crate::protocol::Packet;

/// How many replies a request expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// Not known yet; keep waiting.
    Unknown,
    /// The authoritative total.
    Exactly(usize),
}

impl Expected {
    /// Integer form: `-1` for unknown, otherwise the total.
    pub fn as_sentinel(&self) -> i64 {
        match self {
            Expected::Unknown => -1,
            Expected::Exactly(n) => i64::try_from(*n).unwrap_or(i64::MAX),
        }
    }

    /// Check if the total is known.
    #[inline]
    pub fn is_known(&self) -> bool {
        matches!(self, Expected::Exactly(_))
    }
}

/// Strategy pair attached to a message type.
pub trait ResponsePolicy: Send + Sync {
    /// Whether replies of type `kind` count as responses to `request`.
    fn determine_res_packet(&self, request: &Packet, kind: &MessageType) -> bool;

    /// Expected total given the replies seen so far, in arrival order.
    fn adjust_expected_number(&self, request: &Packet, responses: &[Packet]) -> Expected;
}

/// A policy built from two closures.
///
/// Both closures are required by construction.
pub struct MultiOptions<D, A> {
    determine: D,
    adjust: A,
}

impl<D, A> MultiOptions<D, A>
where
    D: Fn(&Packet, &MessageType) -> bool + Send + Sync,
    A: Fn(&Packet, &[Packet]) -> Expected + Send + Sync,
{
    /// Pair a response selector with a response counter.
    pub fn new(determine: D, adjust: A) -> Self {
        Self { determine, adjust }
    }
}

impl<D, A> ResponsePolicy for MultiOptions<D, A>
where
    D: Fn(&Packet, &MessageType) -> bool + Send + Sync,
    A: Fn(&Packet, &[Packet]) -> Expected + Send + Sync,
{
    fn determine_res_packet(&self, request: &Packet, kind: &MessageType) -> bool {
        (self.determine)(request, kind)
    }

    fn adjust_expected_number(&self, request: &Packet, responses: &[Packet]) -> Expected {
        (self.adjust)(request, responses)
    }
}

impl<D, A> fmt::Debug for MultiOptions<D, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiOptions").finish_non_exhaustive()
    }
}

/// Lower bound on the number of replies.
///
/// Unknown while fewer than `n` replies were seen; afterwards the number
/// actually seen, even past `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Max(pub usize);

impl Max {
    /// Expect at least `n` replies.
    pub const fn new(n: usize) -> Self {
        Self(n)
    }

    /// Expected total after `seen` replies.
    pub fn expected(&self, seen: usize) -> Expected {
        if seen < self.0 {
            Expected::Unknown
        } else {
            Expected::Exactly(seen)
        }
    }

    /// This bound as a counting closure for [`MultiOptions`].
    pub fn adjuster(self) -> impl Fn(&Packet, &[Packet]) -> Expected + Send + Sync {
        move |_, responses| self.expected(responses.len())
    }
}

/// Default policy: any non-acknowledgement reply counts, one is expected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Single;

impl ResponsePolicy for Single {
    fn determine_res_packet(&self, _request: &Packet, kind: &MessageType) -> bool {
        !kind.represents_ack()
    }

    fn adjust_expected_number(&self, _request: &Packet, _responses: &[Packet]) -> Expected {
        Expected::Exactly(1)
    }
}

/// Response-expectation state for one outstanding request.
///
/// Not synchronised; the owning request context serialises updates.
pub struct ResponseTracker {
    request: Packet,
    policy: Arc<dyn ResponsePolicy>,
    responses: Vec<Packet>,
    expected: Expected,
}

impl ResponseTracker {
    /// Track `request`, using the policy of its message type or [`Single`].
    pub fn new(request: Packet, kind: &MessageType) -> Self {
        let policy = kind
            .multi()
            .cloned()
            .unwrap_or_else(|| Arc::new(Single) as Arc<dyn ResponsePolicy>);
        Self::with_policy(request, policy)
    }

    /// Track `request` with an explicit policy.
    pub fn with_policy(request: Packet, policy: Arc<dyn ResponsePolicy>) -> Self {
        let expected = policy.adjust_expected_number(&request, &[]);
        Self {
            request,
            policy,
            responses: Vec::new(),
            expected,
        }
    }

    /// The tracked request.
    #[inline]
    pub fn request(&self) -> &Packet {
        &self.request
    }

    /// Replies recorded so far.
    #[inline]
    pub fn responses(&self) -> &[Packet] {
        &self.responses
    }

    /// Current expected total.
    #[inline]
    pub fn expected(&self) -> Expected {
        self.expected
    }

    /// Whether replies of type `kind` count for this request.
    pub fn accepts(&self, kind: &MessageType) -> bool {
        self.policy.determine_res_packet(&self.request, kind)
    }

    /// Record a reply and re-evaluate the expected total.
    pub fn record(&mut self, response: Packet) -> Expected {
        self.responses.push(response);
        self.expected = self
            .policy
            .adjust_expected_number(&self.request, &self.responses);
        tracing::trace!(
            "Request {}/{} has {} responses, expecting {:?}",
            self.request.header.source,
            self.request.header.sequence,
            self.responses.len(),
            self.expected
        );
        self.expected
    }

    /// Check if the expected total is known and reached.
    pub fn is_complete(&self) -> bool {
        match self.expected {
            Expected::Exactly(n) => self.responses.len() >= n,
            Expected::Unknown => false,
        }
    }
}

impl fmt::Debug for ResponseTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseTracker")
            .field("pkt_type", &self.request.pkt_type())
            .field("responses", &self.responses.len())
            .field("expected", &self.expected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::message;

    #[test]
    fn test_max_lower_bound() {
        let max = Max::new(5);
        assert_eq!(max.expected(1), Expected::Unknown);
        assert_eq!(max.expected(4), Expected::Unknown);
        assert_eq!(max.expected(5), Expected::Exactly(5));
        assert_eq!(max.expected(6), Expected::Exactly(6));
    }

    #[test]
    fn test_sentinel() {
        assert_eq!(Expected::Unknown.as_sentinel(), -1);
        assert_eq!(Expected::Exactly(3).as_sentinel(), 3);
        assert!(!Expected::Unknown.is_known());
    }

    #[test]
    fn test_single_is_default() {
        let get = message(20, []).unwrap().build("GetPower");
        let state = message(22, []).unwrap().build("StatePower");
        let ack = message(45, []).unwrap().build("Acknowledgement");

        let mut tracker = ResponseTracker::new(get.create(), &get);
        assert_eq!(tracker.expected(), Expected::Exactly(1));
        assert!(!tracker.is_complete());
        assert!(tracker.accepts(&state));
        assert!(!tracker.accepts(&ack));

        tracker.record(state.create());
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_policy_sees_request() {
        let get = message(1, [crate::codec::Field::new(
            "length",
            crate::codec::FieldType::uint8(),
        )])
        .unwrap()
        .build("Get");
        let policy = MultiOptions::new(
            |_: &Packet, _: &MessageType| true,
            |request: &Packet, responses: &[Packet]| {
                let length = request
                    .get("length")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1) as usize;
                Max::new(length).expected(responses.len())
            },
        );

        let request = get.create().with("length", 2u8).unwrap();
        let mut tracker = ResponseTracker::with_policy(request, Arc::new(policy));
        assert_eq!(tracker.record(get.create()), Expected::Unknown);
        assert_eq!(tracker.record(get.create()), Expected::Exactly(2));
        assert_eq!(tracker.responses().len(), 2);
    }

    #[test]
    fn test_max_adjuster() {
        let kind = message(1, []).unwrap().build("Get");
        let policy = MultiOptions::new(
            |_: &Packet, _: &MessageType| true,
            Max::new(2).adjuster(),
        );
        let mut tracker = ResponseTracker::with_policy(kind.create(), Arc::new(policy));
        assert_eq!(tracker.expected(), Expected::Unknown);
        tracker.record(kind.create());
        assert!(!tracker.is_complete());
        tracker.record(kind.create());
        assert!(tracker.is_complete());
    }
}
