//! The per-scan state machine.
//!
//! Camera callbacks arrive one at a time and are processed to completion, so a
//! session is driven through `&mut self` and needs no locking. The only
//! asynchronous step is envelope decoding after completion: the session hands
//! out a [`PendingDecode`] stamped with its current epoch, and a result that comes
//! back after a [`ScanSession::reset`] carries a stale epoch and is dropped.

use std::time::{Duration, Instant};

use crate::config::ScanConfig;
use crate::envelope::Envelope;
use crate::error::DecodeError;
use crate::fragment::{normalize, Family, FragmentCodec, FragmentParser};

use super::dedup::DedupWindow;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing observed yet.
    Idle,
    /// Text was observed but none of it bound a fragment family.
    Binding,
    /// A family is bound and fragments are being collected; progress in percent.
    Accumulating(u8),
    /// The payload is reassembled and waiting to be decoded.
    Complete,
    /// The session failed and must be reset.
    Errored,
}

/// A UI-facing snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStatus {
    /// Current state.
    pub state: SessionState,
    /// Progress in percent; never decreases while the session is active.
    pub progress: u8,
    /// Whether the scan looks stuck and the user may need guidance.
    pub stalled: bool,
    /// The bound family, once known.
    pub family: Option<Family>,
}

/// A completed payload awaiting envelope decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDecode {
    /// The session epoch this payload belongs to.
    pub epoch: u64,
    /// Reassembled compressed bytes.
    pub bytes: Vec<u8>,
}

/// What became of a decode result handed back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The envelope was accepted; the session has been reset for the next scan.
    Accepted(Envelope),
    /// The session was reset or moved on since the decode started; nothing changed.
    Stale,
    /// Decoding failed; the session is now errored.
    Failed(DecodeError),
}

/// One logical scan of a multi-part transfer.
#[derive(Debug)]
pub struct ScanSession {
    config: ScanConfig,
    parser: FragmentParser,
    codec: Option<FragmentCodec>,
    dedup: DedupWindow,
    state: SessionState,
    progress: u8,
    epoch: u64,
    ingested: usize,
    started_at: Option<Instant>,
    last_accepted_at: Option<Instant>,
    last_new_at: Option<Instant>,
    errored_at: Option<Instant>,
    last_error: Option<DecodeError>,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new(ScanConfig::default())
    }
}

impl ScanSession {
    /// Creates an idle session.
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        Self {
            parser: FragmentParser::new(&config.scheme),
            dedup: DedupWindow::new(config.dedup_window),
            config,
            codec: None,
            state: SessionState::Idle,
            progress: 0,
            epoch: 0,
            ingested: 0,
            started_at: None,
            last_accepted_at: None,
            last_new_at: None,
            errored_at: None,
            last_error: None,
        }
    }

    /// Processes one camera callback.
    ///
    /// Ignored outright: anything after completion or failure, anything within the
    /// cooldown of the previously accepted fragment, and fragments still in the
    /// dedup window. Text that is not a fragment is ignored once a family is bound;
    /// before that it moves the session to [`SessionState::Binding`].
    pub fn on_fragment_observed(&mut self, raw: &str, now: Instant) -> SessionState {
        if matches!(self.state, SessionState::Complete | SessionState::Errored) {
            return self.state;
        }

        if let Some(last) = self.last_accepted_at {
            if now.saturating_duration_since(last) < self.config.cooldown {
                return self.state;
            }
        }

        if self.dedup.contains(&normalize(raw)) {
            return self.state;
        }

        let fragment = match self.parser.parse(raw) {
            Ok(fragment) => fragment,
            Err(DecodeError::UnrecognizedFragment) => {
                if self.codec.is_none() {
                    log::trace!("scan did not classify as a fragment");
                    self.last_error = Some(DecodeError::UnrecognizedFragment);
                    self.state = SessionState::Binding;
                } else {
                    log::trace!("ignoring non-fragment scan in bound session");
                }
                return self.state;
            }
            Err(e) => return self.fail(e, now),
        };

        self.last_accepted_at = Some(now);
        self.dedup.insert(fragment.normalized());
        self.ingested += 1;

        let ingested = match self.codec.as_mut() {
            Some(codec) => codec.ingest(&fragment),
            None => FragmentCodec::bind(&fragment).map(|codec| {
                log::debug!("scan session bound to {} fragments", codec.family());
                self.started_at = Some(now);
                self.codec = Some(codec);
            }),
        };
        if let Err(e) = ingested {
            return self.fail(e, now);
        }

        self.last_new_at = Some(now);
        let Some(codec) = self.codec.as_ref() else {
            return self.state;
        };
        self.progress = self.progress.max(codec.progress());

        if codec.is_complete() {
            log::info!(
                "scan complete after {} fragments ({})",
                self.ingested,
                codec.family()
            );
            self.progress = 100;
            self.state = SessionState::Complete;
        } else {
            self.state = SessionState::Accumulating(self.progress);
        }
        self.state
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Progress in percent.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    /// Current epoch; advances on every reset.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of fragments handed to the codec in this session.
    #[must_use]
    pub const fn ingest_count(&self) -> usize {
        self.ingested
    }

    /// The most recent rejection or failure.
    #[must_use]
    pub const fn last_error(&self) -> Option<&DecodeError> {
        self.last_error.as_ref()
    }

    /// The bound family, if any.
    #[must_use]
    pub fn family(&self) -> Option<Family> {
        self.codec.as_ref().map(FragmentCodec::family)
    }

    /// Whether a partially complete session has gone quiet for too long or
    /// overrun its overall budget.
    #[must_use]
    pub fn is_stalled(&self, now: Instant) -> bool {
        if !matches!(self.state, SessionState::Accumulating(_))
            || !(1..100).contains(&self.progress)
        {
            return false;
        }
        let since = |at: Option<Instant>| {
            at.map_or(Duration::ZERO, |at| now.saturating_duration_since(at))
        };
        since(self.last_new_at) >= self.config.stall_after
            || since(self.started_at) >= self.config.session_budget
    }

    /// Snapshot for the UI.
    #[must_use]
    pub fn status(&self, now: Instant) -> ScanStatus {
        ScanStatus {
            state: self.state,
            progress: self.progress,
            stalled: self.is_stalled(now),
            family: self.family(),
        }
    }

    /// Whether an errored session has been shown long enough to be reset.
    #[must_use]
    pub fn should_reset(&self, now: Instant) -> bool {
        self.state == SessionState::Errored
            && self.errored_at.is_some_and(|at| {
                now.saturating_duration_since(at) >= self.config.error_reset_delay
            })
    }

    /// The reassembled payload, stamped with the current epoch.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NotReady`] unless the session is complete.
    pub fn completed_payload(&self) -> Result<PendingDecode, DecodeError> {
        match (&self.state, &self.codec) {
            (SessionState::Complete, Some(codec)) => Ok(PendingDecode {
                epoch: self.epoch,
                bytes: codec.extract_result()?,
            }),
            _ => Err(DecodeError::NotReady),
        }
    }

    /// Applies the result of decoding a [`PendingDecode`] from epoch `epoch`.
    pub fn resolve_decode(
        &mut self,
        epoch: u64,
        result: Result<Envelope, DecodeError>,
        now: Instant,
    ) -> DecodeOutcome {
        if epoch != self.epoch || self.state != SessionState::Complete {
            log::debug!(
                "dropping decode result from epoch {epoch}, session is at {}",
                self.epoch
            );
            return DecodeOutcome::Stale;
        }

        match result {
            Ok(envelope) => {
                self.reset();
                DecodeOutcome::Accepted(envelope)
            }
            Err(e) => {
                self.fail(e.clone(), now);
                DecodeOutcome::Failed(e)
            }
        }
    }

    /// Returns the session to [`SessionState::Idle`], discarding the codec, the
    /// dedup window and all timers. Safe to call in any state.
    pub fn reset(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.codec = None;
        self.dedup.clear();
        self.state = SessionState::Idle;
        self.progress = 0;
        self.ingested = 0;
        self.started_at = None;
        self.last_accepted_at = None;
        self.last_new_at = None;
        self.errored_at = None;
        self.last_error = None;
    }

    fn fail(&mut self, error: DecodeError, now: Instant) -> SessionState {
        log::warn!("scan session failed: {error}");
        self.last_error = Some(error);
        self.errored_at = Some(now);
        self.state = SessionState::Errored;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeDecoder;
    use crate::fragment::encode::legacy_fragments;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn transfer(jws: &str, part_size: usize) -> Vec<String> {
        let bytes = Envelope::new(jws, None).encode().unwrap();
        legacy_fragments("ur", "vc-envelope", &bytes, part_size).unwrap()
    }

    #[test]
    fn test_same_fragment_300_times_ingests_once() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();
        let fragment = "ur:bytes/1of3/aabbcc";

        for i in 0..300 {
            session.on_fragment_observed(fragment, t0 + ms(i * 40));
        }

        assert_eq!(session.ingest_count(), 1);
        assert_eq!(session.state(), SessionState::Accumulating(33));
    }

    #[test]
    fn test_case_and_whitespace_variants_are_duplicates() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();
        session.on_fragment_observed("ur:bytes/1of3/aabbcc", t0);
        session.on_fragment_observed(" UR:BYTES/1OF3/AABBCC\n", t0 + ms(500));
        assert_eq!(session.ingest_count(), 1);
    }

    #[test]
    fn test_cooldown_defers_second_fragment() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();

        session.on_fragment_observed("ur:bytes/1of3/aa", t0);
        session.on_fragment_observed("ur:bytes/2of3/bb", t0 + ms(50));
        assert_eq!(session.ingest_count(), 1);

        session.on_fragment_observed("ur:bytes/2of3/bb", t0 + ms(179));
        assert_eq!(session.ingest_count(), 1);

        session.on_fragment_observed("ur:bytes/2of3/bb", t0 + ms(180));
        assert_eq!(session.ingest_count(), 2);
        assert_eq!(session.progress(), 66);
    }

    #[test]
    fn test_unrecognized_before_binding() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();

        assert_eq!(session.on_fragment_observed("hello", t0), SessionState::Binding);
        assert_eq!(session.last_error(), Some(&DecodeError::UnrecognizedFragment));
        assert_eq!(session.family(), None);

        // Unrecognized text does not start the cooldown.
        let state = session.on_fragment_observed("ur:bytes/1of2/aa", t0 + ms(10));
        assert_eq!(state, SessionState::Accumulating(50));
        assert_eq!(session.family(), Some(Family::Legacy));

        // Once bound, stray text is ignored.
        let state = session.on_fragment_observed("https://example.org", t0 + ms(400));
        assert_eq!(state, SessionState::Accumulating(50));
    }

    #[test]
    fn test_family_cannot_change() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();
        session.on_fragment_observed("ur:bytes/1of2/aa", t0);
        let state = session.on_fragment_observed("ur:bytes/1-2/aa", t0 + ms(200));
        assert_eq!(state, SessionState::Errored);
        assert!(matches!(
            session.last_error(),
            Some(DecodeError::InvalidFragment { .. })
        ));
    }

    #[test]
    fn test_complete_then_decode_accepts_and_resets() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();
        let fragments = transfer("h.p.s", 8);

        let mut state = SessionState::Idle;
        for (i, raw) in fragments.iter().enumerate() {
            state = session.on_fragment_observed(raw, t0 + ms(200 * i as u64));
        }
        assert_eq!(state, SessionState::Complete);
        assert_eq!(session.progress(), 100);

        let pending = session.completed_payload().unwrap();
        let decoded = EnvelopeDecoder.decode(&pending.bytes);
        let outcome = session.resolve_decode(pending.epoch, decoded, t0 + ms(5000));

        assert_eq!(outcome, DecodeOutcome::Accepted(Envelope::new("h.p.s", None)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.epoch(), pending.epoch + 1);
    }

    #[test]
    fn test_stale_decode_after_reset_is_ignored() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();
        for (i, raw) in transfer("h.p.s", 64).iter().enumerate() {
            session.on_fragment_observed(raw, t0 + ms(200 * i as u64));
        }
        let pending = session.completed_payload().unwrap();

        session.reset();
        let outcome = session.resolve_decode(pending.epoch, Err(DecodeError::NotReady), t0);
        assert_eq!(outcome, DecodeOutcome::Stale);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_decode_failure_errors_and_resets_after_delay() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();
        session.on_fragment_observed("ur:bytes/1of1/ff", t0);
        assert_eq!(session.state(), SessionState::Complete);

        let pending = session.completed_payload().unwrap();
        let decoded = EnvelopeDecoder.decode(&pending.bytes);
        let outcome = session.resolve_decode(pending.epoch, decoded, t0);
        assert!(matches!(outcome, DecodeOutcome::Failed(DecodeError::InflateFailed(_))));
        assert_eq!(session.state(), SessionState::Errored);

        // Further scans are ignored while errored.
        assert_eq!(
            session.on_fragment_observed("ur:bytes/1of2/aa", t0 + ms(300)),
            SessionState::Errored
        );
        assert!(!session.should_reset(t0 + ms(899)));
        assert!(session.should_reset(t0 + ms(900)));

        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            session.on_fragment_observed("ur:bytes/1of2/aa", t0 + ms(1000)),
            SessionState::Accumulating(50)
        );
    }

    #[test]
    fn test_completed_payload_not_ready() {
        let mut session = ScanSession::default();
        assert_eq!(session.completed_payload(), Err(DecodeError::NotReady));
        session.on_fragment_observed("ur:bytes/1of2/aa", Instant::now());
        assert_eq!(session.completed_payload(), Err(DecodeError::NotReady));
    }

    #[test]
    fn test_stall_detection() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();
        session.on_fragment_observed("ur:bytes/1of4/aa", t0);

        assert!(!session.is_stalled(t0 + ms(2499)));
        assert!(session.is_stalled(t0 + ms(2500)));

        // A duplicate does not count as progress.
        session.on_fragment_observed("ur:bytes/1of4/aa", t0 + ms(2600));
        assert!(session.status(t0 + ms(2700)).stalled);

        // A new fragment clears the stall, the overall budget still applies.
        session.on_fragment_observed("ur:bytes/2of4/bb", t0 + ms(6000));
        assert!(!session.is_stalled(t0 + ms(6500)));
        assert!(session.is_stalled(t0 + ms(7000)));
    }

    #[test]
    fn test_idle_session_never_stalls() {
        let session = ScanSession::default();
        assert!(!session.is_stalled(Instant::now() + Duration::from_secs(60)));
    }

    #[test]
    fn test_reset_from_idle_is_safe() {
        let mut session = ScanSession::default();
        session.reset();
        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.epoch(), 2);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut session = ScanSession::default();
        let t0 = Instant::now();
        let mut last = 0;
        for (i, part) in [1, 1, 2, 2, 3, 4].iter().enumerate() {
            session.on_fragment_observed(
                &format!("ur:bytes/{part}of5/0{part}"),
                t0 + ms(200 * i as u64),
            );
            assert!(session.progress() >= last);
            last = session.progress();
        }
        assert_eq!(last, 80);
    }
}
