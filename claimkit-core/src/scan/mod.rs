//! Turning a stream of camera callbacks into stored credentials.
//!
//! [`ScanSession`] is the pure state machine: throttling, de-duplication, the
//! bound [`crate::fragment::FragmentCodec`], progress and stall detection.
//! [`Scanner`] wraps a session with envelope decoding and the credential store.

mod dedup;
mod scanner;
mod session;

pub use dedup::DedupWindow;
pub use scanner::{ScanEvent, Scanner};
pub use session::{DecodeOutcome, PendingDecode, ScanSession, ScanStatus, SessionState};
