pub mod bridge;
pub mod browser;
pub mod comparator;
pub mod harness;
pub mod session;
pub mod store;
pub mod timing;
pub mod watcher;

// Re-export public types
pub use bridge::SpeechBridge;
pub use browser::{BrowserFactory, BrowserOptions, BrowserSession};
pub use comparator::{ConcurrencyVerdict, VerdictMode, attribute_shared_arrivals, compare};
pub use harness::{Harness, HarnessReport, SessionOutcome};
pub use session::{
    CallTally, PlaybackMode, SessionDriver, SessionReport, SessionState, StateBoard,
};
pub use store::TimingStore;
pub use timing::{PlaybackSource, SessionTimingLog, SpeechEvent, SpeechEventKind};
pub use watcher::{ArtifactArrival, ArtifactDirectory, WatchOutcome};
