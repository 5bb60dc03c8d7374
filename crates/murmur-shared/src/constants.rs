/// Application name
pub const APP_NAME: &str = "Murmur";

/// Route an unauthenticated visitor is sent to
pub const LOGIN_ROUTE: &str = "/auth/login";

/// Hard ceiling on a voice recording, in seconds
pub const MAX_RECORDING_SECS: u32 = 30;

/// Recorder timer period in milliseconds
pub const RECORDING_TICK_MS: u64 = 1_000;

/// How long the recorder shows an error before returning to idle
pub const ERROR_DISPLAY_MS: u64 = 3_000;

/// Capture chunk length in milliseconds
pub const CAPTURE_CHUNK_MS: u32 = 100;

/// Default capture sample rate (Hz)
pub const CAPTURE_SAMPLE_RATE: u32 = 44_100;

/// Synthetic progress: step added per tick (percent)
pub const PROGRESS_STEP: u8 = 10;

/// Synthetic progress: ceiling while encoding is still running (percent)
pub const PROGRESS_CAP: u8 = 90;

/// Synthetic progress: tick period in milliseconds
pub const PROGRESS_TICK_MS: u64 = 200;

/// Maximum attachment size in bytes (50 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 50 * 1024 * 1024;

/// Chunk size for content-addressed blob uploads (64 KiB)
pub const BLOB_CHUNK_SIZE: usize = 64 * 1024;

/// Capacity of each change-feed subscription queue
pub const FEED_QUEUE_CAPACITY: usize = 256;

/// Text prefix for document attachments
pub const DOCUMENT_PREFIX: &str = "📎";

/// Text prefix for voice messages
pub const VOICE_PREFIX: &str = "🎤";
