//! Default configuration constants for stockhand.
//!
//! Shared constants used across configuration types to ensure consistency
//! and eliminate duplication.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and is what the streaming
/// recognition backend expects for PCM input.
pub const SAMPLE_RATE: u32 = 16000;

/// Default bind address for the WebSocket server.
pub const BIND_ADDR: &str = "127.0.0.1:8090";

/// Capacity of the per-session audio forwarding channel, in frames.
///
/// The relay applies backpressure once this window fills; frames are never
/// dropped, the client-facing read loop simply slows down.
pub const AUDIO_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the per-session transcript event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the per-session outbound message channel.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 32;

/// How long a proposed command waits for confirmation before expiring.
pub const CONFIRMATION_WINDOW: Duration = Duration::from_secs(30);

/// Bounded wait for the recognition backend's final flush after
/// end-of-audio before the session hard-closes the exchange.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default model name for the command-interpretation service.
pub const LLM_MODEL: &str = "gpt-4o-mini";

/// Number of resolved command ids remembered per session for stale
/// confirmation detection.
pub const RESOLVED_COMMAND_MEMORY: usize = 32;
