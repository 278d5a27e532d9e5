//! Constants for the chars/4-token heuristic.

/// Characters per token in the heuristic fallback. Consistent with
/// Anthropic's tokenizer for English prose; not exact for code or other
/// languages, which is exactly why it is flagged in telemetry (§4.1).
pub const CHARS_PER_TOKEN: u32 = 4;

/// Minimum tokens attributed to any image, regardless of estimated size.
pub const MIN_IMAGE_TOKENS: u32 = 85;

/// Default token estimate for URL-referenced images (~1024×1024).
pub const DEFAULT_URL_IMAGE_TOKENS: u32 = 1500;

/// Fixed per-message structural overhead (role tag + framing), in chars.
pub const MESSAGE_OVERHEAD_CHARS: usize = 10;
