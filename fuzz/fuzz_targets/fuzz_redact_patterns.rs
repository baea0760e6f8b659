#![no_main]

use libfuzzer_sys::fuzz_target;

use reelgrab::logging::redact::sanitize_log_message;

fuzz_target!(|data: &str| {
    // Fuzz the regex-based redaction with arbitrary strings. The primary
    // concern is pathological inputs that make the patterns slow; libFuzzer
    // reports timeouts (default: 1200ms per input).
    let sanitized = sanitize_log_message(data);

    // Redaction only ever rewrites matches, so secret-free input is untouched.
    if !data.contains(':') && !data.contains('=') {
        assert_eq!(sanitized, data);
    }
});
