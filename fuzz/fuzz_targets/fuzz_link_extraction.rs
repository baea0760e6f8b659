#![no_main]

use libfuzzer_sys::fuzz_target;

use reelgrab::links::find_instagram_url;

fuzz_target!(|data: &str| {
    // Message text is attacker-controlled. Extraction must never panic and
    // a match is always a slice of the input that is itself recognized.
    if let Some(url) = find_instagram_url(data) {
        assert!(data.contains(url));
        assert_eq!(find_instagram_url(url), Some(url));
        assert!(!url.chars().any(char::is_whitespace));
    }
});
