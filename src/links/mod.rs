//! Post link recognition
//!
//! A message is actionable when it contains a link to an Instagram post,
//! reel or IGTV video. Only the first such link in a message is used.

use std::sync::LazyLock;

use regex::Regex;

static INSTAGRAM_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:www\.)?instagram\.com/(?:p|reel|tv)/[\w-]+/?(?:\?\S*)?").unwrap()
});

/// First supported post link in `text`, exactly as written.
///
/// ```
/// use reelgrab::links::find_instagram_url;
///
/// let text = "look https://www.instagram.com/reel/Cx1abc_-9/ lol";
/// assert_eq!(find_instagram_url(text), Some("https://www.instagram.com/reel/Cx1abc_-9/"));
/// assert_eq!(find_instagram_url("no link here"), None);
/// ```
pub fn find_instagram_url(text: &str) -> Option<&str> {
    INSTAGRAM_LINK.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_reel_and_tv_paths() {
        for url in [
            "https://www.instagram.com/p/ABC123/",
            "https://www.instagram.com/reel/Cx-1_z/",
            "https://www.instagram.com/tv/B9xyz",
        ] {
            assert_eq!(find_instagram_url(url), Some(url));
        }
    }

    #[test]
    fn test_without_www_and_plain_http() {
        assert_eq!(
            find_instagram_url("http://instagram.com/p/abc"),
            Some("http://instagram.com/p/abc")
        );
    }

    #[test]
    fn test_query_string_kept() {
        let text = "https://www.instagram.com/reel/Cx1/?igsh=MTc4MmM1YmI2Ng== thanks";
        assert_eq!(
            find_instagram_url(text),
            Some("https://www.instagram.com/reel/Cx1/?igsh=MTc4MmM1YmI2Ng==")
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(
            find_instagram_url("HTTPS://WWW.INSTAGRAM.COM/REEL/Cx1/"),
            Some("HTTPS://WWW.INSTAGRAM.COM/REEL/Cx1/")
        );
    }

    #[test]
    fn test_embedded_in_text() {
        assert_eq!(
            find_instagram_url("watch this:https://instagram.com/p/xyz/ !!"),
            Some("https://instagram.com/p/xyz/")
        );
    }

    #[test]
    fn test_first_of_several() {
        let text = "https://instagram.com/p/first/ and https://instagram.com/reel/second/";
        assert_eq!(find_instagram_url(text), Some("https://instagram.com/p/first/"));
    }

    #[test]
    fn test_unsupported_links() {
        for text in [
            "",
            "hello",
            "https://www.instagram.com/stories/someone/123/",
            "https://www.instagram.com/someone/",
            "https://www.instagram.com/p/",
            "https://www.youtube.com/watch?v=abc",
            "https://notinstagram.com.evil/p/abc",
        ] {
            assert_eq!(find_instagram_url(text), None, "{text}");
        }
    }
}
