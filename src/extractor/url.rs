//! URL classification and normalization
//!
//! Pure functions: malformed input never panics, validators answer `false`
//! and rewriters hand the input back unchanged.

use crate::utils::error::RavenError;
use url::Url;

/// YouTube's short-link host
pub const SHORT_LINK_HOST: &str = "youtu.be";

const PLAYLIST_BASE: &str = "https://www.youtube.com/playlist";
const WATCH_BASE: &str = "https://www.youtube.com/watch";

/// What the caller asked to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitKind {
    #[default]
    Video,
    Playlist,
}

/// Parse an http(s) URL with a non-empty host
fn parse_web_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Some(parsed),
        _ => None,
    }
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

/// Accepts http/https URLs with a host. YouTube hosts additionally need a
/// `v` parameter, except the short-link host which only needs a path.
pub fn is_valid_url(url: &str) -> bool {
    let Some(parsed) = parse_web_url(url) else {
        return false;
    };
    let host = host_of(&parsed);

    if host == SHORT_LINK_HOST {
        return !parsed.path().trim_matches('/').is_empty();
    }
    if host.contains("youtube") {
        return query_value(&parsed, "v").is_some();
    }
    true
}

/// True iff the query carries a non-empty `list` parameter
pub fn is_playlist_url(url: &str) -> bool {
    parse_web_url(url)
        .and_then(|u| query_value(&u, "list"))
        .is_some()
}

/// Rewrite to `https://www.youtube.com/playlist?list=<id>`, dropping every
/// other parameter. Idempotent.
pub fn extract_playlist_url(url: &str) -> String {
    let Some(list) = parse_web_url(url).and_then(|u| query_value(&u, "list")) else {
        return url.to_string();
    };
    with_single_param(PLAYLIST_BASE, "list", &list).unwrap_or_else(|| url.to_string())
}

/// Rewrite to `https://www.youtube.com/watch?v=<id>`, dropping every other
/// parameter. Short links are returned unchanged.
pub fn extract_single_video_url(url: &str) -> String {
    let Some(parsed) = parse_web_url(url) else {
        return url.to_string();
    };
    if host_of(&parsed) == SHORT_LINK_HOST {
        return url.to_string();
    }
    match query_value(&parsed, "v") {
        Some(v) => with_single_param(WATCH_BASE, "v", &v).unwrap_or_else(|| url.to_string()),
        None => url.to_string(),
    }
}

fn with_single_param(base: &str, key: &str, value: &str) -> Option<String> {
    let mut out = Url::parse(base).ok()?;
    out.query_pairs_mut().clear().append_pair(key, value);
    Some(out.into())
}

/// Platform name for user-facing messages
pub fn platform_name(url: &str) -> &'static str {
    const PLATFORMS: &[(&[&str], &str)] = &[
        (&["youtube.com", "youtu.be", "yotu.be"], "YouTube"),
        (&["vimeo.com"], "Vimeo"),
        (&["dailymotion.com", "dai.ly"], "Dailymotion"),
        (&["twitch.tv"], "Twitch"),
        (&["facebook.com", "fb.watch", "fb.com"], "Facebook"),
        (&["instagram.com", "instagr.am"], "Instagram"),
        (&["twitter.com", "x.com", "t.co"], "Twitter"),
        (&["tiktok.com"], "TikTok"),
        (&["soundcloud.com", "snd.sc"], "SoundCloud"),
        (&["reddit.com", "redd.it"], "Reddit"),
        (&["bilibili.com", "b23.tv"], "Bilibili"),
    ];

    let Some(host) = parse_web_url(url).map(|u| host_of(&u)) else {
        return "Unknown";
    };

    PLATFORMS
        .iter()
        .find(|(domains, _)| {
            domains
                .iter()
                .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
        })
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// Validate a submission and return the URL to hand to the provider.
pub fn classify_submission(url: &str, kind: SubmitKind) -> Result<String, RavenError> {
    let url = url.trim();
    match kind {
        SubmitKind::Video => {
            if !is_valid_url(url) {
                return Err(RavenError::InvalidUrl(url.to_string()));
            }
            if is_playlist_url(url) {
                Ok(extract_single_video_url(url))
            } else {
                Ok(url.to_string())
            }
        }
        SubmitKind::Playlist => {
            if parse_web_url(url).is_none() {
                return Err(RavenError::InvalidUrl(url.to_string()));
            }
            if !is_playlist_url(url) {
                return Err(RavenError::InvalidUrl(format!(
                    "not a playlist URL for {}: {}",
                    platform_name(url),
                    url
                )));
            }
            Ok(extract_playlist_url(url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_urls() {
        assert!(is_valid_url("https://www.youtube.com/watch?v=abc123"));
        assert!(is_valid_url("http://m.youtube.com/watch?feature=share&v=abc123"));
        assert!(is_valid_url("https://youtu.be/abc123"));
        assert!(is_valid_url("https://vimeo.com/123456"));
    }

    #[test]
    fn test_invalid_urls() {
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("www.youtube.com/watch?v=abc"));
        assert!(!is_valid_url("ftp://example.com/file"));
        assert!(!is_valid_url("https://www.youtube.com/watch"));
        assert!(!is_valid_url("https://www.youtube.com/watch?v="));
        assert!(!is_valid_url("https://www.youtube.com/playlist?list=PL1"));
        assert!(!is_valid_url("https://youtu.be/"));
        assert!(!is_valid_url("not a url"));
    }

    #[test]
    fn test_playlist_detection() {
        assert!(is_playlist_url("https://www.youtube.com/watch?v=a&list=PL1"));
        assert!(is_playlist_url("https://www.youtube.com/playlist?list=PL1"));
        assert!(!is_playlist_url("https://www.youtube.com/watch?v=a&list="));
        assert!(!is_playlist_url("https://www.youtube.com/watch?v=a"));
        assert!(!is_playlist_url("garbage"));
    }

    #[test]
    fn test_extract_playlist_url() {
        assert_eq!(
            extract_playlist_url("https://www.youtube.com/watch?v=a&list=PL1&index=3"),
            "https://www.youtube.com/playlist?list=PL1"
        );
        assert_eq!(
            extract_playlist_url("https://www.youtube.com/watch?v=a"),
            "https://www.youtube.com/watch?v=a"
        );
        assert_eq!(extract_playlist_url("::bad::"), "::bad::");
    }

    #[test]
    fn test_extract_single_video_url() {
        assert_eq!(
            extract_single_video_url("https://www.youtube.com/watch?list=PL1&v=abc&t=10"),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(
            extract_single_video_url("https://youtu.be/abc?list=PL1"),
            "https://youtu.be/abc?list=PL1"
        );
        assert_eq!(
            extract_single_video_url("https://www.youtube.com/playlist?list=PL1"),
            "https://www.youtube.com/playlist?list=PL1"
        );
    }

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name("https://m.youtube.com/watch?v=a"), "YouTube");
        assert_eq!(platform_name("https://vimeo.com/1"), "Vimeo");
        assert_eq!(platform_name("https://example.com/"), "Unknown");
        assert_eq!(platform_name("nope"), "Unknown");
    }

    #[test]
    fn test_classify_submission() {
        assert_eq!(
            classify_submission(" https://www.youtube.com/watch?v=abc&list=PL1 ", SubmitKind::Video)
                .unwrap(),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(
            classify_submission("https://www.youtube.com/watch?v=abc&list=PL1", SubmitKind::Playlist)
                .unwrap(),
            "https://www.youtube.com/playlist?list=PL1"
        );
        assert!(matches!(
            classify_submission("https://www.youtube.com/watch?v=abc", SubmitKind::Playlist),
            Err(RavenError::InvalidUrl(_))
        ));
        assert!(classify_submission("https://www.youtube.com/", SubmitKind::Video).is_err());
    }

    proptest! {
        #[test]
        fn playlist_rewrite_is_idempotent(
            list in "[A-Za-z0-9_-]{1,34}",
            v in "[A-Za-z0-9_-]{0,11}",
            extra in "[a-z]{0,6}",
        ) {
            let url = format!("https://www.youtube.com/watch?v={}&list={}&x={}", v, list, extra);
            let once = extract_playlist_url(&url);
            prop_assert_eq!(extract_playlist_url(&once), once.clone());
            prop_assert!(is_playlist_url(&once));
        }

        #[test]
        fn arbitrary_input_never_panics(s in ".*") {
            let _ = is_valid_url(&s);
            let _ = is_playlist_url(&s);
            let _ = extract_playlist_url(&s);
            let _ = extract_single_video_url(&s);
        }

        #[test]
        fn watch_urls_with_id_are_valid(v in "[A-Za-z0-9_-]{1,11}") {
            let url = format!("https://www.youtube.com/watch?v={}", v);
            prop_assert!(is_valid_url(&url));
        }
    }
}
