use crate::error::{PreviewError, PreviewResult};

/// Accepts `word` when everything from its last `.` onwards equals one of
/// `extensions` (ASCII case-insensitive). Query strings and fragments are
/// not stripped, so `a.png?x=1` is rejected.
pub fn check_image_url<'a>(word: &'a str, extensions: &[String]) -> PreviewResult<&'a str> {
    let Some(dot) = word.rfind('.') else {
        return Err(PreviewError::UnsupportedTarget);
    };
    let suffix = &word[dot..];
    if extensions.iter().any(|ext| suffix.eq_ignore_ascii_case(ext)) {
        Ok(word)
    } else {
        Err(PreviewError::UnsupportedTarget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreviewConfig;

    fn accepts(word: &str) -> bool {
        check_image_url(word, &PreviewConfig::default().extensions).is_ok()
    }

    #[test]
    fn test_accepts_supported_suffixes() {
        assert!(accepts("https://example.com/cat.png"));
        assert!(accepts("https://example.com/cat.jpg"));
        assert!(accepts("https://example.com/CAT.JPG"));
        assert!(accepts("http://x/y.PnG"));
    }

    #[test]
    fn test_rejects_everything_else() {
        assert!(!accepts("https://example.com/cat"));
        assert!(!accepts("https://example.com/cat.gif"));
        assert!(!accepts("https://example.com/cat.jpeg"));
        assert!(!accepts("https://example.com/cat.png?size=large"));
        assert!(!accepts("https://example.com/cat.png/"));
        assert!(!accepts("hello"));
        assert!(!accepts(""));
    }
}
