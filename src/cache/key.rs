use super::MediaKind;
use md5::{Digest, Md5};

const VIDEO_SUFFIX: &str = "_video";

/// Derive the on-disk base name for `identifier` in the store of `kind`.
///
/// Video keys hash the identifier with a suffix so that the audio and video
/// entries of one source never share a name.
pub fn derive_key(identifier: &str, kind: MediaKind) -> String {
    let mut hasher = Md5::new();
    hasher.update(identifier.as_bytes());
    if kind == MediaKind::Video {
        hasher.update(VIDEO_SUFFIX.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_key_is_plain_md5() {
        // md5("hello")
        assert_eq!(
            derive_key("hello", MediaKind::Audio),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            derive_key("", MediaKind::Audio),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn video_key_hashes_suffixed_identifier() {
        let url = "https://video.example/watch?v=abc";
        assert_eq!(
            derive_key(url, MediaKind::Video),
            derive_key(&format!("{url}_video"), MediaKind::Audio)
        );
    }

    #[test]
    fn keys_are_stable_and_kind_separated() {
        let url = "https://video.example/watch?v=abc";
        let audio = derive_key(url, MediaKind::Audio);
        assert_eq!(audio, derive_key(url, MediaKind::Audio));
        assert_ne!(audio, derive_key(url, MediaKind::Video));
        assert_eq!(audio.len(), 32);
        assert!(audio.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
