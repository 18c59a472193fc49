use sha2::{Digest, Sha256};

pub const STORY_ID_PREFIX: &str = "story_";
/// Hex characters of the digest kept in a story id
pub const STORY_ID_HEX_LEN: usize = 16;

/// Describes everything besides membership that shapes a story.
///
/// Built from the clusterer's own fingerprint and the window length; cluster
/// labels and wall-clock time never enter it.
pub fn clustering_fingerprint(clusterer_fingerprint: &str, window_days: u32) -> String {
    format!("{};window_days={}", clusterer_fingerprint, window_days)
}

/// Deterministic story id from the member article ids.
///
/// The ids are sorted first, so member order does not matter.
pub fn generate_story_id<S: AsRef<str>>(article_ids: &[S], fingerprint: &str) -> String {
    let mut ids: Vec<&str> = article_ids.iter().map(|id| id.as_ref()).collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(ids.join("\n").as_bytes());
    hasher.update(b"\n");
    hasher.update(fingerprint.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{}{}", STORY_ID_PREFIX, &digest[..STORY_ID_HEX_LEN])
}
