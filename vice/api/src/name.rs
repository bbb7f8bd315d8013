use sha2::{Digest, Sha256};

/// The subdomain routing an ingress to exactly one analysis. Pure and
/// parameter-free so that retried launches derive identical names.
pub fn ingress_name(user_id: &str, external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(external_id.as_bytes());
    let hash = hasher.finalize();

    // leading "a" keeps the name a valid DNS label even when the digest
    // starts with a digit
    let mut name = format!("a{hash:x}");
    name.truncate(9);
    name
}

pub fn deployment_name(external_id: &str) -> String {
    format!("vice-{external_id}")
}

pub fn service_name(external_id: &str) -> String {
    format!("vice-{external_id}")
}

pub fn volume_name(external_id: &str) -> String {
    format!("csi-data-volume-{external_id}")
}

pub fn volume_handle(external_id: &str) -> String {
    format!("csi-data-volume-handle-{external_id}")
}

pub fn volume_claim_name(external_id: &str) -> String {
    format!("csi-data-volume-claim-{external_id}")
}

pub fn excludes_config_map_name(external_id: &str) -> String {
    format!("excludes-file-{external_id}")
}

pub fn input_paths_config_map_name(external_id: &str) -> String {
    format!("input-paths-{external_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingress_name_is_deterministic() {
        assert_eq!(
            ingress_name("user-a", "invocation-1"),
            ingress_name("user-a", "invocation-1"),
        );
    }

    #[test]
    fn ingress_name_distinguishes_pairs() {
        let names = [
            ingress_name("user-a", "invocation-1"),
            ingress_name("user-a", "invocation-2"),
            ingress_name("user-b", "invocation-1"),
            ingress_name("user-b", "invocation-2"),
        ];

        for (i, a) in names.iter().enumerate() {
            assert_eq!(a.len(), 9);
            assert!(a.starts_with('a'));
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
