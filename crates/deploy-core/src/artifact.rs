use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Object-store access handed to the fetcher tool inside the job script.
/// The engine never talks to the store itself.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactStore {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    /// Where nodes download the fetcher tool from.
    #[serde(default)]
    pub fetcher_url: String,
}

impl ArtifactStore {
    /// Environment variables the fetcher reads.
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("GOCD_S3_AK".to_string(), self.access_key.clone()),
            ("GOCD_S3_SK".to_string(), self.secret_key.clone()),
            ("GOCD_S3_ENDPOINT".to_string(), self.endpoint.clone()),
            ("GOCD_S3_BUCKET".to_string(), self.bucket.clone()),
            ("GOCD_S3_REGION".to_string(), self.region.clone()),
        ])
    }

    /// `env_vars()` as one `KEY=VALUE KEY=VALUE` string, ready for `export`.
    pub fn env_blob(&self) -> String {
        env_blob(&self.env_vars())
    }
}

impl fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("fetcher_url", &self.fetcher_url)
            .finish()
    }
}

/// Space-joined `KEY=VALUE` pairs in key order.
pub fn env_blob(vars: &BTreeMap<String, String>) -> String {
    vars.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_is_sorted_and_space_joined() {
        let store = ArtifactStore {
            access_key: "ak".into(),
            secret_key: "sk".into(),
            endpoint: "http://minio:9005".into(),
            bucket: "test".into(),
            region: "zh-south-1".into(),
            fetcher_url: "http://minio/s3get.tgz".into(),
        };
        assert_eq!(
            store.env_blob(),
            "GOCD_S3_AK=ak GOCD_S3_BUCKET=test GOCD_S3_ENDPOINT=http://minio:9005 \
             GOCD_S3_REGION=zh-south-1 GOCD_S3_SK=sk"
        );
    }

    #[test]
    fn debug_hides_secret() {
        let store = ArtifactStore {
            secret_key: "hunter2".into(),
            ..Default::default()
        };
        assert!(!format!("{:?}", store).contains("hunter2"));
    }

    #[test]
    fn empty_map_gives_empty_blob() {
        assert_eq!(env_blob(&BTreeMap::new()), "");
    }
}
