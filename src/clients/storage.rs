//! Path-style S3 client (`ListObjectsV2`, `GetObject`) signed with SigV4.

use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;

use super::sigv4::{canonical_query, uri_encode, SigningKey};
use super::{ClientError, ObjectStorage, StoredObject};
use crate::config::env::is_unexpanded_placeholder;
use crate::config::S3Config;

static CONTENTS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Contents>(.*?)</Contents>").unwrap());
static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Key>(.*?)</Key>").unwrap());
static SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Size>(\d+)</Size>").unwrap());
static MODIFIED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<LastModified>(.*?)</LastModified>").unwrap());
static TRUNCATED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<IsTruncated>true</IsTruncated>").unwrap());
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<NextContinuationToken>(.*?)</NextContinuationToken>").unwrap()
});

/// S3-compatible storage client bound to one bucket.
#[derive(Debug, Clone)]
pub struct S3Client {
    http: reqwest::Client,
    scheme: &'static str,
    endpoint: String,
    bucket: String,
    key: SigningKey,
}

impl S3Client {
    /// Build a client from the `s3` config section.
    ///
    /// Fails when the endpoint, bucket or credentials are missing.
    pub fn new(cfg: &S3Config) -> Result<Self, ClientError> {
        if cfg.endpoint.is_empty() {
            return Err(ClientError::Config("s3.endpoint is required".into()));
        }
        if cfg.bucket.is_empty() {
            return Err(ClientError::Config("s3.bucket is required".into()));
        }
        for (field, value) in [("s3.access_key", &cfg.access_key), ("s3.secret_key", &cfg.secret_key)] {
            if value.is_empty() || is_unexpanded_placeholder(value) {
                return Err(ClientError::Config(format!("{field} is not set")));
            }
        }

        let endpoint = cfg
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        let region = if cfg.region.is_empty() { "us-east-1" } else { cfg.region.as_str() };

        Ok(Self {
            http: reqwest::Client::new(),
            scheme: if cfg.use_ssl { "https" } else { "http" },
            endpoint,
            bucket: cfg.bucket.clone(),
            key: SigningKey {
                access_key: cfg.access_key.clone(),
                secret_key: cfg.secret_key.clone(),
                region: region.to_string(),
                service: "s3".to_string(),
            },
        })
    }

    async fn signed_get(&self, path: &str, query: &[(String, String)]) -> Result<Bytes, ClientError> {
        let signed = self.key.sign(
            "GET",
            &self.endpoint,
            path,
            query,
            b"",
            chrono::Utc::now(),
        )?;

        let mut url = format!("{}://{}{}", self.scheme, self.endpoint, uri_encode(path, true));
        if !query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query(query));
        }

        let response = self
            .http
            .get(&url)
            .header("Authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.content_sha256)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ObjectStorage for S3Client {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, ClientError> {
        let prefix = normalize_prefix(prefix);
        let path = format!("/{}", self.bucket);
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), prefix.clone()),
            ];
            if let Some(t) = &token {
                query.push(("continuation-token".to_string(), t.clone()));
            }

            let body = self.signed_get(&path, &query).await?;
            let page = parse_list_objects(&String::from_utf8_lossy(&body));
            objects.extend(page.objects.into_iter().filter(|o| o.key != prefix));

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        log::debug!("s3 list bucket={} prefix={} count={}", self.bucket, prefix, objects.len());
        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, ClientError> {
        let path = format!("/{}/{}", self.bucket, key.trim_start_matches('/'));
        self.signed_get(&path, &[]).await
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

#[derive(Debug, Default)]
struct ListPage {
    objects: Vec<StoredObject>,
    next_token: Option<String>,
}

fn parse_list_objects(xml: &str) -> ListPage {
    let objects = CONTENTS_PATTERN
        .captures_iter(xml)
        .filter_map(|caps| {
            let block = caps.get(1)?.as_str();
            let key = KEY_PATTERN.captures(block)?.get(1)?.as_str();
            Some(StoredObject {
                key: unescape_xml(key),
                size: SIZE_PATTERN
                    .captures(block)
                    .and_then(|c| c[1].parse().ok())
                    .unwrap_or(0),
                last_modified: MODIFIED_PATTERN
                    .captures(block)
                    .map(|c| c[1].to_string())
                    .unwrap_or_default(),
            })
        })
        .collect();

    let next_token = if TRUNCATED_PATTERN.is_match(xml) {
        TOKEN_PATTERN.captures(xml).map(|c| unescape_xml(&c[1]))
    } else {
        None
    };

    ListPage { objects, next_token }
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> S3Config {
        S3Config {
            endpoint: "https://storage.example.net/".into(),
            region: String::new(),
            bucket: "plm".into(),
            access_key: "AK".into(),
            secret_key: "SK".into(),
            use_ssl: true,
        }
    }

    #[test]
    fn test_new_normalizes_endpoint() {
        let client = S3Client::new(&cfg()).unwrap();
        assert_eq!(client.endpoint, "storage.example.net");
        assert_eq!(client.key.region, "us-east-1");
        assert_eq!(client.bucket(), "plm");
    }

    #[test]
    fn test_new_rejects_placeholder_credentials() {
        let mut c = cfg();
        c.secret_key = "${S3_SECRET_KEY}".into();
        let err = S3Client::new(&c).unwrap_err();
        assert!(err.to_string().contains("s3.secret_key is not set"));
    }

    #[test]
    fn test_parse_list_objects_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>12345/</Key><Size>0</Size></Contents>
  <Contents><Key>12345/sketch &amp; notes.jpg</Key><LastModified>2024-02-01T10:00:00.000Z</LastModified><Size>2048</Size></Contents>
  <NextContinuationToken>tok/1</NextContinuationToken>
</ListBucketResult>"#;

        let page = parse_list_objects(xml);
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.objects[1].key, "12345/sketch & notes.jpg");
        assert_eq!(page.objects[1].size, 2048);
        assert_eq!(page.objects[1].last_modified, "2024-02-01T10:00:00.000Z");
        assert_eq!(page.next_token.as_deref(), Some("tok/1"));
    }

    #[test]
    fn test_last_page_has_no_token() {
        let xml = "<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>";
        let page = parse_list_objects(xml);
        assert!(page.objects.is_empty());
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_prefix_gets_trailing_slash() {
        assert_eq!(normalize_prefix("12345"), "12345/");
        assert_eq!(normalize_prefix("12345/"), "12345/");
        assert_eq!(normalize_prefix(""), "");
    }
}
