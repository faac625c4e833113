//! S3 REST client signed with SigV4. Uses path-style addressing when an endpoint override
//! (MinIO, LocalStack) is configured, virtual-hosted style otherwise.

use super::sigv4::{
    AwsCredentials, RequestParts, SigV4Signer, canonical_query, encode_key, split_endpoint,
};
use super::{BlobObject, BlobStore, StorageError};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use time::OffsetDateTime;

/// Blob store backed by an S3-compatible bucket.
pub struct S3BlobStore {
    pub(crate) client: Client,
    pub(crate) bucket: String,
    /// `(scheme, host)` of the endpoint override.
    pub(crate) endpoint: Option<(String, String)>,
    pub(crate) signer: SigV4Signer,
}

impl S3BlobStore {
    /// Client for `bucket` in `region`.
    pub fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        credentials: AwsCredentials,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .user_agent("ragpipe/s3")
            .build()
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;
        let endpoint = endpoint_url.as_deref().map(split_endpoint);
        tracing::debug!(
            bucket = %bucket,
            region = %region,
            endpoint = ?endpoint,
            "Initialized S3 client"
        );
        Ok(Self {
            client,
            bucket,
            endpoint,
            signer: SigV4Signer {
                credentials,
                region,
                service: "s3",
            },
        })
    }

    /// `(scheme, host, canonical uri)` for an object key, or the bucket root when `key` is
    /// `None`.
    fn address(&self, key: Option<&str>) -> (String, String, String) {
        let encoded = key.map(encode_key).unwrap_or_default();
        match &self.endpoint {
            Some((scheme, host)) => {
                let uri = match key {
                    Some(_) => format!("/{}/{encoded}", self.bucket),
                    None => format!("/{}", self.bucket),
                };
                (scheme.clone(), host.clone(), uri)
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", self.bucket, self.signer.region),
                format!("/{encoded}"),
            ),
        }
    }

    async fn send(
        &self,
        method: Method,
        key: Option<&str>,
        query: &[(String, String)],
        headers: &[(String, String)],
        body: Vec<u8>,
    ) -> Result<reqwest::Response, StorageError> {
        let (scheme, host, canonical_uri) = self.address(key);
        let signed = self.signer.sign(
            &RequestParts {
                method: method.as_str(),
                host: &host,
                canonical_uri: &canonical_uri,
                query,
                headers,
                payload: &body,
            },
            OffsetDateTime::now_utc(),
        );

        let mut url = format!("{scheme}://{host}{canonical_uri}");
        if !query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query(query));
        }

        let mut request = self.client.request(method, url);
        for (name, value) in headers.iter().chain(signed.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }
        request
            .body(body)
            .send()
            .await
            .map_err(|err| StorageError::Unavailable(format!("S3 request failed: {err}")))
    }
}

async fn unexpected(response: reqwest::Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = StorageError::UnexpectedStatus {
        status,
        body: body.chars().take(500).collect(),
    };
    tracing::error!(error = %error, "S3 request failed");
    error
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let size = bytes.len();
        let headers = [("content-type".to_string(), content_type.to_string())];
        let response = self.send(Method::PUT, Some(key), &[], &headers, bytes).await?;
        if !response.status().is_success() {
            return Err(unexpected(response).await);
        }
        tracing::debug!(bucket = %self.bucket, key, size, "Object stored");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobObject>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(token) = &continuation {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let response = self.send(Method::GET, None, &query, &[], Vec::new()).await?;
            if !response.status().is_success() {
                return Err(unexpected(response).await);
            }
            let xml = response
                .text()
                .await
                .map_err(|err| StorageError::Unavailable(err.to_string()))?;
            let (batch, truncated, next) = parse_list_objects(&xml);
            objects.extend(batch);

            match (truncated, next) {
                (true, Some(token)) => continuation = Some(token),
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.send(Method::GET, Some(key), &[], &[], Vec::new()).await?;
        match response.status() {
            status if status.is_success() => response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|err| StorageError::Unavailable(err.to_string())),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            _ => Err(unexpected(response).await),
        }
    }
}

/// Parse a `ListObjectsV2` page into objects, the truncation flag, and the next token.
fn parse_list_objects(xml: &str) -> (Vec<BlobObject>, bool, Option<String>) {
    let truncated = extract_xml_value(xml, "IsTruncated").is_some_and(|v| v == "true");
    let next = extract_xml_value(xml, "NextContinuationToken");

    let mut objects = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        if let Some(key) = extract_xml_value(block, "Key").filter(|k| !k.ends_with('/')) {
            objects.push(BlobObject {
                key,
                size: extract_xml_value(block, "Size")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                modified: extract_xml_value(block, "LastModified"),
            });
        }
        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    (objects, truncated, next)
}

fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let value_start = xml.find(&open)? + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(unescape_xml(&xml[value_start..value_start + end]))
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::PUT, MockServer};

    fn store(server: &MockServer) -> S3BlobStore {
        S3BlobStore::new(
            "bucket".into(),
            "ca-central-1".into(),
            Some(server.base_url()),
            AwsCredentials::new("AKIDEXAMPLE", "secret"),
        )
        .expect("store")
    }

    #[tokio::test]
    async fn put_is_signed_and_path_style() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/bucket/f/csv/a.csv")
                    .header("content-type", "text/csv")
                    .header_exists("authorization")
                    .header_exists("x-amz-date")
                    .body("a,b\n");
                then.status(200);
            })
            .await;

        store(&server)
            .put("f/csv/a.csv", b"a,b\n".to_vec(), "text/csv")
            .await
            .expect("put");
        mock.assert();
    }

    #[tokio::test]
    async fn list_follows_continuation_tokens() {
        let server = MockServer::start_async().await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/bucket")
                    .query_param("continuation-token", "tok");
                then.status(200).body(
                    "<ListBucketResult><IsTruncated>false</IsTruncated>\
                     <Contents><Key>p/b.parquet</Key><Size>7</Size></Contents></ListBucketResult>",
                );
            })
            .await;
        let first = server
            .mock_async(|when, then| {
                when.method(GET).path("/bucket").query_param("prefix", "p/");
                then.status(200).body(
                    "<ListBucketResult><IsTruncated>true</IsTruncated>\
                     <NextContinuationToken>tok</NextContinuationToken>\
                     <Contents><Key>p/a&amp;1.parquet</Key><Size>3</Size>\
                     <LastModified>2025-01-01T00:00:00.000Z</LastModified></Contents>\
                     <Contents><Key>p/dir/</Key><Size>0</Size></Contents></ListBucketResult>",
                );
            })
            .await;

        let listed = store(&server).list("p/").await.expect("list");
        second.assert();
        first.assert();

        let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["p/a&1.parquet", "p/b.parquet"]);
        assert_eq!(listed[0].size, 3);
    }

    #[tokio::test]
    async fn missing_objects_map_to_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/bucket/k.json");
                then.status(404).body("<Error><Code>NoSuchKey</Code></Error>");
            })
            .await;
        let err = store(&server).get("k.json").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn virtual_hosted_address_without_endpoint() {
        let store = S3BlobStore::new(
            "bkt".into(),
            "ca-central-1".into(),
            None,
            AwsCredentials::new("a", "b"),
        )
        .unwrap();
        let (scheme, host, uri) = store.address(Some("x/y.json"));
        assert_eq!(scheme, "https");
        assert_eq!(host, "bkt.s3.ca-central-1.amazonaws.com");
        assert_eq!(uri, "/x/y.json");
    }
}
