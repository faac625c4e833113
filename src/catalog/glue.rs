//! AWS Glue Data Catalog over its JSON 1.1 API, signed with SigV4.

use super::{CatalogColumn, CatalogError, CatalogService, TableUpsert};
use crate::clock;
use crate::storage::AwsCredentials;
use crate::storage::sigv4::{RequestParts, SigV4Signer, split_endpoint};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use time::OffsetDateTime;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Glue client for one region.
pub struct GlueCatalog {
    pub(crate) client: Client,
    pub(crate) scheme: String,
    pub(crate) host: String,
    pub(crate) signer: SigV4Signer,
}

impl GlueCatalog {
    /// Client for `region`, optionally against an endpoint override.
    pub fn new(
        region: String,
        endpoint_url: Option<String>,
        credentials: AwsCredentials,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent("ragpipe/glue")
            .build()
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;
        let (scheme, host) = match endpoint_url.as_deref() {
            Some(url) => split_endpoint(url),
            None => ("https".to_string(), format!("glue.{region}.amazonaws.com")),
        };
        Ok(Self {
            client,
            scheme,
            host,
            signer: SigV4Signer {
                credentials,
                region,
                service: "glue",
            },
        })
    }

    async fn call(&self, action: &str, body: &Value) -> Result<Value, CatalogError> {
        let payload = body.to_string().into_bytes();
        let headers = [
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("x-amz-target".to_string(), format!("AWSGlue.{action}")),
        ];
        let signed = self.signer.sign(
            &RequestParts {
                method: "POST",
                host: &self.host,
                canonical_uri: "/",
                query: &[],
                headers: &headers,
                payload: &payload,
            },
            OffsetDateTime::now_utc(),
        );

        let mut request = self
            .client
            .post(format!("{}://{}/", self.scheme, self.host));
        for (name, value) in headers.iter().chain(signed.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|err| CatalogError::Unavailable(format!("Glue {action} failed: {err}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(serde_json::from_str(&text).unwrap_or(Value::Null));
        }
        let error = rejection(&text).unwrap_or_else(|| CatalogError::UnexpectedStatus {
            status,
            body: text.chars().take(500).collect(),
        });
        tracing::debug!(action, error = %error, "Glue call rejected");
        Err(error)
    }
}

/// Typed error from a Glue error body (`__type` plus `message` or `Message`).
fn rejection(body: &str) -> Option<CatalogError> {
    let value: Value = serde_json::from_str(body).ok()?;
    let kind = value.get("__type")?.as_str()?;
    let code = kind.rsplit('#').next().unwrap_or(kind).to_string();
    let message = value
        .get("message")
        .or_else(|| value.get("Message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(CatalogError::Rejected { code, message })
}

fn is_rejection(error: &CatalogError, code: &str) -> bool {
    matches!(error, CatalogError::Rejected { code: actual, .. } if actual.contains(code))
}

/// Table definition for a Delta table read through its symlink manifest.
fn table_input(name: &str, columns: &[CatalogColumn], location: &str) -> Value {
    let columns: Vec<Value> = columns
        .iter()
        .map(|column| {
            json!({
                "Name": column.name,
                "Type": column.data_type,
                "Comment": column.comment,
            })
        })
        .collect();
    json!({
        "Name": name,
        "Description": format!(
            "Delta table {name}, registered {}",
            clock::current_timestamp_rfc3339()
        ),
        "StorageDescriptor": {
            "Columns": columns,
            "Location": location,
            "InputFormat": "org.apache.hadoop.mapred.TextInputFormat",
            "OutputFormat": "org.apache.hadoop.hive.ql.io.HiveIgnoreKeyTextOutputFormat",
            "SerdeInfo": {
                "SerializationLibrary": "org.apache.hadoop.hive.serde2.lazy.LazySimpleSerDe",
                "Parameters": {"field.delim": "\t", "serialization.format": "\t"},
            },
            "Parameters": {
                "classification": "delta",
                "delta.compatibility.symlinkFormatManifest.enabled": "true",
                "has_encrypted_data": "false",
            },
        },
        "PartitionKeys": [],
        "TableType": "EXTERNAL_TABLE",
        "Parameters": {
            "classification": "delta",
            "delta.compatibility.symlinkFormatManifest.enabled": "true",
            "projection.enabled": "false",
            "storage.location.template": location,
        },
    })
}

#[async_trait]
impl CatalogService for GlueCatalog {
    async fn ensure_namespace(&self, namespace: &str) -> Result<(), CatalogError> {
        match self.call("GetDatabase", &json!({ "Name": namespace })).await {
            Ok(_) => return Ok(()),
            Err(err) if is_rejection(&err, "EntityNotFoundException") => {}
            Err(err) => return Err(err),
        }
        let create = json!({
            "DatabaseInput": {
                "Name": namespace,
                "Description": "Delta tables extracted from documents",
            }
        });
        match self.call("CreateDatabase", &create).await {
            Ok(_) => {
                tracing::info!(database = namespace, "Catalog database created");
                Ok(())
            }
            Err(err) if is_rejection(&err, "AlreadyExistsException") => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn create_or_update_table(
        &self,
        namespace: &str,
        name: &str,
        columns: &[CatalogColumn],
        location: &str,
    ) -> Result<TableUpsert, CatalogError> {
        let body = json!({
            "DatabaseName": namespace,
            "TableInput": table_input(name, columns, location),
        });
        match self.call("CreateTable", &body).await {
            Ok(_) => Ok(TableUpsert::Created),
            Err(err) if is_rejection(&err, "AlreadyExistsException") => {
                self.call("UpdateTable", &body).await?;
                Ok(TableUpsert::Updated)
            }
            Err(err) => Err(err),
        }
    }
}
