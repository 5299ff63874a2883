use super::{ExternalTableDefinition, RegistrationOutcome, Warehouse};
use crate::error::{ErrorKind, StepError, StepResult};
use crate::http::{status_error, transport_error};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// BigQuery tables API client for external table definitions.
pub struct BigQueryWarehouse {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    table_reference: TableReference,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    table_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    external_data_configuration: Option<ExternalDataConfiguration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExternalDataConfiguration {
    source_format: String,
    #[serde(default)]
    source_uris: Vec<String>,
}

impl From<&ExternalTableDefinition> for TableResource {
    fn from(definition: &ExternalTableDefinition) -> Self {
        Self {
            table_reference: TableReference {
                project_id: definition.project_id.clone(),
                dataset_id: definition.dataset.clone(),
                table_id: definition.table.clone(),
            },
            table_type: None,
            external_data_configuration: Some(ExternalDataConfiguration {
                source_format: definition.source_format.as_str().to_string(),
                source_uris: definition.source_uris.clone(),
            }),
        }
    }
}

/// How an existing table relates to the definition being registered
#[derive(Debug, PartialEq, Eq)]
enum Compatibility {
    Identical,
    NeedsUpdate,
    Conflict(String),
}

fn compare(existing: &TableResource, definition: &ExternalTableDefinition) -> Compatibility {
    let table_type = existing.table_type.as_deref().unwrap_or("TABLE");
    let Some(external) = existing
        .external_data_configuration
        .as_ref()
        .filter(|_| table_type == "EXTERNAL")
    else {
        return Compatibility::Conflict(format!(
            "{} exists as a {table_type} table, not an external table",
            definition.qualified_name()
        ));
    };

    if !external
        .source_format
        .eq_ignore_ascii_case(definition.source_format.as_str())
    {
        return Compatibility::Conflict(format!(
            "{} reads {} files, expected {}",
            definition.qualified_name(),
            external.source_format,
            definition.source_format
        ));
    }

    if definition.same_sources(&external.source_uris) {
        Compatibility::Identical
    } else {
        Compatibility::NeedsUpdate
    }
}

impl BigQueryWarehouse {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            timeout,
        }
    }

    fn tables_url(&self, definition: &ExternalTableDefinition) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables",
            self.endpoint, definition.project_id, definition.dataset
        )
    }

    fn table_url(&self, definition: &ExternalTableDefinition) -> String {
        format!("{}/{}", self.tables_url(definition), definition.table)
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<&TableResource>,
    ) -> StepResult<(StatusCode, String)> {
        let operation = format!("{method} {url}");
        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout);
        if let Some(resource) = body {
            request = request.json(resource);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&operation, &e, ErrorKind::MetadataTransient))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&operation, &e, ErrorKind::MetadataTransient))?;
        Ok((status, text))
    }

    fn failure(operation: &str, status: StatusCode, body: &str) -> StepError {
        status_error(
            operation,
            status,
            body,
            Some(ErrorKind::MetadataAuth),
            ErrorKind::MetadataTransient,
        )
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    #[instrument(skip(self, definition), fields(table = %definition.qualified_name()))]
    async fn create_or_update_external_table(
        &self,
        definition: &ExternalTableDefinition,
    ) -> StepResult<RegistrationOutcome> {
        let resource = TableResource::from(definition);

        let (status, body) = self
            .send(Method::POST, self.tables_url(definition), Some(&resource))
            .await?;
        if status.is_success() {
            info!("External table created");
            return Ok(RegistrationOutcome::Created);
        }
        if status != StatusCode::CONFLICT {
            return Err(Self::failure("create table", status, &body));
        }

        debug!("Table already exists, comparing definitions");
        let (status, body) = self
            .send(Method::GET, self.table_url(definition), None)
            .await?;
        if !status.is_success() {
            return Err(Self::failure("get table", status, &body));
        }
        let existing: TableResource = serde_json::from_str(&body).map_err(|e| {
            StepError::new(
                ErrorKind::MetadataTransient,
                format!("unreadable table resource for {}: {e}", definition.qualified_name()),
            )
        })?;

        match compare(&existing, definition) {
            Compatibility::Identical => Ok(RegistrationOutcome::Unchanged),
            Compatibility::Conflict(reason) => {
                Err(StepError::new(ErrorKind::MetadataConflict, reason))
            }
            Compatibility::NeedsUpdate => {
                let (status, body) = self
                    .send(Method::PATCH, self.table_url(definition), Some(&resource))
                    .await?;
                if !status.is_success() {
                    return Err(Self::failure("patch table", status, &body));
                }
                info!("External table source URIs updated");
                Ok(RegistrationOutcome::Updated)
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "bigquery"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::SourceFormat;

    fn definition() -> ExternalTableDefinition {
        ExternalTableDefinition {
            project_id: "movies-project".to_string(),
            dataset: "imdb_dataset".to_string(),
            table: "comedy".to_string(),
            source_format: SourceFormat::Parquet,
            source_uris: vec!["gs://movies/comedy/*.parquet".to_string()],
        }
    }

    fn existing(table_type: &str, format: &str, uris: &[&str]) -> TableResource {
        TableResource {
            table_reference: TableReference {
                project_id: "movies-project".to_string(),
                dataset_id: "imdb_dataset".to_string(),
                table_id: "comedy".to_string(),
            },
            table_type: Some(table_type.to_string()),
            external_data_configuration: Some(ExternalDataConfiguration {
                source_format: format.to_string(),
                source_uris: uris.iter().map(|u| u.to_string()).collect(),
            }),
        }
    }

    #[test]
    fn test_table_resource_wire_shape() {
        let json = serde_json::to_value(TableResource::from(&definition())).unwrap();
        assert_eq!(json["tableReference"]["tableId"], "comedy");
        assert_eq!(json["tableReference"]["datasetId"], "imdb_dataset");
        assert_eq!(json["externalDataConfiguration"]["sourceFormat"], "PARQUET");
        assert_eq!(
            json["externalDataConfiguration"]["sourceUris"][0],
            "gs://movies/comedy/*.parquet"
        );
        assert!(json.get("type").is_none());
    }

    #[test]
    fn test_compare_identical_definition() {
        let table = existing("EXTERNAL", "PARQUET", &["gs://movies/comedy/*.parquet"]);
        assert_eq!(compare(&table, &definition()), Compatibility::Identical);
    }

    #[test]
    fn test_compare_changed_uris_needs_update() {
        let table = existing("EXTERNAL", "PARQUET", &["gs://old/comedy/*.parquet"]);
        assert_eq!(compare(&table, &definition()), Compatibility::NeedsUpdate);
    }

    #[test]
    fn test_compare_conflicts() {
        let native = existing("TABLE", "PARQUET", &["gs://movies/comedy/*.parquet"]);
        assert!(matches!(
            compare(&native, &definition()),
            Compatibility::Conflict(_)
        ));

        let csv = existing("EXTERNAL", "CSV", &["gs://movies/comedy/*.parquet"]);
        assert!(matches!(
            compare(&csv, &definition()),
            Compatibility::Conflict(_)
        ));
    }
}
