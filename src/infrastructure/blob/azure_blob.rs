//! Azure Blob Storage, authorised with a container SAS token

use async_trait::async_trait;
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Url;
use tracing::debug;

use crate::domain::blob::StorageProvider;
use crate::domain::error::{ProviderError, Stage};
use crate::infrastructure::http_client::HttpClientTrait;

const PROVIDER: &str = "azure_blob";
const STORAGE_API_VERSION: &str = "2021-08-06";

#[derive(Debug, Clone)]
pub struct AzureBlobConfig {
    /// e.g. `https://account.blob.core.windows.net/documents`
    pub container_url: String,
    /// SAS query string, with or without the leading `?`
    pub sas_token: String,
}

impl AzureBlobConfig {
    pub fn new(container_url: impl Into<String>, sas_token: impl Into<String>) -> Self {
        Self {
            container_url: container_url.into(),
            sas_token: sas_token.into(),
        }
    }

    /// Container URL carrying the SAS query
    fn container(&self) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.container_url).map_err(|e| {
            ProviderError::invalid_input(
                Stage::Fetch,
                PROVIDER,
                format!("Invalid container URL '{}': {}", self.container_url, e),
            )
        })?;

        let sas = self.sas_token.trim_start_matches('?');
        url.set_query((!sas.is_empty()).then_some(sas));
        Ok(url)
    }

    fn blob_url(&self, key: &str) -> Result<Url, ProviderError> {
        let mut url = self.container()?;
        url.path_segments_mut()
            .map_err(|_| {
                ProviderError::invalid_input(
                    Stage::Fetch,
                    PROVIDER,
                    format!("Container URL '{}' cannot hold a path", self.container_url),
                )
            })?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }

    fn list_url(&self, prefix: &str, marker: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = self.container()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("restype", "container")
                .append_pair("comp", "list")
                .append_pair("prefix", prefix);
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        Ok(url)
    }
}

#[derive(Debug)]
pub struct AzureBlobStorage<C: HttpClientTrait> {
    client: C,
    config: AzureBlobConfig,
}

impl<C: HttpClientTrait> AzureBlobStorage<C> {
    pub fn new(client: C, config: AzureBlobConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl<C: HttpClientTrait> StorageProvider for AzureBlobStorage<C> {
    async fn fetch(&self, key: &str) -> Result<Bytes, ProviderError> {
        let url = self.config.blob_url(key)?;
        let response = self
            .client
            .get(url.as_str(), vec![("x-ms-version", STORAGE_API_VERSION)])
            .await
            .map_err(|e| e.into_provider(Stage::Fetch, PROVIDER))?;

        debug!(key, bytes = response.body.len(), "Fetched blob");
        Ok(response.body)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let url = self.config.list_url(prefix, marker.as_deref())?;
            let response = self
                .client
                .get(url.as_str(), vec![("x-ms-version", STORAGE_API_VERSION)])
                .await
                .map_err(|e| e.into_provider(Stage::Fetch, PROVIDER))?;

            let listing = parse_listing(&response.text())?;
            keys.extend(listing.names);

            match listing.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// One page of a List Blobs response
#[derive(Debug, Default, PartialEq)]
struct Listing {
    names: Vec<String>,
    next_marker: Option<String>,
}

/// Where the reader is inside `EnumerationResults`
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    BlobName,
    NextMarker,
}

fn field_at(path: &[Vec<u8>]) -> Option<Field> {
    let is = |segment: &Vec<u8>, name: &[u8]| segment.as_slice() == name;

    match path {
        [.., blobs, blob, name] if is(blobs, b"Blobs") && is(blob, b"Blob") && is(name, b"Name") => {
            Some(Field::BlobName)
        }
        [.., marker] if is(marker, b"NextMarker") && !path.iter().any(|p| is(p, b"Blob")) => {
            Some(Field::NextMarker)
        }
        _ => None,
    }
}

fn parse_listing(xml: &str) -> Result<Listing, ProviderError> {
    let malformed = |e: quick_xml::Error| {
        ProviderError::malformed(
            Stage::Fetch,
            PROVIDER,
            format!("Failed to parse blob listing: {}", e),
        )
    };

    let mut reader = Reader::from_str(xml);
    let mut listing = Listing::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => {
                path.push(e.local_name().as_ref().to_vec());
                text.clear();
            }
            Event::Text(t) if field_at(&path).is_some() => {
                text.push_str(&t.unescape().map_err(malformed)?);
            }
            Event::CData(c) if field_at(&path).is_some() => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::End(_) => {
                match field_at(&path) {
                    Some(Field::BlobName) => listing.names.push(std::mem::take(&mut text)),
                    Some(Field::NextMarker) if !text.is_empty() => {
                        listing.next_marker = Some(std::mem::take(&mut text));
                    }
                    _ => {}
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(listing)
}
