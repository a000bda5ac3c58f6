//! Mapper backed by a remote model service speaking JSON over HTTP.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use super::ExpressionMapper;
use crate::error::{ExpressionError, Result};
use crate::types::{ExpressionParameters, TimelineSample};

/// Accepted response bodies: the parameter object itself, or wrapped in
/// `{"parameters": {...}}`. All ten fields are required either way.
#[derive(Deserialize)]
#[serde(untagged)]
enum MapperResponse {
    Wrapped { parameters: ExpressionParameters },
    Bare(ExpressionParameters),
}

impl MapperResponse {
    fn into_parameters(self) -> ExpressionParameters {
        match self {
            MapperResponse::Wrapped { parameters } | MapperResponse::Bare(parameters) => {
                parameters
            }
        }
    }
}

pub struct HttpMapper {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMapper {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ExpressionError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ExpressionMapper for HttpMapper {
    fn name(&self) -> &'static str {
        "http"
    }

    fn map(&self, sample: &TimelineSample) -> Result<ExpressionParameters> {
        let fail = |reason: String| ExpressionError::mapping(sample.timestamp, reason);

        let mut request = self.client.post(&self.endpoint).json(sample);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .map_err(|err| fail(format!("request to {} failed: {err}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("mapper service returned status {status}")));
        }

        let body: MapperResponse = response
            .json()
            .map_err(|err| fail(format!("malformed mapper response: {err}")))?;
        debug!(timestamp = sample.timestamp, "remote mapper responded");
        Ok(body.into_parameters())
    }
}
