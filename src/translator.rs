//! Natural-language to filter translation through a hosted model.
//!
//! The suggestion is returned as-is: it is never checked against the schema
//! and never executed here. Applying it is a separate `/query` call.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::api::{FilterSuggestion, TranslateRequest};
use crate::config::TranslatorConfig;
use crate::error::{ExplorerError, ExplorerResult};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait FilterTranslator: Send + Sync {
    async fn translate(&self, request: &TranslateRequest) -> ExplorerResult<FilterSuggestion>;
}

/// Used when no model credentials are configured
pub struct DisabledTranslator;

#[async_trait]
impl FilterTranslator for DisabledTranslator {
    async fn translate(&self, _request: &TranslateRequest) -> ExplorerResult<FilterSuggestion> {
        tracing::warn!("Filter translation requested but no translator API key is configured");
        Err(ExplorerError::Translation)
    }
}

pub fn build_prompt(request: &TranslateRequest) -> String {
    let schema = if request.collection_schema.trim().is_empty() {
        "{}"
    } else {
        request.collection_schema.as_str()
    };
    format!(
        "You translate natural language questions into MongoDB find filters.\n\
         \n\
         Collection name: {collection}\n\
         Collection schema (field name to type): {schema}\n\
         Request: {request}\n\
         \n\
         Answer with a single JSON object and nothing else, in this shape:\n\
         {{\n  \"mongoQuery\": \"<the filter document as a JSON string>\",\n  \
         \"reasoning\": \"<short explanation of the filter>\"\n}}\n\
         The filter must be valid JSON usable as the first argument of find().",
        collection = request.collection_name,
        request = request.natural_language_query,
    )
}

/// Pull the `{ mongoQuery, reasoning }` object out of model text. Code
/// fences and surrounding prose are tolerated; an object-valued
/// `mongoQuery` is re-serialized to JSON text.
pub fn parse_suggestion(text: &str) -> Result<FilterSuggestion> {
    let start = text.find('{').context("no JSON object in model output")?;
    let end = text.rfind('}').context("no JSON object in model output")?;
    if end < start {
        bail!("no JSON object in model output");
    }
    let value: Value =
        serde_json::from_str(&text[start..=end]).context("model output is not valid JSON")?;

    let mongo_query = match value.get("mongoQuery") {
        Some(Value::String(query)) => query.clone(),
        Some(query @ (Value::Object(_) | Value::Array(_))) => query.to_string(),
        _ => bail!("model output has no mongoQuery"),
    };
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(FilterSuggestion {
        mongo_query,
        reasoning,
    })
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
}

fn extract_text(response: &Value) -> Option<String> {
    let blocks = response.get("content")?.as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.join(""))
    }
}

/// Calls an Anthropic-style Messages endpoint.
#[derive(Debug, Clone)]
pub struct ModelTranslator {
    base_url: Url,
    model: String,
    api_key: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl ModelTranslator {
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .context("translator.api_key is not set")?;
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .with_context(|| format!("Invalid translator.base_url '{}'", config.base_url))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            client,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let url = self
            .base_url
            .join("messages")
            .context("failed to build messages URL")?;
        let body = MessagesBody {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("calling model API")?;

        let status = resp.status();
        let parsed: Value = resp.json().await.context("model API returned non-JSON body")?;
        if !status.is_success() {
            let msg = parsed
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("model call failed");
            return Err(anyhow!("model API returned {status}: {msg}"));
        }

        extract_text(&parsed).context("model response has no text content")
    }

    async fn suggest(&self, request: &TranslateRequest) -> Result<FilterSuggestion> {
        let text = self.complete(build_prompt(request)).await?;
        parse_suggestion(&text)
    }
}

#[async_trait]
impl FilterTranslator for ModelTranslator {
    async fn translate(&self, request: &TranslateRequest) -> ExplorerResult<FilterSuggestion> {
        tracing::info!(
            "Translating natural language request for collection '{}'",
            request.collection_name
        );

        self.suggest(request).await.map_err(|e| {
            tracing::warn!("Filter translation failed: {:#}", e);
            ExplorerError::Translation
        })
    }
}

/// Pick the translator implementation for the configuration
pub fn from_config(config: &TranslatorConfig) -> Result<Box<dyn FilterTranslator>> {
    if config.has_api_key() {
        tracing::info!("Filter translator enabled (model: {})", config.model);
        Ok(Box::new(ModelTranslator::new(config)?))
    } else {
        tracing::info!("Filter translator disabled: no API key configured");
        Ok(Box::new(DisabledTranslator))
    }
}
