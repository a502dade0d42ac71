use serde::Serialize;
use std::time::Duration;

use crate::error::{MetamodelError, Result};
use crate::model::AttributeBundle;

/// Turns free text into one name per hierarchy level
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<AttributeBundle>;
}

/// A keyword and the bundle it maps to
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub keyword: String,
    pub bundle: AttributeBundle,
}

/// Offline classifier: the first rule whose keyword occurs in the text
/// (case-insensitive) wins. The problem statement is the input text itself
/// unless the rule fixes one.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| KeywordRule {
                keyword: rule.keyword.to_lowercase(),
                bundle: rule.bundle,
            })
            .collect();
        Self { rules }
    }

    pub fn with_rule(mut self, keyword: impl Into<String>, bundle: AttributeBundle) -> Self {
        self.rules.push(KeywordRule {
            keyword: keyword.into().to_lowercase(),
            bundle,
        });
        self
    }

    fn matching_rule(&self, text: &str) -> Option<&KeywordRule> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| lowered.contains(&rule.keyword))
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(Vec::new()).with_rule(
            "dbos",
            AttributeBundle {
                ecosystem_name: "DBOS".to_string(),
                business_capability: "Collate Ecosystem Information".to_string(),
                business_service: "Metamodel Curation".to_string(),
                application_service: "Information Interpretation".to_string(),
                application_component: "Info Interpreter".to_string(),
                application_implementation: "core-metamodel".to_string(),
                problem_statement: String::new(),
            },
        )
    }
}

#[async_trait::async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<AttributeBundle> {
        let mut bundle = match self.matching_rule(text) {
            Some(rule) => rule.bundle.clone(),
            None => {
                log::info!("no keyword rule matched, returning empty bundle");
                AttributeBundle::default()
            }
        };
        if bundle.problem_statement.is_empty() {
            bundle.problem_statement = text.trim().to_string();
        }
        Ok(bundle)
    }
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

/// Remote classifier: POSTs `{ "text": ... }` and expects an attribute bundle back
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetamodelError::Upstream(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<AttributeBundle> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ClassifyRequest { text })
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| MetamodelError::Upstream(format!("classifier request failed: {}", e)))?;

        response
            .json::<AttributeBundle>()
            .await
            .map_err(|e| MetamodelError::Upstream(format!("malformed classifier response: {}", e)))
    }
}
