use std::sync::Arc;
use std::time::Duration;

use crate::config::MailboxConfig;
use crate::error::{MetamodelError, Result};
use crate::interpreter::{Classifier, Mailbox};
use crate::logic::resolver::{HierarchyRequest, HierarchyResolver};
use crate::model::{AttributeBundle, EntityKind, IdentifierChain};
use crate::store::EntityStore;

/// Problem rows are keyed by name, so long statements are cut down for the
/// name and kept whole in the description.
const PROBLEM_NAME_MAX_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub classify_timeout: Duration,
    pub chain_problem_statement: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_secs(10),
            chain_problem_statement: false,
        }
    }
}

struct MailSource {
    mailbox: Arc<dyn Mailbox>,
    config: MailboxConfig,
}

/// Text in, identifier chain out: classify, translate, resolve.
pub struct IngestionWorkflow<S: ?Sized> {
    store: Arc<S>,
    classifier: Arc<dyn Classifier>,
    mail: Option<MailSource>,
    options: IngestOptions,
}

impl<S: EntityStore + ?Sized> IngestionWorkflow<S> {
    pub fn new(store: Arc<S>, classifier: Arc<dyn Classifier>, options: IngestOptions) -> Self {
        Self {
            store,
            classifier,
            mail: None,
            options,
        }
    }

    pub fn with_mailbox(mut self, mailbox: Arc<dyn Mailbox>, config: MailboxConfig) -> Self {
        self.mail = Some(MailSource { mailbox, config });
        self
    }

    pub fn has_mailbox(&self) -> bool {
        self.mail.is_some()
    }

    /// Ingest one block of free text.
    ///
    /// Returns `Ok(None)` without touching the store when the text is blank.
    /// A classifier failure or timeout aborts before any write.
    pub async fn ingest_text(&self, text: &str) -> Result<Option<IdentifierChain>> {
        if text.trim().is_empty() {
            log::debug!("empty info block, nothing to ingest");
            return Ok(None);
        }

        let bundle = match tokio::time::timeout(
            self.options.classify_timeout,
            self.classifier.classify(text),
        )
        .await
        {
            Ok(Ok(bundle)) => bundle,
            Ok(Err(e)) => {
                log::error!("classification failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                log::error!(
                    "classification timed out after {:?}",
                    self.options.classify_timeout
                );
                return Err(MetamodelError::Upstream(format!(
                    "classification timed out after {:?}",
                    self.options.classify_timeout
                )));
            }
        };

        if bundle.is_empty() {
            log::info!("classifier found no ecosystem in info block");
        }
        let request = self.to_request(&bundle);
        HierarchyResolver::resolve(self.store.as_ref(), &request)
            .await
            .map(Some)
    }

    /// Ingest the next unseen mailbox message, if any.
    ///
    /// The message is only marked seen once ingestion succeeded; on failure
    /// it stays unseen and is picked up again by the next call.
    pub async fn ingest_next_message(&self) -> Result<Option<IdentifierChain>> {
        let mail = self
            .mail
            .as_ref()
            .ok_or_else(|| MetamodelError::Upstream("no mailbox configured".to_string()))?;

        let Some(message) = mail.mailbox.fetch_next_unseen(&mail.config).await? else {
            return Ok(None);
        };
        let chain = self.ingest_text(&message.body).await?;
        mail.mailbox.mark_seen(&mail.config, message.uid).await?;
        Ok(chain)
    }

    /// Translate a bundle into the fixed-order resolver request
    pub fn to_request(&self, bundle: &AttributeBundle) -> HierarchyRequest {
        let mut request = HierarchyRequest::new(bundle.ecosystem_name.as_str())
            .level(EntityKind::BusinessCapability, bundle.business_capability.as_str())
            .level(EntityKind::BusinessService, bundle.business_service.as_str())
            .level(EntityKind::ApplicationService, bundle.application_service.as_str())
            .level(EntityKind::ApplicationComponent, bundle.application_component.as_str())
            .level(
                EntityKind::ApplicationImplementation,
                bundle.application_implementation.as_str(),
            );

        if self.options.chain_problem_statement {
            let statement = bundle.problem_statement.trim();
            let name: String = statement.chars().take(PROBLEM_NAME_MAX_CHARS).collect();
            request = request.described_level(EntityKind::Problem, name, statement);
        }
        request
    }
}
