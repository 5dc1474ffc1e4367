//! The pipeline builder: several YAML sources, optional templating, owner
//! stamping, collection and filtering, composed into one ordered apply run.

use std::collections::BTreeMap;
use std::sync::Arc;

use gtmpl::Value;
use tracing::debug;

use crate::document::YamlDocument;
use crate::error::{ApplyError, BoxError};
use crate::owner::ResourceOwner;
use crate::split::split_documents;
use crate::template::render_template;
use crate::{Applier, DocumentApplier};

/// Identifies and collects documents streaming through the pipeline.
///
/// The implementor supplies the predicate and keeps the collected documents;
/// accumulation happens behind `&self`, so implementations use interior
/// mutability and hand the builder an `Arc` they retain a clone of. Every
/// document is offered, including ones a filter later rejects.
pub trait ResourceCollector: Send + Sync {
    /// True if the collector wants this document.
    fn predicate(&self, doc: &YamlDocument) -> Result<bool, BoxError>;
    /// Receives each document the predicate matched, in pipeline order.
    fn collect(&self, doc: &YamlDocument);
}

/// Decides whether a document is applied at all; `true` means apply.
/// Rejected documents are skipped silently but still collected.
pub trait ApplyFilter: Send + Sync {
    fn predicate(&self, doc: &YamlDocument) -> Result<bool, BoxError>;
}

/// Single-use, fluent front end for the [`Applier`].
///
/// Configuration methods consume and return the builder; `execute_apply`
/// consumes it for good, so a run can never be repeated on stale state.
///
/// ```text
/// applier.builder()
///     .with_namespace("my-namespace")
///     .with_yaml_resource("deploy.yaml", bytes)
///     .with_template("deploy.yaml", data)
///     .with_apply_filter(my_filter)
///     .execute_apply()
/// ```
pub struct ApplyBuilder<'a> {
    applier: &'a dyn DocumentApplier,
    resources: BTreeMap<String, Vec<u8>>,
    templates: BTreeMap<String, Value>,
    owner: Option<Box<dyn ResourceOwner>>,
    namespace: String,
    collectors: Vec<Arc<dyn ResourceCollector>>,
    filter: Option<Box<dyn ApplyFilter>>,
}

impl<'a> ApplyBuilder<'a> {
    pub fn new(applier: &'a Applier) -> Self {
        Self::with_applier(applier)
    }

    pub(crate) fn with_applier(applier: &'a dyn DocumentApplier) -> Self {
        Self {
            applier,
            resources: BTreeMap::new(),
            templates: BTreeMap::new(),
            owner: None,
            namespace: String::new(),
            collectors: Vec::new(),
            filter: None,
        }
    }

    /// Add one file's raw YAML bytes. Re-adding a filename overwrites the
    /// earlier bytes.
    pub fn with_yaml_resource(
        mut self,
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.resources.insert(filename.into(), content.into());
        self
    }

    /// Attach template data to the file previously added under `filename`.
    /// Files without template data are never run through the template
    /// engine.
    pub fn with_template(mut self, filename: impl Into<String>, data: impl Into<Value>) -> Self {
        self.templates.insert(filename.into(), data.into());
        self
    }

    /// Owner for every applied namespaced resource; when the owner is
    /// deleted, the API server cascades to everything applied here.
    pub fn with_owner(mut self, owner: impl ResourceOwner + 'static) -> Self {
        self.owner = Some(Box::new(owner));
        self
    }

    /// Target namespace for namespaced resources. Required whenever any
    /// document resolves to a namespaced kind.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Register a collector. Collectors run against every document.
    pub fn with_collector(mut self, collector: Arc<dyn ResourceCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    /// Register the filter deciding which documents get applied.
    pub fn with_apply_filter(mut self, filter: impl ApplyFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Render, split, collect, filter, apply. The first failure of any
    /// phase ends the whole run; rendering completes for all files before
    /// the first document is applied.
    pub async fn execute_apply(mut self) -> Result<(), ApplyError> {
        self.render_templates()?;

        let files: Vec<(String, Vec<YamlDocument>)> = self
            .resources
            .iter()
            .map(|(file, raw)| (file.clone(), split_documents(raw)))
            .collect();

        for (file, docs) in files {
            for doc in docs {
                self.apply_doc(&file, &doc).await?;
            }
        }
        Ok(())
    }

    fn render_templates(&mut self) -> Result<(), ApplyError> {
        for (file, data) in &self.templates {
            if let Some(raw) = self.resources.get_mut(file) {
                *raw = render_template(file, raw, data)?;
            }
        }
        Ok(())
    }

    async fn apply_doc(&self, file: &str, doc: &YamlDocument) -> Result<(), ApplyError> {
        for collector in &self.collectors {
            let wanted = collector
                .predicate(doc)
                .map_err(|source| ApplyError::Collection {
                    file: file.to_string(),
                    source,
                })?;
            if wanted {
                collector.collect(doc);
            }
        }

        if let Some(filter) = &self.filter {
            let admit = filter.predicate(doc).map_err(|source| ApplyError::Filter {
                file: file.to_string(),
                source,
            })?;
            if !admit {
                debug!(file = %file, "document rejected by filter; not applied");
                return Ok(());
            }
        }

        self.applier
            .apply_with_owner(doc, &self.namespace, self.owner.as_deref())
            .await
            .map_err(|source| ApplyError::Application {
                file: file.to_string(),
                source: Box::new(source),
            })
    }
}
