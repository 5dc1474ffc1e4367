//! The structured error surface of the apply pipeline.

use thiserror::Error;

/// Opaque error cause supplied by caller code (collector and filter
/// predicates).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every way an apply run can fail. The first failure terminates the run;
/// nothing is retried or swallowed.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The field manager identity is mandatory and must name the applying
    /// actor.
    #[error("field manager must not be empty")]
    EmptyFieldManager,

    #[error("failed to construct cluster client")]
    ClientBuild(#[source] kube::Error),

    #[error("could not decode YAML document")]
    Decode(#[source] serde_yaml::Error),

    #[error("YAML document root is not a mapping")]
    NotAMapping,

    #[error("YAML document is missing {field}")]
    MissingField { field: &'static str },

    /// The declared GVK has no resource served by the API (unknown or
    /// uninstalled CRD, typo, stale discovery).
    #[error("no resource mapping for group-kind {group_kind} in version {version}")]
    Resolution {
        group_kind: String,
        version: String,
        #[source]
        source: remora_client::LocateError,
    },

    /// Owner-reference stamping failed; nothing was sent to the cluster.
    #[error("cannot set owner reference on {kind}/{name}: {reason}")]
    OwnerReference {
        kind: String,
        name: String,
        reason: String,
    },

    /// The server-side-apply patch was rejected (conflict, validation,
    /// transport). The cause stays inspectable through [`source`] and
    /// [`ApplyError::root_cause`].
    ///
    /// [`source`]: std::error::Error::source
    #[error("error while patching resource {kind}/{api_version}/{name}")]
    Patch {
        kind: String,
        api_version: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("template for file {file} is not valid UTF-8")]
    TemplateEncoding {
        file: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("failed to parse template for file {file}: {message}")]
    TemplateParse { file: String, message: String },

    #[error("failed to render template for file {file}: {message}")]
    TemplateRender { file: String, message: String },

    #[error("resource collection failed for file {file}")]
    Collection {
        file: String,
        #[source]
        source: BoxError,
    },

    #[error("filtering resource failed for file {file}")]
    Filter {
        file: String,
        #[source]
        source: BoxError,
    },

    #[error("resource application failed for file {file}")]
    Application {
        file: String,
        #[source]
        source: Box<ApplyError>,
    },
}

impl ApplyError {
    /// Walks the source chain to the deepest cause, for callers that branch
    /// on the underlying failure (conflict vs not-found vs transport).
    pub fn root_cause(&self) -> &(dyn std::error::Error + 'static) {
        let mut cause: &(dyn std::error::Error + 'static) = self;
        while let Some(next) = cause.source() {
            cause = next;
        }
        cause
    }
}
