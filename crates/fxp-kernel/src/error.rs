use fxp_store::StoreError;
use fxp_value::IdError;
use thiserror::Error;

use crate::queue::EvalId;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("identifier error: {0}")]
    Id(#[from] IdError),
    #[error("database '{0}' is already registered")]
    DuplicateDatabase(String),
    #[error("database '{0}' is not registered")]
    UnknownDatabase(String),
    #[error("evaluation {0} is not registered with database '{1}'")]
    EvaluationNotRegistered(EvalId, String),
    #[error("no evaluation is active to receive remote changes")]
    NoActiveEvaluation,
    #[error("block '{0}' is not awaiting remote changes")]
    UnexpectedRemoteResponse(String),
    #[error("block '{id}' failed: {source}")]
    Block {
        id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("action failed: {0}")]
    Action(#[source] anyhow::Error),
    #[error("snapshot codec error: {0}")]
    SnapshotCodec(#[from] serde_cbor::Error),
}
