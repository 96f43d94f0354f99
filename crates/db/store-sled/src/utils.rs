use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::TransactionError;
use taskledger_db_types::{DbError, DbResult};

pub(crate) fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| DbError::CodecError(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    serde_json::from_slice(bytes).map_err(|e| DbError::CodecError(e.to_string()))
}

pub(crate) fn sled_error(err: sled::Error) -> DbError {
    match err {
        sled::Error::Io(e) => DbError::IoError(e.to_string()),
        other => DbError::Other(format!("sled error: {other:?}")),
    }
}

pub(crate) fn to_db_error(err: TransactionError<DbError>) -> DbError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => sled_error(e),
    }
}
