use std::{fs, path::Path, sync::Arc};

use taskledger_db_types::{DbError, DbResult};

use crate::{utils::sled_error, ResultDBSled, SledDbConfig};

/// Opens the sled database under `<datadir>/sled`.
pub fn open_sled_database(datadir: &Path) -> DbResult<sled::Db> {
    let database_dir = datadir.join("sled");

    if !database_dir.exists() {
        fs::create_dir_all(&database_dir).map_err(|e| DbError::IoError(e.to_string()))?;
    }

    sled::open(&database_dir).map_err(sled_error)
}

pub fn init_result_db(db: &sled::Db, config: SledDbConfig) -> DbResult<Arc<ResultDBSled>> {
    ResultDBSled::new(db, config).map(Arc::new)
}
