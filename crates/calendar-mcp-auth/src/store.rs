//! File-backed credential store.
//!
//! Reads the OAuth client descriptor and reads/writes the token record.
//! Token writes go to a temp file in the same directory and are renamed over
//! the record, so a crash never leaves a truncated token file behind. The
//! directory is restricted to the owner, and the temp file is created with
//! mode `0600` before any secret bytes are written to it.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::credentials::ClientDescriptor;
use crate::error::{AuthError, AuthResult};
use crate::tokens::TokenRecord;

/// Persistence for the client descriptor and the token record.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    client_path: PathBuf,
    token_path: PathBuf,
}

impl CredentialStore {
    /// Creates a store over the given descriptor and token paths.
    pub fn new(client_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            client_path: client_path.into(),
            token_path: token_path.into(),
        }
    }

    /// Returns the client descriptor path.
    pub fn client_path(&self) -> &Path {
        &self.client_path
    }

    /// Returns the token record path.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Loads and validates the client descriptor.
    pub fn load_client_descriptor(&self) -> AuthResult<ClientDescriptor> {
        let path = &self.client_path;
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::config_missing(path));
            }
            Err(e) => return Err(AuthError::config_malformed(path, e)),
        };
        warn_if_exposed(path);

        let descriptor =
            ClientDescriptor::from_json(&content).map_err(|e| AuthError::config_malformed(path, e))?;
        debug!(path = %path.display(), client_id = %descriptor.client_id, "loaded OAuth client");
        Ok(descriptor)
    }

    /// Loads the token record.
    ///
    /// Returns `Ok(None)` when no record exists and `TokenCorrupt` when the
    /// file exists but cannot be read or parsed.
    pub fn load_token_record(&self) -> AuthResult<Option<TokenRecord>> {
        let path = &self.token_path;
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no token file");
                return Ok(None);
            }
            Err(e) => return Err(AuthError::token_corrupt(path, e)),
        };
        warn_if_exposed(path);

        let record: TokenRecord =
            serde_json::from_str(&content).map_err(|e| AuthError::token_corrupt(path, e))?;
        debug!(path = %path.display(), "loaded token record");
        Ok(Some(record))
    }

    /// Atomically replaces the token record on disk.
    pub fn save_token_record(&self, record: &TokenRecord) -> AuthResult<()> {
        self.ensure_private_dir()?;
        let _lock = FileLock::acquire(&self.lock_path())?;

        let temp_path = self.write_temp(record)?;
        self.commit(&temp_path)?;

        info!(path = %self.token_path.display(), "saved token record");
        Ok(())
    }

    /// Deletes the token record. Returns true if a record was removed.
    pub fn delete_token_record(&self) -> AuthResult<bool> {
        let _lock = match self.token_path.parent() {
            Some(parent) if parent.exists() => Some(FileLock::acquire(&self.lock_path())?),
            _ => None,
        };

        match fs::remove_file(&self.token_path) {
            Ok(()) => {
                info!(path = %self.token_path.display(), "removed token record");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AuthError::io("remove", &self.token_path, &e)),
        }
    }

    fn temp_path(&self) -> PathBuf {
        self.token_path.with_extension("json.tmp")
    }

    fn lock_path(&self) -> PathBuf {
        self.token_path.with_extension("json.lock")
    }

    /// Creates the token directory if needed and restricts it to the owner.
    fn ensure_private_dir(&self) -> AuthResult<()> {
        let Some(parent) = self.token_path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };

        fs::create_dir_all(parent).map_err(|e| AuthError::io("create directory", parent, &e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| AuthError::io("restrict permissions of", parent, &e))?;
        }
        Ok(())
    }

    /// Writes the serialized record to the temp file and flushes it to disk.
    pub(crate) fn write_temp(&self, record: &TokenRecord) -> AuthResult<PathBuf> {
        let temp_path = self.temp_path();
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| AuthError::internal(format!("failed to serialize token record: {}", e)))?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&temp_path)
            .map_err(|e| AuthError::io("create", &temp_path, &e))?;

        // A leftover temp file from a crashed run keeps its old mode.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| AuthError::io("restrict permissions of", &temp_path, &e))?;
        }

        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| AuthError::io("write", &temp_path, &e))?;

        Ok(temp_path)
    }

    /// Renames the temp file over the token record.
    fn commit(&self, temp_path: &Path) -> AuthResult<()> {
        fs::rename(temp_path, &self.token_path)
            .map_err(|e| AuthError::io("rename token file to", &self.token_path, &e))?;

        // Persist the rename itself.
        #[cfg(unix)]
        {
            if let Some(parent) = self.token_path.parent().filter(|p| !p.as_os_str().is_empty())
                && let Ok(dir) = File::open(parent)
            {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

/// Logs a warning when a credential file is readable by group or others.
fn warn_if_exposed(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(path) {
            let mode = metadata.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                warn!(
                    path = %path.display(),
                    mode = %format!("{:o}", mode),
                    "credential file is accessible by other users, run `chmod 600` on it"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Exclusive advisory lock on a sibling lock file, released on drop.
///
/// Serializes token writes between processes sharing the same directory.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> AuthResult<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options
            .open(path)
            .map_err(|e| AuthError::io("open lock file", path, &e))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // Blocks until no other process holds the lock.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                return Err(AuthError::io("lock", path, &err));
            }
        }

        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorCode;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn sample_record() -> TokenRecord {
        TokenRecord {
            access_token: "A1".to_string(),
            refresh_token: Some("R1".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "abc".to_string(),
            client_secret: "secret".to_string(),
            scopes: BTreeSet::from(["scope1".to_string(), "scope2".to_string()]),
            expiry: Some(Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 15).unwrap()),
        }
    }

    fn store_in(dir: &Path) -> CredentialStore {
        CredentialStore::new(
            dir.join("credentials.json"),
            dir.join("google-oauth").join("token.json"),
        )
    }

    #[test]
    fn missing_descriptor() {
        let dir = tempdir().unwrap();
        let err = store_in(dir.path()).load_client_descriptor().unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::ConfigMissing);
    }

    #[test]
    fn malformed_descriptor() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.client_path(), r#"{"installed": {"client_id": "abc"}}"#).unwrap();
        let err = store.load_client_descriptor().unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::ConfigMalformed);

        fs::write(store.client_path(), "{").unwrap();
        let err = store.load_client_descriptor().unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::ConfigMalformed);
    }

    #[test]
    fn loads_descriptor() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(
            store.client_path(),
            r#"{"installed": {"client_id": "abc", "client_secret": "s", "redirect_uris": ["http://localhost"]}}"#,
        )
        .unwrap();
        let descriptor = store.load_client_descriptor().unwrap();
        assert_eq!(descriptor.client_id, "abc");
    }

    #[test]
    fn absent_token_record() {
        let dir = tempdir().unwrap();
        assert!(store_in(dir.path()).load_token_record().unwrap().is_none());
    }

    #[test]
    fn corrupt_token_record() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::create_dir_all(store.token_path().parent().unwrap()).unwrap();
        fs::write(store.token_path(), r#"{"token": "A1", "#).unwrap();
        let err = store.load_token_record().unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::TokenCorrupt);
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let record = sample_record();

        store.save_token_record(&record).unwrap();
        let loaded = store.load_token_record().unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn save_replaces_existing_record() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.save_token_record(&sample_record()).unwrap();

        let mut updated = sample_record();
        updated.access_token = "A2".to_string();
        store.save_token_record(&updated).unwrap();

        let loaded = store.load_token_record().unwrap().unwrap();
        assert_eq!(loaded.access_token, "A2");
    }

    #[cfg(unix)]
    #[test]
    fn save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let parent = store.token_path().parent().unwrap().to_path_buf();
        fs::create_dir_all(&parent).unwrap();
        fs::set_permissions(&parent, fs::Permissions::from_mode(0o755)).unwrap();

        store.save_token_record(&sample_record()).unwrap();

        let file_mode = fs::metadata(store.token_path()).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(&parent).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn crash_before_rename_keeps_previous_record() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let original = sample_record();
        store.save_token_record(&original).unwrap();

        let mut newer = sample_record();
        newer.access_token = "A2".to_string();
        // Simulate a crash after the temp write but before the rename.
        let temp = store.write_temp(&newer).unwrap();
        assert!(temp.exists());

        let loaded = store.load_token_record().unwrap().unwrap();
        assert_eq!(loaded, original);

        // The next save overwrites the stale temp file.
        store.save_token_record(&newer).unwrap();
        assert_eq!(store.load_token_record().unwrap().unwrap().access_token, "A2");
        assert!(!temp.exists());
    }

    #[test]
    fn crash_before_first_rename_leaves_no_record() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        store.ensure_private_dir().unwrap();
        store.write_temp(&sample_record()).unwrap();
        assert!(store.load_token_record().unwrap().is_none());
    }

    #[test]
    fn delete_token_record() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!store.delete_token_record().unwrap());

        store.save_token_record(&sample_record()).unwrap();
        assert!(store.delete_token_record().unwrap());
        assert!(store.load_token_record().unwrap().is_none());
    }
}
