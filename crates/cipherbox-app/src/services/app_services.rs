// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: opens every backend subsystem and exposes the
// operations callers are allowed to perform.
//
// The SQLite-backed stores are `Send` but not `Sync`, so each is wrapped in
// `Arc<Mutex<>>`.  Each store has its own connection to the same database
// file, so a long text operation never holds the audit log's lock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cipherbox_core::AppConfig;
use cipherbox_core::error::{CipherboxError, Result};
use cipherbox_core::types::{
    AuditEntry, CipherOutcome, Credential, Identity, IdentityId, Operation, TextId, TextRecord,
};
use cipherbox_security::token::{self, TokenIssuer, TokenValidator};
use cipherbox_security::{AuditLog, cipher};
use cipherbox_store::{IdentityStore, TextRepository, database};
use tracing::{info, instrument, warn};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";
const SECRET_FILE: &str = "token.key";

/// Shared application services.
///
/// All fields are cheaply cloneable so the struct can be handed to worker
/// threads without lifetime issues.
#[derive(Clone)]
pub struct AppServices {
    texts: Arc<Mutex<TextRepository>>,
    identities: Arc<Mutex<IdentityStore>>,
    audit_log: Arc<Mutex<AuditLog>>,
    issuer: TokenIssuer,
    validator: TokenValidator,
    config: AppConfig,
    data_dir: PathBuf,
}

impl AppServices {
    /// Initialise all services in the default data directory.
    pub fn init() -> Result<Self> {
        Self::open(data_dir::data_dir()?)
    }

    /// Initialise all services in `dir`.
    ///
    /// Loads `config.json` (writing the defaults on first start), loads or
    /// creates the token signing secret, and opens the database.  An
    /// unreadable `config.json` is left untouched and the defaults are used.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let config = match load_config(&dir) {
            Ok(Some(config)) => config,
            Ok(None) => {
                let config = AppConfig::default();
                persist_config(&dir, &config)?;
                config
            }
            Err(e) => {
                warn!(error = %e, "config.json unreadable, using defaults");
                AppConfig::default()
            }
        };
        Self::open_with(dir, config)
    }

    /// Initialise all services in `dir` with an explicit configuration.
    pub fn open_with(dir: impl Into<PathBuf>, config: AppConfig) -> Result<Self> {
        let dir = dir.into();
        info!(path = %dir.display(), "initialising app services");

        let secret = load_or_create_secret(&dir)?;
        let issuer = TokenIssuer::new(&secret, config.token_ttl_secs)?;
        let validator = issuer.validator();

        let db_path = dir.join(&config.database_file);
        let identities = IdentityStore::open(&db_path, &config)?;
        let texts = TextRepository::open(&db_path, &config)?;
        let audit_conn = database::open(&db_path, Duration::from_millis(config.busy_timeout_ms))?;
        let audit_log = AuditLog::from_connection(audit_conn);

        info!("app services initialised");
        Ok(Self {
            texts: Arc::new(Mutex::new(texts)),
            identities: Arc::new(Mutex::new(identities)),
            audit_log: Arc::new(Mutex::new(audit_log)),
            issuer,
            validator,
            config,
            data_dir: dir,
        })
    }

    // -- Accounts ------------------------------------------------------------

    /// Create an account.
    pub fn register(&self, email: &str, password: &str) -> Result<Identity> {
        lock(&self.identities, "identity store")?.register(email, password)
    }

    /// Check a password and issue a credential.
    #[instrument(skip(self, password))]
    pub fn login(&self, email: &str, password: &str) -> Result<Credential> {
        let identity = lock(&self.identities, "identity store")?.authenticate(email, password)?;
        let credential = self.issuer.issue(identity.id)?;
        info!(id = %identity.id, "login succeeded");
        Ok(credential)
    }

    /// Replace an account password.
    pub fn change_password(&self, email: &str, old_password: &str, new_password: &str) -> Result<()> {
        lock(&self.identities, "identity store")?.change_password(email, old_password, new_password)
    }

    /// Resolve `token` to the identity it was issued for.
    ///
    /// Runs before every other call, so an expired or forged token never
    /// reaches a store.
    pub fn authenticate(&self, token: &str) -> Result<IdentityId> {
        Ok(self.validator.validate(token)?)
    }

    // -- Cipher --------------------------------------------------------------

    /// Encode free text and record the operation.
    pub fn encrypt(&self, token: &str, text: &str, key: &str) -> Result<CipherOutcome> {
        let caller = self.authenticate(token)?;
        let result_text = cipher::encode(text, key)?;
        self.record(
            Operation::Encrypt,
            caller,
            &format!("encrypted {} characters", text.chars().count()),
        )?;
        Ok(CipherOutcome {
            original_text: text.to_owned(),
            result_text,
        })
    }

    /// Decode free text and record the operation.
    pub fn decrypt(&self, token: &str, text: &str, key: &str) -> Result<CipherOutcome> {
        let caller = self.authenticate(token)?;
        let result_text = cipher::decode(text, key)?;
        self.record(
            Operation::Decrypt,
            caller,
            &format!("decrypted {} characters", text.chars().count()),
        )?;
        Ok(CipherOutcome {
            original_text: text.to_owned(),
            result_text,
        })
    }

    /// Encode a stored text.  The stored content is left as it is.
    pub fn encrypt_text(&self, token: &str, id: TextId, key: &str) -> Result<CipherOutcome> {
        self.transform_text(token, id, key, Transform::Encode)
    }

    /// Decode a stored text.  The stored content is left as it is.
    pub fn decrypt_text(&self, token: &str, id: TextId, key: &str) -> Result<CipherOutcome> {
        self.transform_text(token, id, key, Transform::Decode)
    }

    fn transform_text(
        &self,
        token: &str,
        id: TextId,
        key: &str,
        transform: Transform,
    ) -> Result<CipherOutcome> {
        let caller = self.authenticate(token)?;
        let record = lock(&self.texts, "text repository")?.read(id, caller)?;

        let result_text = transform.apply(&record.content, key)?;
        self.record(
            transform.operation(),
            caller,
            &format!(
                "{} text {id} ({} characters)",
                transform.verb(),
                record.content.chars().count()
            ),
        )?;

        Ok(CipherOutcome {
            original_text: record.content,
            result_text,
        })
    }

    // -- Texts ---------------------------------------------------------------

    /// Store a new text for the caller.
    pub fn add_text(&self, token: &str, content: &str, requested_id: Option<TextId>) -> Result<TextRecord> {
        let caller = self.authenticate(token)?;
        lock(&self.texts, "text repository")?.create(caller, content, requested_id)
    }

    /// Fetch one of the caller's texts.
    pub fn get_text(&self, token: &str, id: TextId) -> Result<TextRecord> {
        let caller = self.authenticate(token)?;
        lock(&self.texts, "text repository")?.read(id, caller)
    }

    /// Replace the content of one of the caller's texts.
    pub fn update_text(&self, token: &str, id: TextId, content: &str) -> Result<()> {
        let caller = self.authenticate(token)?;
        lock(&self.texts, "text repository")?.update(id, caller, content)
    }

    /// Delete one of the caller's texts and return what it held.
    pub fn delete_text(&self, token: &str, id: TextId) -> Result<TextRecord> {
        let caller = self.authenticate(token)?;
        lock(&self.texts, "text repository")?.delete(id, caller)
    }

    /// All of the caller's texts.
    pub fn list_texts(&self, token: &str) -> Result<Vec<TextRecord>> {
        let caller = self.authenticate(token)?;
        lock(&self.texts, "text repository")?.list_for(caller)
    }

    // -- Audit Trail ---------------------------------------------------------

    /// The caller's most recent audit entries, newest first.
    pub fn history(&self, token: &str, limit: Option<u32>) -> Result<Vec<AuditEntry>> {
        let caller = self.authenticate(token)?;
        let limit = self.config.audit_limit(limit);
        lock(&self.audit_log, "audit log")?.recent_for(caller, limit)
    }

    /// Remove the caller's whole audit trail.
    pub fn clear_history(&self, token: &str) -> Result<u64> {
        let caller = self.authenticate(token)?;
        lock(&self.audit_log, "audit log")?.delete_all_for(caller)
    }

    fn record(&self, operation: Operation, caller: IdentityId, details: &str) -> Result<()> {
        lock(&self.audit_log, "audit log")?.record(operation, caller, details)?;
        Ok(())
    }

    // -- Config --------------------------------------------------------------

    /// The configuration the services were opened with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Path to the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Cipher direction applied to a stored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transform {
    Encode,
    Decode,
}

impl Transform {
    fn apply(self, text: &str, key: &str) -> Result<String> {
        match self {
            Self::Encode => cipher::encode(text, key),
            Self::Decode => cipher::decode(text, key),
        }
    }

    fn operation(self) -> Operation {
        match self {
            Self::Encode => Operation::Encrypt,
            Self::Decode => Operation::Decrypt,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Encode => "encrypted",
            Self::Decode => "decrypted",
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| CipherboxError::LockPoisoned(name))
}

// -- Config file persistence -------------------------------------------------

/// `Ok(None)` when no config file exists yet.
fn load_config(data_dir: &Path) -> Result<Option<AppConfig>> {
    let path = data_dir.join(CONFIG_FILE);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&data)?))
}

fn persist_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}

// -- Signing secret ----------------------------------------------------------

/// Read the hex-encoded signing secret, generating it on first use.
fn load_or_create_secret(data_dir: &Path) -> Result<Vec<u8>> {
    let path = data_dir.join(SECRET_FILE);
    if path.exists() {
        let encoded = std::fs::read_to_string(&path)?;
        return hex::decode(encoded.trim()).map_err(|e| {
            CipherboxError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not valid hex: {e}", path.display()),
            ))
        });
    }

    let secret = token::generate_secret()?;
    std::fs::write(&path, hex::encode(secret))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    info!(path = %path.display(), "token signing secret created");
    Ok(secret.to_vec())
}
