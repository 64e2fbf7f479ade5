use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `Altaira`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum GatewayError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Session / persistence ───────────────────────────────────────────
    #[error("session: {0}")]
    Session(#[from] SessionError),

    // ── Quota policy ────────────────────────────────────────────────────
    #[error("quota: {0}")]
    Quota(#[from] QuotaError),

    // ── Payment workflow ────────────────────────────────────────────────
    #[error("payment: {0}")]
    Payment(#[from] PaymentError),

    // ── LLM / Provider ──────────────────────────────────────────────────
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    // ── Transport / Channel ─────────────────────────────────────────────
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    // ── Document ingestion ──────────────────────────────────────────────
    #[error("ingest: {0}")]
    Ingest(#[from] IngestError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("tier plan table incomplete: {0}")]
    PlanTable(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Session errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(i64),

    #[error("stale write for user {user_id} (version {version})")]
    StaleWrite { user_id: i64, version: i64 },

    #[error("store: {0}")]
    Store(String),
}

// ─── Quota errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("{resource} limit reached ({used}/{limit})")]
    Exceeded {
        resource: &'static str,
        used: u32,
        limit: u32,
    },
}

// ─── Payment errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("malformed payment payload: {0}")]
    MalformedPayload(String),

    #[error("unknown plan code: {0}")]
    UnknownPlan(String),

    #[error("payment provider {0} has no configured credential")]
    ProviderUnavailable(String),

    #[error("plan {0} is not purchasable")]
    NotPurchasable(String),
}

// ─── LLM / Provider errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} returned an empty response")]
    EmptyResponse { provider: String },

    #[error("provider {provider} authentication failed")]
    Auth { provider: String },
}

// ─── Transport errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel {channel} connection failed: {message}")]
    Connection { channel: String, message: String },

    #[error("channel {channel} send failed: {message}")]
    Send { channel: String, message: String },

    #[error("file {file_id} could not be fetched: {message}")]
    FileFetch { file_id: String, message: String },
}

// ─── Ingestion errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("extraction failed: {0}")]
    Extraction(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
