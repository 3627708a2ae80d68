use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ── Error ──────────────────────────────────────────────────────────────────────

/// Errors that can occur while loading configuration.
///
/// Any of these is fatal at startup: the process must refuse to run before a
/// single connection attempt is made.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable was not set.
    Missing { var: &'static str },
    /// An environment variable contained an unparseable value.
    Parse {
        var: &'static str,
        raw: String,
        expected: &'static str,
    },
    /// A value was parsed successfully but violated a constraint.
    InvalidValue {
        var: &'static str,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { var } => write!(f, "env {var} is required but not set"),
            Self::Parse { var, raw, expected } => {
                write!(f, "env {var}={raw:?} — expected {expected}")
            }
            Self::InvalidValue { var, message } => write!(f, "env {var}: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ── Acknowledgement mode ───────────────────────────────────────────────────────

/// When a consumed message is acknowledged to the broker.
///
/// `OnReceipt` acknowledges on delivery, before any processing: at-most-once,
/// a crash mid-job loses that job. `OnCompletion` acknowledges only after the
/// work pipeline finishes, so an interrupted job is redelivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    OnReceipt,
    OnCompletion,
}

impl FromStr for AckMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_receipt" => Ok(Self::OnReceipt),
            "on_completion" => Ok(Self::OnCompletion),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for AckMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnReceipt => write!(f, "on_receipt"),
            Self::OnCompletion => write!(f, "on_completion"),
        }
    }
}

// ── Config ─────────────────────────────────────────────────────────────────────

/// Centralised application configuration.
///
/// Loaded once at startup by the composition root and passed down explicitly —
/// there is no process-global instance. Broker settings are mandatory;
/// everything else has a hardcoded default. [`Config::load`] validates every
/// value eagerly so any misconfiguration is reported before any connection
/// attempt is made.
#[derive(Debug, Clone)]
pub struct Config {
    // ── RabbitMQ ──────────────────────────────────────────────────────────────
    /// Broker host. Env: `RABBITMQ_HOST` · required
    pub rabbitmq_host: String,

    /// Broker port. Env: `RABBITMQ_PORT` · Default: `5672`
    pub rabbitmq_port: u16,

    /// Broker username. Env: `RABBITMQ_USR` · required
    pub rabbitmq_user: String,

    /// Broker password. Env: `RABBITMQ_PAW` · required
    pub rabbitmq_password: String,

    /// Durable queue name, declared idempotently at connect time.
    /// Env: `RABBITMQ_QUEUE` · required
    pub rabbitmq_queue: String,

    /// AMQP heartbeat interval in seconds.
    /// Env: `RABBITMQ_HEARTBEAT` · Default: `60` · Constraint: ≥ 1
    pub heartbeat_secs: u16,

    /// Fixed delay between reconnect attempts.
    /// Env: `RECONNECT_DELAY_SEC` · Default: `5` · Constraint: ≥ 1
    pub reconnect_delay: Duration,

    // ── Consumption ───────────────────────────────────────────────────────────
    /// Acknowledgement policy for consumed messages.
    /// Env: `ACK_MODE` · Default: `on_receipt`
    pub ack_mode: AckMode,

    /// Maximum age of a job, measured from its embedded `time` field to
    /// processing time. Older jobs are discarded without processing.
    /// Env: `JOB_MAX_AGE_SEC` · Default: `60` · Constraint: ≥ 1
    pub job_max_age: Duration,

    /// Number of concurrent transcription workers.
    /// Env: `WORKERS_COUNT` · Default: `4` · Constraint: ≥ 1
    pub workers_count: usize,

    // ── Work pipeline ─────────────────────────────────────────────────────────
    /// Maximum accepted download size in megabytes.
    /// Env: `MAX_DOWNLOAD_MB` · Default: `512` · Constraint: ≥ 1
    pub max_download_mb: u64,

    /// Scratch directory for downloaded audio. Created at startup.
    /// Env: `TMP_DIR` · Default: `/tmp/scribeq`
    pub tmp_dir: PathBuf,

    /// GGML model identifier, used to derive [`Config::model_path`].
    /// Env: `WHISPER_MODEL` · Default: `tiny`
    pub whisper_model: String,

    /// Directory where GGML `.bin` model files are stored.
    /// Env: `MODELS_DIR` · Default: `/app/models`
    pub models_dir: PathBuf,
}

impl Config {
    /// Load and validate configuration from process environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// `load()` delegates here with `std::env::var`; tests supply a closure
    /// over a map so they never mutate process-global state.
    pub fn load_with(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // ── RabbitMQ ──────────────────────────────────────────────────────────
        let rabbitmq_host = required(&get, "RABBITMQ_HOST")?;
        let rabbitmq_port = parse(&get, "RABBITMQ_PORT", 5672_u16, "port number (1–65535)")?;
        validate("RABBITMQ_PORT", rabbitmq_port > 0, "must be in range 1–65535")?;
        let rabbitmq_user = required(&get, "RABBITMQ_USR")?;
        let rabbitmq_password = required(&get, "RABBITMQ_PAW")?;
        let rabbitmq_queue = required(&get, "RABBITMQ_QUEUE")?;

        let heartbeat_secs = parse(&get, "RABBITMQ_HEARTBEAT", 60_u16, "seconds")?;
        validate("RABBITMQ_HEARTBEAT", heartbeat_secs >= 1, "must be ≥ 1")?;

        let reconnect_delay_sec = parse(&get, "RECONNECT_DELAY_SEC", 5_u64, "seconds")?;
        validate("RECONNECT_DELAY_SEC", reconnect_delay_sec >= 1, "must be ≥ 1")?;

        // ── Consumption ───────────────────────────────────────────────────────
        let ack_mode = match get("ACK_MODE") {
            None => AckMode::OnReceipt,
            Some(raw) => raw.trim().parse::<AckMode>().map_err(|_| ConfigError::Parse {
                var: "ACK_MODE",
                raw,
                expected: "\"on_receipt\" or \"on_completion\"",
            })?,
        };

        let job_max_age_sec = parse(&get, "JOB_MAX_AGE_SEC", 60_u64, "seconds")?;
        validate("JOB_MAX_AGE_SEC", job_max_age_sec >= 1, "must be ≥ 1")?;

        let workers_count = parse(&get, "WORKERS_COUNT", 4_usize, "unsigned integer")?;
        validate("WORKERS_COUNT", workers_count >= 1, "must be ≥ 1")?;

        // ── Work pipeline ─────────────────────────────────────────────────────
        let max_download_mb = parse(&get, "MAX_DOWNLOAD_MB", 512_u64, "unsigned integer")?;
        validate("MAX_DOWNLOAD_MB", max_download_mb >= 1, "must be ≥ 1")?;

        let tmp_dir = PathBuf::from(optional(&get, "TMP_DIR", "/tmp/scribeq"));
        let whisper_model = optional(&get, "WHISPER_MODEL", "tiny");
        validate("WHISPER_MODEL", !whisper_model.is_empty(), "must not be empty")?;
        let models_dir = PathBuf::from(optional(&get, "MODELS_DIR", "/app/models"));

        Ok(Self {
            rabbitmq_host,
            rabbitmq_port,
            rabbitmq_user,
            rabbitmq_password,
            rabbitmq_queue,
            heartbeat_secs,
            reconnect_delay: Duration::from_secs(reconnect_delay_sec),
            ack_mode,
            job_max_age: Duration::from_secs(job_max_age_sec),
            workers_count,
            max_download_mb,
            tmp_dir,
            whisper_model,
            models_dir,
        })
    }

    // ── Derived helpers ───────────────────────────────────────────────────────

    /// Absolute path to the GGML model file: `{models_dir}/ggml-{whisper_model}.bin`.
    pub fn model_path(&self) -> PathBuf {
        self.models_dir
            .join(format!("ggml-{}.bin", self.whisper_model))
    }

    /// `max_download_mb` converted to bytes for the downloader cap.
    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_mb * 1_024 * 1_024
    }

    /// Log a summary of the loaded configuration.
    /// The password is deliberately absent.
    pub fn log_summary(&self) {
        tracing::info!(
            broker      = %format!("{}:{}", self.rabbitmq_host, self.rabbitmq_port),
            user        = %self.rabbitmq_user,
            queue       = %self.rabbitmq_queue,
            heartbeat   = self.heartbeat_secs,
            reconnect_s = self.reconnect_delay.as_secs(),
            ack_mode    = %self.ack_mode,
            max_age_s   = self.job_max_age.as_secs(),
            workers     = self.workers_count,
            model       = %self.whisper_model,
            tmp_dir     = %self.tmp_dir.display(),
            "configuration loaded"
        );
    }
}

// ── Private lookup helpers ─────────────────────────────────────────────────────

/// Fetch a required variable; unset is [`ConfigError::Missing`], empty (after
/// trimming) is rejected as invalid.
fn required(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<String, ConfigError> {
    let raw = get(var).ok_or(ConfigError::Missing { var })?;
    let value = raw.trim().to_string();
    validate(var, !value.is_empty(), "must not be empty")?;
    Ok(value)
}

/// Fetch an optional variable, falling back to `default` when unset.
fn optional(get: &impl Fn(&str) -> Option<String>, var: &str, default: &str) -> String {
    get(var).unwrap_or_else(|| default.to_string())
}

/// Parse an optional variable into any `FromStr` type, falling back to
/// `default` when unset.
fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Parse { var, raw, expected }),
    }
}

/// Emit a `ConfigError::InvalidValue` if `condition` is false.
fn validate(var: &'static str, condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            var,
            message: message.to_string(),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("RABBITMQ_HOST", "mq.internal"),
            ("RABBITMQ_USR", "worker"),
            ("RABBITMQ_PAW", "secret"),
            ("RABBITMQ_QUEUE", "stt_jobs"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::load_with(|var| env.get(var).map(|v| v.to_string()))
    }

    #[test]
    fn minimal_env_applies_defaults() {
        let cfg = load(&base_env()).unwrap();

        assert_eq!(cfg.rabbitmq_host, "mq.internal");
        assert_eq!(cfg.rabbitmq_port, 5672);
        assert_eq!(cfg.rabbitmq_queue, "stt_jobs");
        assert_eq!(cfg.heartbeat_secs, 60);
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(5));
        assert_eq!(cfg.ack_mode, AckMode::OnReceipt);
        assert_eq!(cfg.job_max_age, Duration::from_secs(60));
        assert_eq!(cfg.workers_count, 4);
    }

    #[test]
    fn missing_required_variable_is_fatal() {
        for var in ["RABBITMQ_HOST", "RABBITMQ_USR", "RABBITMQ_PAW", "RABBITMQ_QUEUE"] {
            let mut env = base_env();
            env.remove(var);
            match load(&env) {
                Err(ConfigError::Missing { var: missing }) => assert_eq!(missing, var),
                other => panic!("expected Missing for {var}, got {other:?}"),
            }
        }
    }

    #[test]
    fn empty_required_variable_is_rejected() {
        let mut env = base_env();
        env.insert("RABBITMQ_QUEUE", "  ");
        assert!(matches!(
            load(&env),
            Err(ConfigError::InvalidValue { var: "RABBITMQ_QUEUE", .. })
        ));
    }

    #[test]
    fn unparseable_port_is_rejected() {
        let mut env = base_env();
        env.insert("RABBITMQ_PORT", "not-a-port");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Parse { var: "RABBITMQ_PORT", .. })
        ));
    }

    #[test]
    fn ack_mode_parses_both_variants() {
        let mut env = base_env();
        env.insert("ACK_MODE", "on_completion");
        assert_eq!(load(&env).unwrap().ack_mode, AckMode::OnCompletion);

        env.insert("ACK_MODE", "on_receipt");
        assert_eq!(load(&env).unwrap().ack_mode, AckMode::OnReceipt);

        env.insert("ACK_MODE", "sometimes");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Parse { var: "ACK_MODE", .. })
        ));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut env = base_env();
        env.insert("WORKERS_COUNT", "0");
        assert!(matches!(
            load(&env),
            Err(ConfigError::InvalidValue { var: "WORKERS_COUNT", .. })
        ));
    }

    #[test]
    fn model_path_follows_ggml_convention() {
        let mut env = base_env();
        env.insert("WHISPER_MODEL", "base.q5_0");
        env.insert("MODELS_DIR", "/models");
        let cfg = load(&env).unwrap();
        assert_eq!(cfg.model_path(), PathBuf::from("/models/ggml-base.q5_0.bin"));
    }
}
