use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ConcurrencyWorkers,
    ConcurrencyUpload,
    InputBucket,
    OutputBucket,
    LocalStoragePath,
    RabbitMqUrl,
    ConsumerQueue,
    ConsumerName,
    DeadLetterExchange,
    NotificationExchange,
    NotificationRoutingKey,
    Dsn,
    DsnTest,
    AutoMigrateDb,
    Debug,
    Env,
    S3Endpoint,
    S3AccessKey,
    S3SecretKey,
    Mp4FragmentPath,
    Mp4DashPath,
    Bento4BinPath,
    ToolTimeoutSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ConcurrencyWorkers => "CONCURRENCY_WORKERS",
            EnvKey::ConcurrencyUpload => "CONCURRENCY_UPLOAD",
            EnvKey::InputBucket => "inputBucketName",
            EnvKey::OutputBucket => "outputBucketName",
            EnvKey::LocalStoragePath => "localStoragePath",
            EnvKey::RabbitMqUrl => "RABBITMQ_URL",
            EnvKey::ConsumerQueue => "RABBITMQ_CONSUMER_QUEUE_NAME",
            EnvKey::ConsumerName => "RABBITMQ_CONSUMER_NAME",
            EnvKey::DeadLetterExchange => "RABBITMQ_DLX",
            EnvKey::NotificationExchange => "RABBITMQ_NOTIFICATION_EX",
            EnvKey::NotificationRoutingKey => "RABBITMQ_NOTIFICATION_ROUTING_KEY",
            EnvKey::Dsn => "DSN",
            EnvKey::DsnTest => "DSN_TEST",
            EnvKey::AutoMigrateDb => "AUTO_MIGRATE_DB",
            EnvKey::Debug => "DEBUG",
            EnvKey::Env => "ENV",
            EnvKey::S3Endpoint => "S3_ENDPOINT",
            EnvKey::S3AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::S3SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::Mp4FragmentPath => "MP4FRAGMENT_PATH",
            EnvKey::Mp4DashPath => "MP4DASH_PATH",
            EnvKey::Bento4BinPath => "BENTO4_BIN_PATH",
            EnvKey::ToolTimeoutSecs => "EXTERNAL_TOOL_TIMEOUT_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
