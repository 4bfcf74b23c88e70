/// Sessions older than this are closed and recreated before their next use.
pub const MAX_SESSION_AGE_DAYS: i64 = 5;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://shop.amul.com";
pub const DEFAULT_UPSTREAM_STORE_ID: &str = "62fa94df8c13af2e242eba16";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";

/// Longest text a single Telegram message may carry, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Tracking records are created with this many notifications available.
pub const DEFAULT_NOTIFY_BUDGET: i32 = 1;
pub const DEFAULT_MAX_NOTIFY_COUNT: i32 = 3;
pub const MIN_MAX_NOTIFY_COUNT: i32 = 1;
pub const MAX_MAX_NOTIFY_COUNT: i32 = 100;

/// Cache key namespaces
pub const CACHE_NAMESPACE: &str = "stockwatch";
pub const READ_CACHE_PREFIX: &str = const_str::concat!(CACHE_NAMESPACE, ":products:");
pub const JOB_CACHE_PREFIX: &str = const_str::concat!(CACHE_NAMESPACE, ":jobdata:");

/// Format of activity day keys, evaluated in the configured timezone.
pub const DAY_KEY_FORMAT: &str = "%d-%m-%Y";
