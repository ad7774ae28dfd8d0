// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const AUTH_PATH: &str = "auth";

// Token and session lifetimes (seconds)
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 3600;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 3600;
pub const DEFAULT_CLOCK_LEEWAY_SECS: u64 = 5;
pub const DEFAULT_KEY_ROTATION_OVERLAP_SECS: u64 = 24 * 3600;
pub const DEFAULT_KEY_ID: &str = "k1";

// Session token entropy (bytes)
pub const SESSION_TOKEN_BYTES: usize = 32;

// Argon2id cost (OWASP minimum: m=19456 KiB, t=2, p=1)
pub const DEFAULT_HASH_MEMORY_KIB: u32 = 19456;
pub const DEFAULT_HASH_ITERATIONS: u32 = 2;
pub const DEFAULT_HASH_PARALLELISM: u32 = 1;

// Login rate limiting
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 300;
pub const DEFAULT_RATE_LIMIT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RATE_LIMIT_TRACKED_KEYS: usize = 10_000;

// Hashing worker pool
pub const DEFAULT_HASHING_POOL_SIZE: usize = 4;
pub const DEFAULT_MAX_QUEUED_HASHES: usize = 256;

// External call bounds
pub const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MIN_FAILURE_DURATION_MS: u64 = 100;

// Session cookie
pub const DEFAULT_SESSION_COOKIE: &str = "rg_session";

// Roles assigned to newly registered users
pub const DEFAULT_USER_ROLE: &str = "viewer";
