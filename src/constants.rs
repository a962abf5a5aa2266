/// Application constants

use crate::models::ChainId;

// Explorer domains, most specific first. `optimistic.etherscan.io` must be
// checked before `etherscan.io` since the latter is a substring of it.
pub const CHAIN_DOMAINS: &[(&str, ChainId)] = &[
    ("optimistic.etherscan.io", ChainId::Optimism),
    ("arbiscan.io", ChainId::Arbitrum),
    ("basescan.org", ChainId::Base),
    ("polygonscan.com", ChainId::Polygon),
    ("bscscan.com", ChainId::Bsc),
    ("etherscan.io", ChainId::Ethereum),
];

// Whole-word chain names (second resolver pass), same priority rule.
pub const CHAIN_NAMES: &[(&str, ChainId)] = &[
    ("optimism", ChainId::Optimism),
    ("arbitrum", ChainId::Arbitrum),
    ("base", ChainId::Base),
    ("polygon", ChainId::Polygon),
    ("matic", ChainId::Polygon),
    ("bsc", ChainId::Bsc),
    ("bnb", ChainId::Bsc),
    ("ethereum", ChainId::Ethereum),
    ("eth", ChainId::Ethereum),
    ("mainnet", ChainId::Ethereum),
];

// Transaction hash shape
pub const TX_HASH_PREFIX: &str = "0x";
pub const TX_HASH_HEX_LEN: usize = 64;
pub const TX_PATH_MARKER: &str = "/tx/";

// Values treated as absent by the normalizer (compared case-insensitively)
pub const NULL_TOKENS: &[&str] = &["", "n/a", "na", "null", "none", "nan"];

// Currency markers stripped before numeric coercion
pub const CURRENCY_MARKERS: &[&str] = &["usd", "eth", "$", "€", "£", "Ξ"];

// Column aliases (lower-case, trimmed header names), in lookup order
pub const TX_FIELDS: &[&str] = &[
    "tx_link",
    "tx link",
    "transaction link",
    "transaction_link",
    "tx_hash",
    "transaction hash",
    "hash",
    "tx",
    "link",
    "url",
];
// Free-text columns that may carry a transaction hash when no tx column does
pub const FREE_TEXT_FIELDS: &[&str] = &[
    "reference",
    "note",
    "notes",
    "memo",
    "description",
    "details",
    "comment",
    "comments",
    "remarks",
];
pub const CHAIN_FIELDS: &[&str] = &["chain", "network", "blockchain"];
pub const CATEGORY_FIELDS: &[&str] = &["purpose", "expense_category", "expense category", "category"];
pub const USD_AMOUNT_FIELDS: &[&str] = &[
    "amount in usd",
    "amount_in_usd",
    "amount_usd",
    "usd amount",
    "amount (usd)",
    "usd",
    "amount",
];
pub const ETH_AMOUNT_FIELDS: &[&str] = &[
    "amount in eth",
    "amount_in_eth",
    "amount_eth",
    "eth amount",
    "amount (eth)",
    "eth",
];
pub const REQUEST_TYPE_FIELDS: &[&str] = &["type", "request", "action", "purpose", "note", "notes"];
pub const ACCOUNT_FIELDS: &[&str] = &["account_id", "account", "account id"];

pub const RECEIPT_KEYWORDS: &[&str] = &["receipt", "receipts"];

// Parameter names
pub const PARAM_TX_HASH: &str = "tx_hash";
pub const PARAM_CHAIN: &str = "chain";
pub const PARAM_EXPENSE_CATEGORY: &str = "expense_category";
pub const PARAM_AMOUNT_IN_USD: &str = "amount_in_usd";
pub const PARAM_AMOUNT_IN_ETH: &str = "amount_in_eth";
pub const PARAM_ACCOUNT_ID: &str = "account_id";
pub const PARAM_AMOUNT: &str = "amount";

// Executor defaults
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SYSTEMIC_FAILURE_THRESHOLD: u32 = 5;

// Builder defaults
pub const DEFAULT_CHAIN: &str = "ETHEREUM";

// Oracle defaults
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral:instruct";
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_PLAN_CACHE_TTL_SECS: u64 = 1_800;

// API version
pub const API_VERSION: &str = "v1";

// HTTP surface
pub const MAX_ROWS_PER_REQUEST: usize = 10_000;
