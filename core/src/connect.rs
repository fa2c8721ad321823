use crate::store::LocalStore;

/// Store keys for the runtime connection overrides.
pub const BASE_URL_KEY: &str = "api_base_url";
pub const API_KEY_KEY: &str = "api_key";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Startup connection parameters, read once and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ConnectionDefaults {
    pub base_url: String,
    pub api_key: String,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        ConnectionDefaults {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
        }
    }
}

/// Resolved parameters for one outgoing request. `api_key` is `Some`
/// only when the resolved key is non-empty, in which case the transport
/// attaches it as `X-API-Key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Per field independently, a stored override wins over the default iff
/// it is non-blank after trimming; the trimmed override value is used.
pub fn resolve(defaults: &ConnectionDefaults, store: &LocalStore) -> Connection {
    let base_url =
        override_for(store, BASE_URL_KEY).unwrap_or_else(|| defaults.base_url.clone());
    let api_key =
        override_for(store, API_KEY_KEY).unwrap_or_else(|| defaults.api_key.clone());
    Connection {
        base_url,
        api_key: if api_key.is_empty() { None } else { Some(api_key) },
    }
}

fn override_for(store: &LocalStore, key: &str) -> Option<String> {
    let raw = store.get(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> LocalStore {
        let path =
            std::env::temp_dir().join(format!("easm-connect-test-{}.json", uuid::Uuid::new_v4()));
        LocalStore::open(path)
    }

    fn defaults() -> ConnectionDefaults {
        ConnectionDefaults {
            base_url: "http://default:8000".into(),
            api_key: "default-key".into(),
        }
    }

    #[test]
    fn defaults_win_without_overrides() {
        let store = temp_store();
        let conn = resolve(&defaults(), &store);
        assert_eq!(conn.base_url, "http://default:8000");
        assert_eq!(conn.api_key.as_deref(), Some("default-key"));
    }

    #[test]
    fn overrides_win_when_non_blank() {
        let store = temp_store();
        store.set(BASE_URL_KEY, "http://override:9000");
        store.set(API_KEY_KEY, "override-key");
        let conn = resolve(&defaults(), &store);
        assert_eq!(conn.base_url, "http://override:9000");
        assert_eq!(conn.api_key.as_deref(), Some("override-key"));
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let store = temp_store();
        store.set(BASE_URL_KEY, "   ");
        store.set(API_KEY_KEY, "");
        let conn = resolve(&defaults(), &store);
        assert_eq!(conn.base_url, "http://default:8000");
        assert_eq!(conn.api_key.as_deref(), Some("default-key"));
    }

    #[test]
    fn override_values_are_trimmed() {
        let store = temp_store();
        store.set(BASE_URL_KEY, "  http://override:9000  ");
        let conn = resolve(&defaults(), &store);
        assert_eq!(conn.base_url, "http://override:9000");
    }

    #[test]
    fn fields_resolve_independently() {
        let store = temp_store();
        store.set(API_KEY_KEY, "override-key");
        let conn = resolve(&defaults(), &store);
        assert_eq!(conn.base_url, "http://default:8000");
        assert_eq!(conn.api_key.as_deref(), Some("override-key"));
    }

    #[test]
    fn empty_resolved_key_means_no_header() {
        let store = temp_store();
        let mut d = defaults();
        d.api_key = String::new();
        let conn = resolve(&d, &store);
        assert_eq!(conn.api_key, None);
    }
}
