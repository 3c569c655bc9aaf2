use crate::backend::CollectOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Buffer of each push channel (drops, collection results)
    pub push_capacity: usize,
    /// Buffer of the notice and inspection streams
    pub notice_capacity: usize,
    /// Deepest directory level collected; unbounded when unset
    pub collect_max_depth: Option<usize>,
    pub collect_follow_links: bool,
    pub collect_include_hidden: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            push_capacity: 64,
            notice_capacity: 64,
            collect_max_depth: None,
            collect_follow_links: false,
            collect_include_hidden: false,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            push_capacity: parse_or(&get, "MEDIC_PUSH_CAPACITY", defaults.push_capacity)?,
            notice_capacity: parse_or(&get, "MEDIC_NOTICE_CAPACITY", defaults.notice_capacity)?,
            collect_max_depth: match get("MEDIC_COLLECT_MAX_DEPTH") {
                Some(val) => Some(parse("MEDIC_COLLECT_MAX_DEPTH", &val)?),
                None => None,
            },
            collect_follow_links: parse_or(
                &get,
                "MEDIC_COLLECT_FOLLOW_LINKS",
                defaults.collect_follow_links,
            )?,
            collect_include_hidden: parse_or(
                &get,
                "MEDIC_COLLECT_INCLUDE_HIDDEN",
                defaults.collect_include_hidden,
            )?,
        })
    }

    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            max_depth: self.collect_max_depth,
            follow_links: self.collect_follow_links,
            include_hidden: self.collect_include_hidden,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, val: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    val.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}"))
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(val) => parse(key, &val),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(load(&[]).unwrap(), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MEDIC_PUSH_CAPACITY", "8"),
            ("MEDIC_COLLECT_MAX_DEPTH", "2"),
            ("MEDIC_COLLECT_INCLUDE_HIDDEN", "true"),
        ])
        .unwrap();
        assert_eq!(config.push_capacity, 8);
        assert_eq!(config.notice_capacity, 64);

        let options = config.collect_options();
        assert_eq!(options.max_depth, Some(2));
        assert!(options.include_hidden);
        assert!(!options.follow_links);
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = load(&[("MEDIC_COLLECT_FOLLOW_LINKS", "sometimes")]).unwrap_err();
        assert!(err.to_string().contains("MEDIC_COLLECT_FOLLOW_LINKS"));
    }
}
