//! Configuration merging and precedence handling.

use std::collections::BTreeMap;

use crate::config::loader::ConfigSource;
use crate::config::schema::InstanceOptions;

/// Merges configuration layers according to precedence rules.
///
/// # Examples
///
/// ```
/// use epg::config::{ConfigMerger, InstanceOptions};
///
/// let low = InstanceOptions { database: Some("low".into()), ..Default::default() };
/// let high = InstanceOptions { database: Some("high".into()), ..Default::default() };
///
/// let mut result = low;
/// ConfigMerger::merge_into(&mut result, &high);
/// assert_eq!(result.database.as_deref(), Some("high"));
/// ```
pub struct ConfigMerger;

impl ConfigMerger {
    /// Folds sources (lowest precedence first) into one set of options.
    #[must_use]
    pub fn merge(sources: &[ConfigSource]) -> InstanceOptions {
        let mut result = InstanceOptions::default();
        for source in sources {
            Self::merge_into(&mut result, &source.options);
        }
        result
    }

    /// Merges `source` over `target`.
    ///
    /// Scalar fields are replaced when set in `source`. The `server_config`
    /// and `connect_options` maps merge key by key, `source` winning. A fixed
    /// `port` and a `port_range` cancel each other out across layers, so a
    /// higher layer can switch between them without tripping the conflict
    /// check.
    pub fn merge_into(target: &mut InstanceOptions, source: &InstanceOptions) {
        if source.username.is_some() {
            target.username.clone_from(&source.username);
        }
        if source.password.is_some() {
            target.password.clone_from(&source.password);
        }
        if source.database.is_some() {
            target.database.clone_from(&source.database);
        }
        if source.data_dir.is_some() {
            target.data_dir.clone_from(&source.data_dir);
        }
        if source.bin_dir.is_some() {
            target.bin_dir.clone_from(&source.bin_dir);
        }
        if source.pooling.is_some() {
            target.pooling = source.pooling;
        }
        if source.startup_timeout_ms.is_some() {
            target.startup_timeout_ms = source.startup_timeout_ms;
        }
        if source.shutdown_timeout_ms.is_some() {
            target.shutdown_timeout_ms = source.shutdown_timeout_ms;
        }
        if source.clean_data_dir.is_some() {
            target.clean_data_dir = source.clean_data_dir;
        }
        if source.auth_method.is_some() {
            target.auth_method = source.auth_method;
        }

        match (source.port, source.port_range) {
            (Some(_), Some(_)) => {
                // both set in one layer: keep them so validation reports it
                target.port = source.port;
                target.port_range = source.port_range;
            }
            (Some(port), None) => {
                target.port = Some(port);
                if port != 0 {
                    target.port_range = None;
                }
            }
            (None, Some(range)) => {
                target.port_range = Some(range);
                target.port = None;
            }
            (None, None) => {}
        }

        Self::merge_map(&mut target.server_config, source.server_config.as_ref());
        Self::merge_map(&mut target.connect_options, source.connect_options.as_ref());
    }

    fn merge_map(
        target: &mut Option<BTreeMap<String, String>>,
        source: Option<&BTreeMap<String, String>>,
    ) {
        if let Some(source) = source {
            target
                .get_or_insert_with(BTreeMap::new)
                .extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::schema::PortRangeConfig;

    fn make_source(precedence: u8, options: InstanceOptions) -> ConfigSource {
        ConfigSource {
            path: PathBuf::from(format!("test-{precedence}.yaml")),
            precedence,
            options,
        }
    }

    #[test]
    fn test_merge_simple_fields() {
        let mut target = InstanceOptions::default();
        let source = InstanceOptions {
            username: Some("alice".into()),
            pooling: Some(true),
            ..Default::default()
        };
        ConfigMerger::merge_into(&mut target, &source);
        assert_eq!(target.username.as_deref(), Some("alice"));
        assert_eq!(target.pooling, Some(true));
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut target = InstanceOptions {
            database: Some("keep".into()),
            ..Default::default()
        };
        ConfigMerger::merge_into(&mut target, &InstanceOptions::default());
        assert_eq!(target.database.as_deref(), Some("keep"));
    }

    #[test]
    fn test_merge_server_config_by_key() {
        let mut target = InstanceOptions {
            server_config: Some(BTreeMap::from([
                ("fsync".into(), "off".into()),
                ("work_mem".into(), "4MB".into()),
            ])),
            ..Default::default()
        };
        let source = InstanceOptions {
            server_config: Some(BTreeMap::from([("work_mem".into(), "16MB".into())])),
            ..Default::default()
        };
        ConfigMerger::merge_into(&mut target, &source);

        let config = target.server_config.unwrap();
        assert_eq!(config["fsync"], "off");
        assert_eq!(config["work_mem"], "16MB");
    }

    #[test]
    fn test_higher_port_replaces_lower_range() {
        let mut target = InstanceOptions {
            port_range: Some(PortRangeConfig {
                min: 50000,
                max: Some(50100),
                max_offset: None,
            }),
            ..Default::default()
        };
        let source = InstanceOptions {
            port: Some(55432),
            ..Default::default()
        };
        ConfigMerger::merge_into(&mut target, &source);
        assert_eq!(target.port, Some(55432));
        assert!(target.port_range.is_none());
    }

    #[test]
    fn test_higher_range_replaces_lower_port() {
        let mut target = InstanceOptions {
            port: Some(55432),
            ..Default::default()
        };
        let source = InstanceOptions {
            port_range: Some(PortRangeConfig {
                min: 50000,
                max: None,
                max_offset: Some(9),
            }),
            ..Default::default()
        };
        ConfigMerger::merge_into(&mut target, &source);
        assert!(target.port.is_none());
        assert!(target.port_range.is_some());
    }

    #[test]
    fn test_merge_sources_in_order() {
        let sources = vec![
            make_source(
                1,
                InstanceOptions {
                    username: Some("low".into()),
                    database: Some("low_db".into()),
                    ..Default::default()
                },
            ),
            make_source(
                2,
                InstanceOptions {
                    username: Some("high".into()),
                    ..Default::default()
                },
            ),
        ];
        let merged = ConfigMerger::merge(&sources);
        assert_eq!(merged.username.as_deref(), Some("high"));
        assert_eq!(merged.database.as_deref(), Some("low_db"));
    }
}
