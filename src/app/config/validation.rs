use super::{Config, ConfigError, SinkType};
use reqwest::header::HeaderValue;
use url::Url;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sink == SinkType::S3 {
            let missing: Vec<&str> = [
                ("bucket", &self.bucket),
                ("endpoint", &self.endpoint),
                ("key", &self.key),
                ("secret", &self.secret),
            ]
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect();

            if !missing.is_empty() {
                return Err(ConfigError::MissingSettings {
                    sink: "s3",
                    fields: missing.join(", "),
                });
            }
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingSettings {
                sink: "http",
                fields: "endpoint".to_string(),
            });
        }

        Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid endpoint URL '{}': {}", self.endpoint, e))
        })?;

        if self.max_records == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max records must be greater than 0".to_string(),
            ));
        }

        if self.max_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Max interval must be greater than 0".to_string(),
            ));
        }

        if self.delivery_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Delivery timeout must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.idle_check_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidConfig(
                "Idle check interval must be greater than 0".to_string(),
            ));
        }

        if self.listen.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Listen address must not be empty".to_string(),
            ));
        }

        // Sent as the `x-log-tag` header or `x-amz-meta-tag` metadata.
        if !self.tag.is_empty() && HeaderValue::from_str(&self.tag).is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "Tag '{}' is not a valid header value",
                self.tag
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn http_config() -> Config {
        Config {
            sink: SinkType::Http,
            endpoint: "http://collector:8080/logs".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_all_missing_s3_fields_named_together() {
        let err = Config::default().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("bucket, endpoint, key, secret"), "{message}");
    }

    #[test]
    fn test_http_needs_only_endpoint() {
        assert!(http_config().validate().is_ok());

        let err = Config {
            endpoint: String::new(),
            ..http_config()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSettings { sink: "http", .. }));
    }

    #[test]
    fn test_rejects_bad_url() {
        let err = Config {
            endpoint: "collector:8080 logs".to_string(),
            ..http_config()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_rejects_zero_limits() {
        for config in [
            Config {
                max_records: 0,
                ..http_config()
            },
            Config {
                max_interval: Duration::ZERO,
                ..http_config()
            },
            Config {
                delivery_timeout: Duration::ZERO,
                ..http_config()
            },
            Config {
                queue_capacity: 0,
                ..http_config()
            },
            Config {
                idle_check_interval: Some(Duration::ZERO),
                ..http_config()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_rejects_tag_that_cannot_be_sent() {
        for sink in [SinkType::Http, SinkType::S3] {
            let config = Config {
                sink,
                bucket: "logs".to_string(),
                key: "AKIA".to_string(),
                secret: "shh".to_string(),
                tag: "\u{e9}dge".to_string(),
                ..http_config()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidConfig(_))
            ));
        }

        let config = Config {
            tag: "edge-eu".to_string(),
            ..http_config()
        };
        assert!(config.validate().is_ok());
    }
}
