use bytesize::ByteSize;

use crate::error::UploadError;

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";
pub const DEFAULT_CHUNK_SIZE: &str = "50MB";
pub const DEFAULT_ACL: &str = "bucket-owner-full-control";
pub const DEFAULT_RETRIES: u32 = 4;

/// Inclusive part-size bounds imposed by the multipart protocol.
pub const MIN_CHUNK_SIZE: ByteSize = ByteSize::mib(5);
pub const MAX_CHUNK_SIZE: ByteSize = ByteSize::gib(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub chunk_size: u64,
    pub content_type: String,
    pub expected_size: Option<u64>,
    pub acl: String,
    pub sse: bool,
    pub retries: u32,
    pub endpoint: Option<String>,
}

/// Parse a humanized byte count ("50MB", "5 MiB", "1073741824").
pub fn parse_size(value: &str) -> Result<u64, String> {
    value
        .parse::<ByteSize>()
        .map(|size| size.0)
        .map_err(|err| format!("invalid size '{}': {}", value, err))
}

impl Config {
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.bucket.trim().is_empty() {
            return Err(UploadError::InvalidConfig(
                "S3 bucket parameter missing".to_string(),
            ));
        }
        if self.key.trim().is_empty() {
            return Err(UploadError::InvalidConfig(
                "S3 key parameter missing".to_string(),
            ));
        }
        if self.chunk_size < MIN_CHUNK_SIZE.0 || self.chunk_size > MAX_CHUNK_SIZE.0 {
            return Err(UploadError::InvalidConfig(format!(
                "invalid chunk size: must be between {} and {} (inclusive), got {}",
                MIN_CHUNK_SIZE,
                MAX_CHUNK_SIZE,
                ByteSize::b(self.chunk_size)
            )));
        }
        if self.retries == 0 {
            return Err(UploadError::InvalidConfig(
                "retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            bucket: "backups".to_string(),
            key: "dumps/db.dump".to_string(),
            region: DEFAULT_REGION.to_string(),
            chunk_size: 50 * 1000 * 1000,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            expected_size: None,
            acl: DEFAULT_ACL.to_string(),
            sse: false,
            retries: DEFAULT_RETRIES,
            endpoint: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_missing_bucket() {
        let config = Config {
            bucket: "".to_string(),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_key() {
        let config = Config {
            key: "  ".to_string(),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_size_too_small() {
        let config = Config {
            chunk_size: 4 * 1024 * 1024,
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_size_too_large() {
        let config = Config {
            chunk_size: MAX_CHUNK_SIZE.0 + 1,
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_size_bounds_inclusive() {
        let lower = Config {
            chunk_size: MIN_CHUNK_SIZE.0,
            ..test_config()
        };
        assert!(lower.validate().is_ok());

        let upper = Config {
            chunk_size: MAX_CHUNK_SIZE.0,
            ..test_config()
        };
        assert!(upper.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let config = Config {
            retries: 0,
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_size_decimal_and_binary() {
        assert_eq!(parse_size("50MB").unwrap(), 50_000_000);
        assert_eq!(parse_size("5MiB").unwrap(), 5_242_880);
        assert_eq!(parse_size("1024").unwrap(), 1024);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("five megabytes").is_err());
    }
}
