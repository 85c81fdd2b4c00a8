use std::fmt;
use std::str::FromStr;

/// An S3-compatible endpoint: either one of the well-known AWS regions, or a
/// custom endpoint (MinIO, a local test server, any S3-compatible store).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Region {
    UsEast1,
    UsWest1,
    UsWest2,
    EuWest1,
    EuCentral1,
    ApSoutheast1,
    ApNortheast1,
    Custom { region: String, endpoint: String },
}

impl Region {
    pub fn endpoint(&self) -> String {
        match self {
            Region::Custom { endpoint, .. } => endpoint.clone(),
            region => format!("https://s3.{region}.amazonaws.com"),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Region::UsEast1 => "us-east-1",
            Region::UsWest1 => "us-west-1",
            Region::UsWest2 => "us-west-2",
            Region::EuWest1 => "eu-west-1",
            Region::EuCentral1 => "eu-central-1",
            Region::ApSoutheast1 => "ap-southeast-1",
            Region::ApNortheast1 => "ap-northeast-1",
            Region::Custom { region, .. } => region,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Treats any bare string as a custom endpoint URL, so a `CfsConfig`'s
/// `endpoint`/`region` pair can be turned into a `Region` without forcing
/// callers to match on well-known AWS names first.
impl FromStr for Region {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Region::Custom {
            region: "us-east-1".to_string(),
            endpoint: s.to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn well_known_region_endpoint() {
        assert_eq!(
            Region::UsEast1.endpoint(),
            "https://s3.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn custom_region_round_trips_endpoint() {
        let region: Region = "http://127.0.0.1:9000".parse().unwrap();
        assert_eq!(region.endpoint(), "http://127.0.0.1:9000");
        assert_eq!(region.name(), "us-east-1");
    }
}
