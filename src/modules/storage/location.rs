//! Known bucket locations
//!
//! Location names are the symbolic constants applications put in
//! `BOTO_BUCKET_LOCATION`; each maps to the location constraint sent when
//! the bucket is created.

use std::fmt;
use std::str::FromStr;

use crate::core::error::StorageError;

/// Region used for signing when no location constraint is configured
pub const DEFAULT_SIGNING_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Default,
    EU,
    EUCentral1,
    USWest,
    USWest2,
    SAEast,
    APNortheast,
    APSoutheast,
    APSoutheast2,
    CNNorth1,
}

impl Location {
    pub const ALL: [Location; 10] = [
        Location::Default,
        Location::EU,
        Location::EUCentral1,
        Location::USWest,
        Location::USWest2,
        Location::SAEast,
        Location::APNortheast,
        Location::APSoutheast,
        Location::APSoutheast2,
        Location::CNNorth1,
    ];

    /// Symbolic name as written in settings
    pub fn name(&self) -> &'static str {
        match self {
            Location::Default => "DEFAULT",
            Location::EU => "EU",
            Location::EUCentral1 => "EUCentral1",
            Location::USWest => "USWest",
            Location::USWest2 => "USWest2",
            Location::SAEast => "SAEast",
            Location::APNortheast => "APNortheast",
            Location::APSoutheast => "APSoutheast",
            Location::APSoutheast2 => "APSoutheast2",
            Location::CNNorth1 => "CNNorth1",
        }
    }

    /// Location constraint value; empty for the classic default region
    pub fn constraint(&self) -> &'static str {
        match self {
            Location::Default => "",
            Location::EU => "EU",
            Location::EUCentral1 => "eu-central-1",
            Location::USWest => "us-west-1",
            Location::USWest2 => "us-west-2",
            Location::SAEast => "sa-east-1",
            Location::APNortheast => "ap-northeast-1",
            Location::APSoutheast => "ap-southeast-1",
            Location::APSoutheast2 => "ap-southeast-2",
            Location::CNNorth1 => "cn-north-1",
        }
    }

    /// Region name used for request signing
    pub fn signing_region(&self) -> &'static str {
        match self {
            Location::Default => DEFAULT_SIGNING_REGION,
            Location::EU => "eu-west-1",
            other => other.constraint(),
        }
    }
}

impl FromStr for Location {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::ALL
            .iter()
            .copied()
            .find(|location| location.name() == s)
            .ok_or_else(|| StorageError::Config(format!("Unknown bucket location '{}'", s)))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constraint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        assert_eq!(
            "APSoutheast2".parse::<Location>().unwrap().constraint(),
            "ap-southeast-2"
        );
        assert_eq!("EU".parse::<Location>().unwrap(), Location::EU);
        assert_eq!("DEFAULT".parse::<Location>().unwrap().constraint(), "");
    }

    #[test]
    fn test_every_name_round_trips() {
        for location in Location::ALL {
            assert_eq!(location.name().parse::<Location>().unwrap(), location);
        }
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let err = "Mars1".parse::<Location>().unwrap_err();
        assert!(matches!(err, StorageError::Config(ref msg) if msg.contains("Mars1")));

        // constraint values are not accepted as names
        assert!("ap-southeast-2".parse::<Location>().is_err());
    }

    #[test]
    fn test_signing_region() {
        assert_eq!(Location::Default.signing_region(), "us-east-1");
        assert_eq!(Location::EU.signing_region(), "eu-west-1");
        assert_eq!(Location::USWest2.signing_region(), "us-west-2");
    }
}
