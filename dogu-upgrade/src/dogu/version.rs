use crate::common::error::{
    Error::{RegexCompile, VersionParse},
    Result,
};
use regex::Regex;
use std::{fmt, str::FromStr};

const VERSION_REGEX: &str = r"^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?(?:-(\d+))?$";

/// A dogu version, `major[.minor[.patch[.nano]]][-extra]`. The extra component counts the
/// releases of the same upstream version, so `4.2.3-11` is newer than `4.2.3-10`, and both are
/// newer than `4.2.3`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    nano: u64,
    extra: u64,
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self> {
        let regex = Regex::new(VERSION_REGEX).map_err(|e| RegexCompile {
            source: e,
            expression: VERSION_REGEX.to_string(),
        })?;
        let captures = regex.captures(raw.trim()).ok_or_else(|| VersionParse {
            version: raw.to_string(),
        })?;

        let component = |index: usize| -> Result<u64> {
            match captures.get(index) {
                Some(value) => value.as_str().parse::<u64>().map_err(|_| VersionParse {
                    version: raw.to_string(),
                }),
                None => Ok(0),
            }
        };

        Ok(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
            nano: component(4)?,
            extra: component(5)?,
        })
    }

    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }
}

impl FromStr for Version {
    type Err = crate::common::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.nano > 0 {
            write!(f, ".{}", self.nano)?;
        }
        if self.extra > 0 {
            write!(f, "-{}", self.extra)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> Version {
        Version::parse(raw).unwrap()
    }

    #[test]
    fn extra_component_orders_releases() {
        assert!(v("4.2.3-11").is_newer_than(&v("4.2.3-10")));
        assert!(!v("4.2.3-10").is_newer_than(&v("4.2.3-11")));
        assert!(v("4.2.3-1").is_newer_than(&v("4.2.3")));
    }

    #[test]
    fn components_compare_numerically() {
        assert!(v("1.10.0-1") > v("1.9.9-9"));
        assert!(v("2.0.0-1") > v("1.99.99.99-99"));
        assert!(v("1.2.3.4-1") > v("1.2.3-5"));
    }

    #[test]
    fn equal_versions_are_not_newer() {
        assert_eq!(v("4.2.3-10"), v("4.2.3-10"));
        assert!(!v("4.2.3-10").is_newer_than(&v("4.2.3-10")));
        assert_eq!(v("1.2"), v("1.2.0"));
    }

    #[test]
    fn malformed_versions_are_rejected() {
        for raw in ["", "latest", "1.2.x", "1.2.3-beta", "1.2.3.4.5"] {
            let err = Version::parse(raw).unwrap_err();
            assert!(err.to_string().contains(raw), "{}", err);
        }
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(v("4.2.3-11").to_string(), "4.2.3-11");
        assert_eq!(v("1.2").to_string(), "1.2.0");
        assert_eq!(v("1.2.3.4").to_string(), "1.2.3.4");
    }
}
