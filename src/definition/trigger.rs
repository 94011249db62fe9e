use std::fmt::{Display, Formatter};
use thiserror::Error;

/// What started a release batch. Both variants run every target.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Trigger {
    Tag(Version),
    Manual,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
    pub build: Option<String>,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum TagError {
    #[error("release tags start with `v`, got `{0}`")]
    MissingPrefix(String),
    #[error("`{0}` is not MAJOR.MINOR.PATCH")]
    BadCore(String),
    #[error("empty {0} identifier in `{1}`")]
    EmptyIdentifier(&'static str, String),
}

impl Trigger {
    pub fn from_tag(tag: &str) -> Result<Self, TagError> {
        let rest = tag
            .strip_prefix('v')
            .ok_or_else(|| TagError::MissingPrefix(tag.to_string()))?;

        Ok(Trigger::Tag(Version::parse(rest)?))
    }

    pub fn version(&self) -> Option<&Version> {
        match self {
            Trigger::Tag(v) => Some(v),
            Trigger::Manual => None,
        }
    }
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, TagError> {
        let (rest, build) = match input.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (input, None),
        };

        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        for (kind, ident) in [("pre-release", pre), ("build", build)] {
            if let Some(ident) = ident {
                if ident.is_empty() || ident.split('.').any(str::is_empty) {
                    return Err(TagError::EmptyIdentifier(kind, input.to_string()));
                }
            }
        }

        let numbers = core
            .split('.')
            .map(|part| {
                if part.is_empty()
                    || !part.chars().all(|c| c.is_ascii_digit())
                    || (part.len() > 1 && part.starts_with('0'))
                {
                    return None;
                }
                part.parse::<u64>().ok()
            })
            .collect::<Option<Vec<_>>>();

        match numbers.as_deref() {
            Some(&[major, minor, patch]) => Ok(Version {
                major,
                minor,
                patch,
                pre: pre.map(ToString::to_string),
                build: build.map(ToString::to_string),
            }),
            _ => Err(TagError::BadCore(input.to_string())),
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_semver_tags() {
        let trigger = Trigger::from_tag("v1.4.0-rc.1+abc").unwrap();
        let version = trigger.version().unwrap();
        assert_eq!((version.major, version.minor, version.patch), (1, 4, 0));
        assert_eq!(version.pre.as_deref(), Some("rc.1"));
        assert_eq!(version.to_string(), "1.4.0-rc.1+abc");
    }

    #[test]
    fn rejects_malformed_tags() {
        assert_eq!(
            Trigger::from_tag("1.2.3"),
            Err(TagError::MissingPrefix("1.2.3".into()))
        );
        assert!(matches!(Trigger::from_tag("v1.2"), Err(TagError::BadCore(_))));
        assert!(matches!(Trigger::from_tag("v01.2.3"), Err(TagError::BadCore(_))));
        assert!(matches!(
            Trigger::from_tag("v1.2.3-"),
            Err(TagError::EmptyIdentifier("pre-release", _))
        ));
    }

    #[test]
    fn manual_dispatch_has_no_version() {
        assert_eq!(Trigger::Manual.version(), None);
    }
}
